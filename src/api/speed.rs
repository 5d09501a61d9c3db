// 测速端点：下载流、上传接收与延迟探测。
use crate::byte_stream::{clamp_size_mb, BYTES_PER_MB};
use crate::error::SpeedtestError;
use crate::latency::PingReply;
use crate::schemas::{UploadResponse, STATUS_OK};
use crate::state::AppState;
use crate::upload_sink::drain_body;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, warn};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/download/{size_mb}", get(download))
        .route("/upload", post(upload))
        .route("/ping", get(ping))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(raw_size): Path<String>,
) -> Result<Response, SpeedtestError> {
    let requested = raw_size
        .trim()
        .parse::<u64>()
        .map_err(|_| SpeedtestError::InvalidSize(raw_size.clone()))?;
    let size_mb = clamp_size_mb(requested);
    let total_bytes = size_mb * BYTES_PER_MB;
    debug!(requested, size_mb, "download test started");

    let stream = state.payload.stream(total_bytes);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(total_bytes));
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=test_{size_mb}mb.bin"))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    insert_no_cache(headers);
    Ok(response)
}

async fn upload(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Result<Json<UploadResponse>, SpeedtestError> {
    let limit = state.config.server.max_upload_bytes();
    let received = drain_body(body, limit).await.inspect_err(|err| {
        warn!(code = err.code(), "upload test aborted: {err}");
    })?;
    Ok(Json(UploadResponse {
        received,
        status: STATUS_OK.to_string(),
    }))
}

async fn ping() -> Response {
    let mut response = Json(PingReply::now()).into_response();
    insert_no_cache(response.headers_mut());
    response
}

fn insert_no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}
