use crate::error::SpeedtestError;
use crate::latency::now_unix_seconds;
use crate::schemas::{ErrorDetail, ErrorEnvelope, STATUS_ERROR};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;
use uuid::Uuid;

pub(crate) const TRACE_HEADER: &str = "x-trace-id";
pub(crate) const ERROR_CODE_HEADER: &str = "x-error-code";

pub(crate) fn build_error_detail(
    status: StatusCode,
    code: Option<&str>,
    message: impl Into<String>,
) -> ErrorDetail {
    let code = code
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_error_code(status))
        .to_string();
    ErrorDetail {
        hint: hint_for_error_code(&code)
            .unwrap_or_else(|| default_hint(status))
            .to_string(),
        code,
        message: message.into(),
        status: status.as_u16(),
        trace_id: format!("err_{}", Uuid::new_v4().simple()),
        timestamp: now_unix_seconds(),
    }
}

pub(crate) fn status_for_error(err: &SpeedtestError) -> StatusCode {
    match err {
        SpeedtestError::InvalidMeasurement(_) | SpeedtestError::InvalidSize(_) => {
            StatusCode::BAD_REQUEST
        }
        SpeedtestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        SpeedtestError::TransferIncomplete { .. } => StatusCode::BAD_REQUEST,
        SpeedtestError::ResolverDegraded(_) => StatusCode::BAD_GATEWAY,
        SpeedtestError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn hint_for_error_code(code: &str) -> Option<&'static str> {
    match code {
        "INVALID_MEASUREMENT" => Some("Send non-negative numbers for download, upload and latency."),
        "INVALID_SIZE" => Some("Use a whole number of megabytes, e.g. /download/20."),
        "PAYLOAD_TOO_LARGE" => Some("Upload a smaller body."),
        "TRANSFER_INCOMPLETE" => Some("The connection closed mid-transfer; rerun the test."),
        "PERSISTENCE_FAILURE" => Some("The result was not saved; retry later."),
        _ => None,
    }
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    error_response_with_code(status, None, message)
}

pub fn error_response_with_code(
    status: StatusCode,
    code: Option<&str>,
    message: impl Into<String>,
) -> Response {
    let detail = build_error_detail(status, code, message);
    let trace_id = detail.trace_id.clone();
    let code = detail.code.clone();
    let payload = ErrorEnvelope {
        status: STATUS_ERROR.to_string(),
        message: detail.message.clone(),
        error: Some(detail),
    };

    let mut response = (status, Json(payload)).into_response();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&code) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(ERROR_CODE_HEADER), value);
    }
    response
}

impl IntoResponse for SpeedtestError {
    fn into_response(self) -> Response {
        let status = status_for_error(&self);
        if status.is_server_error() {
            warn!(code = self.code(), "request failed: {self}");
        }
        error_response_with_code(status, Some(self.code()), self.to_string())
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE_ENTITY",
        _ if status.is_server_error() => "INTERNAL_ERROR",
        _ => "REQUEST_ERROR",
    }
}

fn default_hint(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "Verify request parameters and payload format.",
        StatusCode::NOT_FOUND => "Verify requested resource path.",
        _ if status.is_server_error() => "Retry later or report the trace_id.",
        _ => "Inspect request and try again.",
    }
}
