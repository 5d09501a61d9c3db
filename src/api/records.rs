// 结果接口：保存测速结果、查询个人最佳与本周排行榜。
use crate::client_addr::resolve_identity;
use crate::error::SpeedtestError;
use crate::records::Measurement;
use crate::schemas::{BestRecordsResponse, LeaderboardResponse, SaveResultResponse, STATUS_SUCCESS};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/save-result", post(save_result))
        .route("/api/best-records", get(best_records))
        .route("/api/leaderboard", get(leaderboard))
}

async fn save_result(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<Measurement>, JsonRejection>,
) -> Result<Json<SaveResultResponse>, SpeedtestError> {
    let Json(measurement) =
        payload.map_err(|rejection| SpeedtestError::InvalidMeasurement(rejection.body_text()))?;
    measurement.validate()?;
    let identity = resolve_identity(&state.resolver, &headers, peer).await;
    // 提交放到独立任务里，客户端中途断开也不会打断落盘与快照替换。
    let store = state.store.clone();
    let committed_identity = identity.clone();
    tokio::spawn(async move { store.append(&committed_identity, measurement).await })
        .await
        .map_err(|err| SpeedtestError::PersistenceFailure(format!("commit task: {err}")))??;
    Ok(Json(SaveResultResponse {
        status: STATUS_SUCCESS.to_string(),
        ip: identity,
    }))
}

async fn best_records(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<BestRecordsResponse> {
    let identity = resolve_identity(&state.resolver, &headers, peer).await;
    let records = state.store.best_for(&identity);
    Json(BestRecordsResponse {
        records,
        ip: identity,
    })
}

async fn leaderboard(State(state): State<Arc<AppState>>) -> Json<LeaderboardResponse> {
    Json(LeaderboardResponse {
        top: state.store.leaderboard(),
    })
}
