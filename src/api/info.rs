// 地址信息接口：服务器自身与调用方的地理位置，查询失败时返回 Unknown 而不是错误。
use crate::client_addr::resolve_client_info;
use crate::ip_info::ClientInfo;
use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/server-info", get(server_info))
        .route("/api/client-info", get(client_info))
}

async fn server_info(State(state): State<Arc<AppState>>) -> Json<ClientInfo> {
    Json(state.resolver.resolve_self().await)
}

async fn client_info(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<ClientInfo> {
    Json(resolve_client_info(&state.resolver, &headers, peer).await)
}
