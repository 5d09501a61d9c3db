// API 路由汇总入口，按领域拆分以保持结构清晰。
pub mod cors;
pub mod errors;
pub mod info;
pub mod records;
pub mod speed;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(speed::router())
        .merge(records::router())
        .merge(info::router())
        .with_state(state)
}
