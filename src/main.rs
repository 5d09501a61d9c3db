// Rust 入口：加载配置，挂载测速 API 与前端静态资源。
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;
use futures::FutureExt;
use speedtest_server::api::cors::build_cors;
use speedtest_server::api::errors::error_response;
use speedtest_server::build_router;
use speedtest_server::config::{load_config, Config};
use speedtest_server::shutdown::shutdown_signal;
use speedtest_server::state::AppState;
use std::any::Any as StdAny;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();
    init_tracing(&config);
    let state = Arc::new(AppState::new(config.clone()).await?);
    info!(
        "测速数据文件: {}，下载数据块 {} 字节",
        config.storage.data_path,
        state.payload.chunk_size()
    );

    // 启动时打印服务器公网位置，查询较慢所以放到后台。
    let resolver = state.resolver.clone();
    tokio::spawn(async move {
        let info = resolver.resolve_self().await;
        info!(
            "服务器位置: {} {} {} ({})",
            info.country, info.city, info.isp, info.ip
        );
    });

    let app = build_router(state.clone());
    let app = mount_static(app, &config.server.web_root);

    let cors = build_cors(&config.cors);
    let app = app
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(panic_guard));

    let addr = bind_address(&config);
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    info!("测速服务已启动: http://{addr}");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        warn!("服务退出异常: {err}");
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let default_level = config.observability.log_level.trim();
    let default_level = if default_level.is_empty() {
        "info".to_string()
    } else {
        default_level.to_lowercase()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn bind_address(config: &Config) -> String {
    // 保留环境变量覆盖，便于容器化部署。
    let host = std::env::var("SPEEDTEST_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port = std::env::var("SPEEDTEST_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    format!("{host}:{port}")
}

fn mount_static(app: Router, dir: &str) -> Router {
    let path = PathBuf::from(dir);
    if path.is_dir() {
        let service = ServeDir::new(path).append_index_html_on_directories(true);
        app.fallback_service(service)
    } else {
        // 没有前端目录时，未知路径也按统一错误结构返回。
        app.fallback(|| async { error_response(StatusCode::NOT_FOUND, "not found") })
    }
}

async fn panic_guard(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let result = AssertUnwindSafe(next.run(request)).catch_unwind().await;
    match result {
        Ok(response) => Ok(response),
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            error!("panic while handling {method} {path}: {detail}");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ))
        }
    }
}

fn panic_message(panic: &(dyn StdAny + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
