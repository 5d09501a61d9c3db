// 停机信号：Ctrl+C 或 SIGTERM 任一到达即开始优雅停机，未完成的测速流随连接一起结束。
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("ctrl-c"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// 等待第一个停机信号。某个监听器注册失败时只记日志，由另一个继续等待。
pub async fn wait_for_stop() -> StopSignal {
    tokio::select! {
        _ = interrupt() => StopSignal::Interrupt,
        _ = terminate() => StopSignal::Terminate,
    }
}

pub async fn shutdown_signal() {
    let signal = wait_for_stop().await;
    info!(%signal, "stopping speedtest server, draining open transfers");
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c listener unavailable: {err}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!("SIGTERM listener unavailable: {err}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_names() {
        assert_eq!(StopSignal::Interrupt.to_string(), "ctrl-c");
        assert_eq!(StopSignal::Terminate.to_string(), "SIGTERM");
    }
}
