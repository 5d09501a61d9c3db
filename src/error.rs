// 测速服务错误分类：传输中断、持久化失败、地理位置降级与输入校验。
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeedtestError {
    /// 客户端在流传输中途断开，已接收的字节数不计入任何结果。
    #[error("transfer incomplete after {received} bytes: {reason}")]
    TransferIncomplete { received: u64, reason: String },

    /// 结果集合未能落盘，内存状态保持为上一次成功提交的版本。
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("geolocation lookup degraded: {0}")]
    ResolverDegraded(String),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("invalid download size: {0}")]
    InvalidSize(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },
}

impl SpeedtestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransferIncomplete { .. } => "TRANSFER_INCOMPLETE",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::ResolverDegraded(_) => "RESOLVER_DEGRADED",
            Self::InvalidMeasurement(_) => "INVALID_MEASUREMENT",
            Self::InvalidSize(_) => "INVALID_SIZE",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }

    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::PersistenceFailure(format!("{context}: {err}"))
    }
}
