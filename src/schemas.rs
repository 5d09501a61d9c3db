// HTTP 接口的请求/响应结构，服务端与 speedtest-cli 共用。
use crate::records::{BestRecord, Record};
use serde::{Deserialize, Serialize};

pub const STATUS_OK: &str = "ok";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub received: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResultResponse {
    pub status: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestRecordsResponse {
    pub records: Option<BestRecord>,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub top: Vec<Record>,
}

/// 失败时的统一外壳，`status` 固定为 `"error"`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub status: u16,
    pub hint: String,
    pub trace_id: String,
    pub timestamp: f64,
}
