// 延迟探测：服务端只负责立即应答，往返计时与抖动统计在调用方完成。
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PONG: &str = "pong";
pub const DEFAULT_PROBE_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReply {
    pub timestamp: f64,
    pub status: String,
}

impl PingReply {
    pub fn now() -> Self {
        Self {
            timestamp: now_unix_seconds(),
            status: PONG.to_string(),
        }
    }
}

pub fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0)
}

/// 一组往返样本的统计：平均值与抖动（最大值减最小值），单位毫秒。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub jitter_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let millis: Vec<f64> = samples
            .iter()
            .map(|sample| sample.as_secs_f64() * 1000.0)
            .collect();
        let total: f64 = millis.iter().sum();
        let min_ms = millis.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = millis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            samples: millis.len(),
            mean_ms: total / millis.len() as f64,
            min_ms,
            max_ms,
            jitter_ms: max_ms - min_ms,
        })
    }
}
