// 存储模块：封装结果集合的整体读写，提供 JSON 文件与内存两种后端。

mod json_file;
mod memory;

use crate::config::StorageConfig;
use crate::error::SpeedtestError;
use crate::records::ResultCollection;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

/// 结果集合的持久化后端。`save` 必须是整体替换：要么新内容完整落盘，要么旧内容保持不变。
#[async_trait]
pub trait ResultPersistence: Send + Sync {
    fn describe(&self) -> String;

    /// 读取已持久化的集合；尚未创建时返回 `None`。
    async fn load(&self) -> Result<Option<ResultCollection>, SpeedtestError>;

    async fn save(&self, collection: &ResultCollection) -> Result<(), SpeedtestError>;
}

/// 构建存储后端，根据 backend 配置选择 JSON 文件或内存。
pub fn build_persistence(config: &StorageConfig) -> Result<Arc<dyn ResultPersistence>> {
    let backend = config.backend.trim().to_lowercase();
    let backend = if backend.is_empty() {
        "json".to_string()
    } else {
        backend
    };
    match backend.as_str() {
        "json" | "file" | "default" => {
            let path = config.data_path.trim();
            if path.is_empty() {
                return Err(anyhow!("storage.data_path 不能为空"));
            }
            Ok(Arc::new(JsonFileStorage::new(path)))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => Err(anyhow!("未知存储后端: {other}")),
    }
}
