// 全局状态：配置、结果存储、地理信息解析器与下载数据块，进程启动时构建一次后传入各处理函数。

use crate::byte_stream::{RandomPayload, CHUNK_SIZE};
use crate::config::Config;
use crate::ip_info::ClientInfoResolver;
use crate::result_store::ResultStore;
use crate::storage::build_persistence;
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ResultStore>,
    pub resolver: Arc<ClientInfoResolver>,
    pub payload: RandomPayload,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let persistence = build_persistence(&config.storage)?;
        let store = ResultStore::open(persistence)
            .await
            .context("结果存储初始化失败")?;
        let resolver =
            ClientInfoResolver::from_config(&config.geo).context("地理信息解析器初始化失败")?;
        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(resolver),
            RandomPayload::new(CHUNK_SIZE),
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<ResultStore>,
        resolver: Arc<ClientInfoResolver>,
        payload: RandomPayload,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            resolver,
            payload,
        }
    }
}
