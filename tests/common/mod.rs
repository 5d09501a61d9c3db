#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use speedtest_server::byte_stream::RandomPayload;
use speedtest_server::config::Config;
use speedtest_server::error::SpeedtestError;
use speedtest_server::ip_info::{ClientInfo, ClientInfoResolver, GeoLookup, Lookup};
use speedtest_server::records::ResultCollection;
use speedtest_server::result_store::ResultStore;
use speedtest_server::state::AppState;
use speedtest_server::storage::{JsonFileStorage, ResultPersistence};
use speedtest_server::build_router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const SERVER_PUBLIC_IP: &str = "198.51.100.7";
pub const TEST_CHUNK_SIZE: usize = 256 * 1024;

/// 固定返回「Testland」的地理查询，不访问外网。
pub struct FixedGeoLookup;

#[async_trait]
impl GeoLookup for FixedGeoLookup {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn lookup(&self, ip: Option<&str>) -> Result<Lookup, SpeedtestError> {
        Ok(Lookup::Complete(ClientInfo {
            ip: ip.unwrap_or(SERVER_PUBLIC_IP).to_string(),
            country: "Testland".to_string(),
            city: "Sample City".to_string(),
            isp: "Example Transit".to_string(),
        }))
    }
}

/// 读取正常、写入总是失败的存储。
pub struct FailingStorage;

#[async_trait]
impl ResultPersistence for FailingStorage {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    async fn load(&self) -> Result<Option<ResultCollection>, SpeedtestError> {
        Ok(Some(ResultCollection::default()))
    }

    async fn save(&self, _collection: &ResultCollection) -> Result<(), SpeedtestError> {
        Err(SpeedtestError::PersistenceFailure("disk full".to_string()))
    }
}

pub struct TestServer {
    pub base_url: String,
    pub data_path: PathBuf,
    pub state: Arc<AppState>,
    _temp_dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("create temp dir failed")?;
        let data_path = temp_dir.path().join("speedtest_data.json");
        let persistence: Arc<dyn ResultPersistence> = Arc::new(JsonFileStorage::new(&data_path));
        Self::start_with(temp_dir, data_path, persistence, Config::default()).await
    }

    pub async fn start_with_failing_storage() -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("create temp dir failed")?;
        let data_path = temp_dir.path().join("unused.json");
        Self::start_with(temp_dir, data_path, Arc::new(FailingStorage), Config::default()).await
    }

    pub async fn start_with_config(config: Config) -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("create temp dir failed")?;
        let data_path = temp_dir.path().join("speedtest_data.json");
        let persistence: Arc<dyn ResultPersistence> = Arc::new(JsonFileStorage::new(&data_path));
        Self::start_with(temp_dir, data_path, persistence, config).await
    }

    async fn start_with(
        temp_dir: TempDir,
        data_path: PathBuf,
        persistence: Arc<dyn ResultPersistence>,
        config: Config,
    ) -> Result<Self> {
        let store = ResultStore::open(persistence)
            .await
            .context("open result store failed")?;
        let resolver = ClientInfoResolver::new(
            vec![Arc::new(FixedGeoLookup) as Arc<dyn GeoLookup>],
            Duration::from_secs(60),
        );
        let state = Arc::new(AppState::from_parts(
            config,
            Arc::new(store),
            Arc::new(resolver),
            RandomPayload::new(TEST_CHUNK_SIZE),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind test listener failed")?;
        let addr = listener.local_addr()?;
        let app = build_router(state.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            data_path,
            state,
            _temp_dir: temp_dir,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
