use super::ResultPersistence;
use crate::error::SpeedtestError;
use crate::records::ResultCollection;
use async_trait::async_trait;
use parking_lot::Mutex;

/// 进程内存储，进程退出即丢失；用于临时部署与测试。
#[derive(Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<ResultCollection>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(collection: ResultCollection) -> Self {
        Self {
            saved: Mutex::new(Some(collection)),
        }
    }

    pub fn saved(&self) -> Option<ResultCollection> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ResultPersistence for MemoryStorage {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<Option<ResultCollection>, SpeedtestError> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, collection: &ResultCollection) -> Result<(), SpeedtestError> {
        *self.saved.lock() = Some(collection.clone());
        Ok(())
    }
}
