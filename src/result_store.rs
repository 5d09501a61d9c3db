// 结果存储：串行化的追加提交（修剪、重排、落盘）与无锁快照读取。
use crate::error::SpeedtestError;
use crate::records::{BestRecord, Measurement, Record, ResultCollection};
use crate::storage::ResultPersistence;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// 进程内唯一的结果集合持有者。
///
/// 写入方通过 `writer` 互斥，整个「复制、追加、修剪、重排、落盘」过程在锁内完成，
/// 只有落盘成功后才替换快照；失败时快照保持不变，相当于回滚。
/// 读取方只克隆当前快照的 `Arc`，看到的要么是提交前的版本，要么是提交后的版本。
pub struct ResultStore {
    snapshot: RwLock<Arc<ResultCollection>>,
    writer: Mutex<()>,
    persistence: Arc<dyn ResultPersistence>,
}

impl ResultStore {
    pub async fn open(persistence: Arc<dyn ResultPersistence>) -> Result<Self, SpeedtestError> {
        Self::open_at(persistence, Utc::now()).await
    }

    /// 加载持久化集合并立即按 `now` 修剪；文件不存在或有记录被修剪时写回。
    pub async fn open_at(
        persistence: Arc<dyn ResultPersistence>,
        now: DateTime<Utc>,
    ) -> Result<Self, SpeedtestError> {
        let loaded = persistence.load().await?;
        let missing = loaded.is_none();
        let mut collection = loaded.unwrap_or_default();
        let pruned = collection.reconcile(now);
        if missing || pruned > 0 {
            persistence.save(&collection).await?;
        }
        info!(
            storage = %persistence.describe(),
            records = collection.records.len(),
            pruned,
            "result store opened"
        );
        Ok(Self {
            snapshot: RwLock::new(Arc::new(collection)),
            writer: Mutex::new(()),
            persistence,
        })
    }

    pub async fn append(
        &self,
        identity: &str,
        measurement: Measurement,
    ) -> Result<Record, SpeedtestError> {
        self.append_at(identity, measurement, Utc::now()).await
    }

    pub async fn append_at(
        &self,
        identity: &str,
        measurement: Measurement,
        now: DateTime<Utc>,
    ) -> Result<Record, SpeedtestError> {
        measurement.validate()?;
        let _guard = self.writer.lock().await;

        let mut next = ResultCollection::clone(&self.snapshot());
        let record = Record::new(identity, measurement, now);
        next.records.push(record.clone());
        let pruned = next.reconcile(now);

        if let Err(err) = self.persistence.save(&next).await {
            error!(identity, "result commit failed: {err}");
            return Err(err);
        }
        *self.snapshot.write() = Arc::new(next);
        info!(
            identity,
            download = record.download,
            upload = record.upload,
            latency = record.latency,
            pruned,
            "result committed"
        );
        Ok(record)
    }

    pub fn best_for(&self, identity: &str) -> Option<BestRecord> {
        self.best_for_at(identity, Utc::now())
    }

    pub fn best_for_at(&self, identity: &str, now: DateTime<Utc>) -> Option<BestRecord> {
        self.snapshot().best_for(identity, now)
    }

    pub fn leaderboard(&self) -> Vec<Record> {
        self.leaderboard_at(Utc::now())
    }

    pub fn leaderboard_at(&self, now: DateTime<Utc>) -> Vec<Record> {
        self.snapshot().leaderboard_view(now)
    }

    pub fn snapshot(&self) -> Arc<ResultCollection> {
        self.snapshot.read().clone()
    }
}
