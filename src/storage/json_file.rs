use super::ResultPersistence;
use crate::error::SpeedtestError;
use crate::records::ResultCollection;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 单文件 JSON 存储：先写临时文件再重命名覆盖，读者永远看不到写了一半的文件。
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[async_trait]
impl ResultPersistence for JsonFileStorage {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    async fn load(&self) -> Result<Option<ResultCollection>, SpeedtestError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SpeedtestError::persistence(
                    &format!("read {}", self.path.display()),
                    err,
                ))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|err| {
            SpeedtestError::persistence(&format!("parse {}", self.path.display()), err)
        })
    }

    async fn save(&self, collection: &ResultCollection) -> Result<(), SpeedtestError> {
        let serialized = serde_json::to_string_pretty(collection)
            .map_err(|err| SpeedtestError::persistence("serialize results", err))?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|err| {
                SpeedtestError::persistence(&format!("create dir {}", parent.display()), err)
            })?;
        }
        let temp_path = self.temp_path();
        fs::write(&temp_path, serialized.as_bytes())
            .await
            .map_err(|err| {
                SpeedtestError::persistence(&format!("write {}", temp_path.display()), err)
            })?;
        // rename 覆盖已存在的目标是原子的；失败时旧文件原样保留，只清理临时文件。
        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(SpeedtestError::persistence(
                &format!("replace {}", self.path.display()),
                err,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Measurement, Record};
    use chrono::Utc;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("absent.json"));
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested").join("results.json"));
        let mut collection = ResultCollection::default();
        collection.records.push(Record::new(
            "192.0.2.10",
            Measurement::new(88.8, 11.1, 9.5),
            Utc::now(),
        ));
        collection.reconcile(Utc::now());
        storage.save(&collection).await.unwrap();

        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.weekly_top.len(), 1);
        assert_eq!(loaded.records[0].identity, "192.0.2.10");
        assert!(!storage.temp_path().exists());
    }

    #[tokio::test]
    async fn empty_collection_layout_matches_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("results.json"));
        storage.save(&ResultCollection::default()).await.unwrap();
        let raw = std::fs::read_to_string(storage.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({ "records": [], "weekly_top": [] }));
    }

    #[tokio::test]
    async fn corrupt_file_is_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SpeedtestError::PersistenceFailure(_)));
    }

    #[tokio::test]
    async fn unwritable_target_is_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let storage = JsonFileStorage::new(blocker.join("results.json"));
        let err = storage.save(&ResultCollection::default()).await.unwrap_err();
        assert!(matches!(err, SpeedtestError::PersistenceFailure(_)));
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_target_and_cleans_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        // 目标被占成非空目录，rename 必然失败。
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), "committed").unwrap();
        let storage = JsonFileStorage::new(&path);

        let err = storage.save(&ResultCollection::default()).await.unwrap_err();
        assert!(matches!(err, SpeedtestError::PersistenceFailure(_)));
        assert_eq!(
            std::fs::read_to_string(path.join("keep.txt")).unwrap(),
            "committed"
        );
        assert!(!storage.temp_path().exists());
    }

    #[tokio::test]
    async fn save_replaces_existing_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("results.json"));
        storage.save(&ResultCollection::default()).await.unwrap();

        let mut collection = ResultCollection::default();
        collection.records.push(Record::new(
            "192.0.2.11",
            Measurement::new(12.0, 3.0, 4.0),
            Utc::now(),
        ));
        storage.save(&collection).await.unwrap();

        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(!storage.temp_path().exists());
    }
}
