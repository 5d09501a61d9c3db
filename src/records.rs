// 测速记录模型：单条结果、持久化集合、按身份聚合的最佳记录，以及保留窗口内的排名计算。
use crate::error::SpeedtestError;
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

pub const RETENTION_DAYS: i64 = 7;
pub const LEADERBOARD_SIZE: usize = 10;
const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 客户端提交的一次完整测速结果（Mbps / ms），缺失字段按 0 处理。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub download: f64,
    #[serde(default)]
    pub upload: f64,
    #[serde(default)]
    pub latency: f64,
}

impl Measurement {
    pub fn new(download: f64, upload: f64, latency: f64) -> Self {
        Self {
            download,
            upload,
            latency,
        }
    }

    pub fn validate(&self) -> Result<(), SpeedtestError> {
        for (name, value) in [
            ("download", self.download),
            ("upload", self.upload),
            ("latency", self.latency),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SpeedtestError::InvalidMeasurement(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
            // 入库值是两位小数，放大 100 倍后溢出的数无法写回 JSON。
            if !round2(value).is_finite() {
                return Err(SpeedtestError::InvalidMeasurement(format!(
                    "{name} is out of range, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// 已提交的测速记录，创建后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "ip")]
    pub identity: String,
    pub download: f64,
    pub upload: f64,
    pub latency: f64,
    #[serde(rename = "timestamp", with = "timestamp_format")]
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub date: String,
}

impl Record {
    pub fn new(identity: &str, measurement: Measurement, observed_at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            download: round2(measurement.download),
            upload: round2(measurement.upload),
            latency: round2(measurement.latency),
            observed_at,
            date: observed_at
                .with_timezone(&Local)
                .format(DISPLAY_DATE_FORMAT)
                .to_string(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 某个身份的历史最佳：三项各自独立选出，不要求来自同一条记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub download: Record,
    pub upload: Record,
    pub latency: Record,
}

/// 持久化的结果集合，`weekly_top` 只由 `reconcile` 从 `records` 派生。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultCollection {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, alias = "weeklyTop")]
    pub weekly_top: Vec<Record>,
}

pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RETENTION_DAYS)
}

fn within_window(record: &Record, cutoff: DateTime<Utc>) -> bool {
    record.observed_at >= cutoff
}

/// 按下载速度降序取前 10 条；排序稳定，速度相同时保持插入顺序（更早的在前）。
pub fn rank_by_download<'a, I>(records: I) -> Vec<Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut ranked: Vec<&Record> = records.into_iter().collect();
    ranked.sort_by(|left, right| right.download.total_cmp(&left.download));
    ranked
        .into_iter()
        .take(LEADERBOARD_SIZE)
        .cloned()
        .collect()
}

impl ResultCollection {
    /// 删除保留窗口之外的记录并重新计算排行榜，返回被删除的条数。
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = retention_cutoff(now);
        let before = self.records.len();
        self.records.retain(|record| within_window(record, cutoff));
        self.weekly_top = rank_by_download(&self.records);
        before - self.records.len()
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        let cutoff = retention_cutoff(now);
        self.records
            .iter()
            .any(|record| !within_window(record, cutoff))
    }

    /// 读取视图下的排行榜：没有记录过期时原样返回 `weekly_top`，
    /// 否则在未过期的记录上重新排名（不修改集合本身）。
    pub fn leaderboard_view(&self, now: DateTime<Utc>) -> Vec<Record> {
        if !self.has_expired(now) {
            return self.weekly_top.clone();
        }
        let cutoff = retention_cutoff(now);
        rank_by_download(
            self.records
                .iter()
                .filter(|record| within_window(record, cutoff)),
        )
    }

    pub fn best_for(&self, identity: &str, now: DateTime<Utc>) -> Option<BestRecord> {
        let cutoff = retention_cutoff(now);
        let mut matching = self
            .records
            .iter()
            .filter(|record| record.identity == identity && within_window(record, cutoff));
        let first = matching.next()?;
        let mut download = first;
        let mut upload = first;
        let mut latency = first;
        // 严格比较：并列时保留最早的那条。
        for record in matching {
            if record.download > download.download {
                download = record;
            }
            if record.upload > upload.upload {
                upload = record;
            }
            if record.latency < latency.latency {
                latency = record;
            }
        }
        Some(BestRecord {
            download: download.clone(),
            upload: upload.clone(),
            latency: latency.clone(),
        })
    }
}

/// 时间戳以 RFC 3339 写出；读取时兼容不带时区的本地时间（旧数据文件的格式）。
mod timestamp_format {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(parsed.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|err| de::Error::custom(format!("invalid timestamp {trimmed}: {err}")))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| de::Error::custom(format!("unrepresentable local time {trimmed}")))
    }
}
