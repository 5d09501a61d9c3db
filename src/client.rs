// 测速客户端：按 延迟 → 下载 → 上传 → 保存 的顺序驱动一次完整测速。
use crate::byte_stream::BYTES_PER_MB;
use crate::ip_info::ClientInfo;
use crate::latency::{LatencySummary, PingReply, DEFAULT_PROBE_COUNT, PONG};
use crate::records::{Measurement, Record};
use crate::schemas::{
    BestRecordsResponse, ErrorEnvelope, LeaderboardResponse, SaveResultResponse, UploadResponse,
};
use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use rand::RngCore;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_DOWNLOAD_MB: u64 = 20;
pub const DEFAULT_UPLOAD_MB: u64 = 10;

/// 按 `字节 * 8 / 秒 / 1024 / 1024` 换算为 Mbps，结果保留两位小数。
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    let value = bytes as f64 * 8.0 / seconds / 1024.0 / 1024.0;
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TransferSample {
    pub bytes: u64,
    pub elapsed_ms: f64,
    pub mbps: f64,
}

impl TransferSample {
    fn new(bytes: u64, elapsed: Duration) -> Self {
        Self {
            bytes,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            mbps: mbps(bytes, elapsed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub pings: usize,
    pub download_mb: u64,
    pub upload_mb: u64,
    pub save: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pings: DEFAULT_PROBE_COUNT,
            download_mb: DEFAULT_DOWNLOAD_MB,
            upload_mb: DEFAULT_UPLOAD_MB,
            save: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub latency: Option<LatencySummary>,
    pub download: TransferSample,
    pub upload: TransferSample,
    pub saved: Option<SaveResultResponse>,
}

impl RunReport {
    pub fn measurement(&self) -> Measurement {
        let latency = self.latency.map(|summary| summary.mean_ms).unwrap_or(0.0);
        Measurement::new(self.download.mbps, self.upload.mbps, latency)
    }
}

#[derive(Clone)]
pub struct SpeedtestClient {
    http: Client,
    base: Url,
}

impl SpeedtestClient {
    pub fn new(server: &str) -> Result<Self> {
        let mut base = Url::parse(server.trim()).with_context(|| format!("无效的服务地址: {server}"))?;
        // 保证以 / 结尾，相对路径 join 时不会吃掉已有前缀。
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self { http, base })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("拼接请求地址失败: {path}"))
    }

    /// 单次延迟探测，返回往返耗时。
    pub async fn ping(&self) -> Result<Duration> {
        let url = self.endpoint("ping")?;
        let started = Instant::now();
        let response = checked(self.http.get(url).send().await?).await?;
        let reply: PingReply = response.json().await?;
        let elapsed = started.elapsed();
        if reply.status != PONG {
            bail!("unexpected ping status: {}", reply.status);
        }
        Ok(elapsed)
    }

    pub async fn measure_latency(&self, count: usize) -> Result<Option<LatencySummary>> {
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            samples.push(self.ping().await?);
        }
        Ok(LatencySummary::from_samples(&samples))
    }

    pub async fn download(&self, size_mb: u64) -> Result<TransferSample> {
        let url = self.endpoint(&format!("download/{size_mb}"))?;
        let started = Instant::now();
        let response = checked(self.http.get(url).send().await?).await?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("下载中断")?;
            received += chunk.len() as u64;
        }
        let sample = TransferSample::new(received, started.elapsed());
        debug!(bytes = received, mbps = sample.mbps, "download finished");
        Ok(sample)
    }

    pub async fn upload(&self, size_mb: u64) -> Result<TransferSample> {
        let url = self.endpoint("upload")?;
        let mut payload = vec![0u8; (size_mb * BYTES_PER_MB) as usize];
        rand::thread_rng().fill_bytes(&mut payload);
        let sent = payload.len() as u64;
        let started = Instant::now();
        let response = checked(
            self.http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(payload)
                .send()
                .await?,
        )
        .await?;
        let ack: UploadResponse = response.json().await?;
        let elapsed = started.elapsed();
        if ack.received != sent {
            bail!("server acknowledged {} of {sent} bytes", ack.received);
        }
        let sample = TransferSample::new(sent, elapsed);
        debug!(bytes = sent, mbps = sample.mbps, "upload finished");
        Ok(sample)
    }

    pub async fn save(&self, measurement: &Measurement) -> Result<SaveResultResponse> {
        let url = self.endpoint("api/save-result")?;
        let response = checked(self.http.post(url).json(measurement).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn best_records(&self) -> Result<BestRecordsResponse> {
        self.get_json("api/best-records").await
    }

    pub async fn leaderboard(&self) -> Result<Vec<Record>> {
        let response: LeaderboardResponse = self.get_json("api/leaderboard").await?;
        Ok(response.top)
    }

    pub async fn client_info(&self) -> Result<ClientInfo> {
        self.get_json("api/client-info").await
    }

    pub async fn server_info(&self) -> Result<ClientInfo> {
        self.get_json("api/server-info").await
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let latency = self.measure_latency(options.pings).await?;
        let download = self.download(options.download_mb).await?;
        let upload = self.upload(options.upload_mb).await?;
        let mut report = RunReport {
            latency,
            download,
            upload,
            saved: None,
        };
        if options.save {
            report.saved = Some(self.save(&report.measurement()).await?);
        }
        Ok(report)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = checked(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.message)
        .unwrap_or(body);
    Err(anyhow!("request failed ({status}): {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mbps_uses_binary_megabits() {
        // 20 MiB in 2 seconds is 80 Mbps.
        assert_eq!(mbps(20 * BYTES_PER_MB, Duration::from_secs(2)), 80.0);
        assert_eq!(mbps(1024, Duration::ZERO), 0.0);
    }

    #[test]
    fn mbps_rounds_to_two_decimals() {
        assert_eq!(mbps(1_000_000, Duration::from_secs(3)), 2.54);
    }

    #[test]
    fn endpoint_keeps_base_prefix() {
        let client = SpeedtestClient::new("http://127.0.0.1:8080/speed").unwrap();
        assert_eq!(
            client.endpoint("/download/20").unwrap().as_str(),
            "http://127.0.0.1:8080/speed/download/20"
        );
        let client = SpeedtestClient::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            client.endpoint("api/leaderboard").unwrap().as_str(),
            "http://127.0.0.1:8080/api/leaderboard"
        );
    }

    #[test]
    fn report_uses_mean_latency() {
        let report = RunReport {
            latency: LatencySummary::from_samples(&[
                Duration::from_millis(10),
                Duration::from_millis(20),
            ]),
            download: TransferSample::new(20 * BYTES_PER_MB, Duration::from_secs(2)),
            upload: TransferSample::new(10 * BYTES_PER_MB, Duration::from_secs(2)),
            saved: None,
        };
        let measurement = report.measurement();
        assert_eq!(measurement.download, 80.0);
        assert_eq!(measurement.upload, 40.0);
        assert!((measurement.latency - 15.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_server_url() {
        assert!(SpeedtestClient::new("not a url").is_err());
    }
}
