// 下载测速数据源：按固定块惰性产出不可压缩的伪随机字节流，内存占用恒为一个块。
use bytes::Bytes;
use futures::Stream;
use rand::RngCore;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

pub const BYTES_PER_MB: u64 = 1024 * 1024;
pub const MAX_DOWNLOAD_MB: u64 = 100;
pub const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// 请求大小超过上限时截断到 100 MB，限制单次下载的服务端负载。
pub fn clamp_size_mb(requested: u64) -> u64 {
    requested.min(MAX_DOWNLOAD_MB)
}

pub fn download_len(requested_mb: u64) -> u64 {
    clamp_size_mb(requested_mb) * BYTES_PER_MB
}

/// 进程内共享的随机块，每个下载流都以零拷贝切片的方式重复发送它。
#[derive(Clone)]
pub struct RandomPayload {
    block: Bytes,
}

impl RandomPayload {
    pub fn new(chunk_size: usize) -> Self {
        let mut block = vec![0u8; chunk_size.max(1)];
        rand::thread_rng().fill_bytes(&mut block);
        Self {
            block: Bytes::from(block),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.block.len()
    }

    pub fn stream(&self, total_bytes: u64) -> DownloadStream {
        DownloadStream {
            block: self.block.clone(),
            total: total_bytes,
            sent: 0,
        }
    }
}

/// 有限、一次性消费的下载流。
///
/// 只有在传输层再次轮询时才会产出下一块，因此生成速度天然受背压约束；
/// 客户端断开时 hyper 直接丢弃该流，不会继续生成数据。
pub struct DownloadStream {
    block: Bytes,
    total: u64,
    sent: u64,
}

impl DownloadStream {
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn remaining_chunks(&self) -> usize {
        let remaining = self.total - self.sent;
        let chunk = self.block.len() as u64;
        remaining.div_ceil(chunk) as usize
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let remaining = this.total - this.sent;
        if remaining == 0 {
            return Poll::Ready(None);
        }
        let len = remaining.min(this.block.len() as u64) as usize;
        this.sent += len as u64;
        Poll::Ready(Some(Ok(this.block.slice(..len))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunks = self.remaining_chunks();
        (chunks, Some(chunks))
    }
}

impl Drop for DownloadStream {
    fn drop(&mut self) {
        if self.sent < self.total {
            debug!(
                sent = self.sent,
                total = self.total,
                "download stream dropped before completion"
            );
        }
    }
}
