// 上传测速接收端：完整读取请求体并只统计字节数，不做任何解析。
use crate::error::SpeedtestError;
use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;

/// 读取整个字节流并返回接收到的长度。
///
/// 流中途出错（连接断开、请求体被截断）时返回 `TransferIncomplete`，
/// 累计长度超过 `limit` 时立即停止读取并返回 `PayloadTooLarge`。
pub async fn drain<S, E>(stream: S, limit: u64) -> Result<u64, SpeedtestError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    futures::pin_mut!(stream);
    let mut received: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| SpeedtestError::TransferIncomplete {
            received,
            reason: err.to_string(),
        })?;
        received += chunk.len() as u64;
        if received > limit {
            return Err(SpeedtestError::PayloadTooLarge { limit });
        }
    }
    Ok(received)
}

pub async fn drain_body(body: Body, limit: u64) -> Result<u64, SpeedtestError> {
    drain(body.into_data_stream(), limit).await
}
