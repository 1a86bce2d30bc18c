//! Frame codec: a big-endian `u32` length followed by a bincode body.

use super::message::KvMessage;
use crate::error::{KvError, KvResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame. Comfortably above a maximum-size value plus key.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub async fn write_message<W>(writer: &mut W, message: &KvMessage) -> KvResult<()>
where
    W: AsyncWrite + Unpin,
{
    let body = bincode::serialize(message).map_err(|e| {
        tracing::error!("Failed to encode {} message: {}", message.kind(), e);
        KvError::InvalidFormat
    })?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(KvError::InvalidFormat);
    }

    let len = body.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|_| KvError::CouldNotConnect)?;
    writer
        .write_all(&body)
        .await
        .map_err(|_| KvError::CouldNotConnect)?;
    writer.flush().await.map_err(|_| KvError::CouldNotConnect)?;
    Ok(())
}

pub async fn read_message<R>(reader: &mut R) -> KvResult<KvMessage>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|_| KvError::CouldNotReceiveData)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        tracing::warn!("Rejecting oversized frame of {} bytes", len);
        return Err(KvError::InvalidFormat);
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| KvError::CouldNotReceiveData)?;

    bincode::deserialize(&body).map_err(|e| {
        tracing::warn!("Failed to decode message: {}", e);
        KvError::InvalidFormat
    })
}
