use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{Result, TimekeepError};
use crate::ipc::{Signal, TimekeepRequest, TimekeepResponse};

/// 4-byte little-endian length prefix, MessagePack payload.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

/// Async client for the service socket.
pub struct Client {
    read: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    write: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl Client {
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            read: FramedRead::new(read, frame_codec()),
            write: FramedWrite::new(write, frame_codec()),
        })
    }

    pub async fn send(&mut self, request: &TimekeepRequest) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(request)
            .map_err(|e| TimekeepError::Ipc(format!("Serialization error: {}", e)))?;
        self.write.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    pub async fn receive(&mut self) -> Result<TimekeepResponse> {
        let frame = self
            .read
            .next()
            .await
            .ok_or_else(|| TimekeepError::Ipc("connection closed".to_string()))??;
        rmp_serde::from_slice(&frame)
            .map_err(|e| TimekeepError::Ipc(format!("Deserialization error: {}", e)))
    }

    pub async fn call(&mut self, request: &TimekeepRequest) -> Result<TimekeepResponse> {
        self.send(request).await?;
        self.receive().await
    }

    /// Like [`Client::call`], but turns an `error` response into an error and
    /// decodes the payload.
    pub async fn invoke<T: serde::de::DeserializeOwned>(
        &mut self,
        request: &TimekeepRequest,
    ) -> Result<T> {
        let response = self.call(request).await?;
        if !response.is_ok() {
            return Err(TimekeepError::Ipc(
                response
                    .error
                    .unwrap_or_else(|| format!("{} failed", request.method())),
            ));
        }
        serde_json::from_value(response.data.unwrap_or(serde_json::Value::Null))
            .map_err(|e| TimekeepError::Ipc(format!("unexpected {} reply: {}", request.method(), e)))
    }

    /// Switch this connection to a signal stream.
    pub async fn subscribe(&mut self) -> Result<()> {
        let response = self.call(&TimekeepRequest::Subscribe).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(TimekeepError::Ipc(
                response.error.unwrap_or_else(|| "subscribe refused".to_string()),
            ))
        }
    }

    /// Wait for the next broadcast on a subscribed connection.
    pub async fn next_signal(&mut self) -> Result<Signal> {
        loop {
            let frame = self.receive().await?;
            if let Some(signal) = frame.as_signal() {
                return Ok(signal);
            }
            tracing::debug!("Ignoring non-signal frame: {:?}", frame.status);
        }
    }
}
