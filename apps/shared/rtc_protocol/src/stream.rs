use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::message::ChannelMessage;

/// Default maximum frame size: 16MB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Extension trait for reading ChannelMessages from any async byte source
///
/// Frame format: [4 bytes big-endian length][bincode message bytes]
pub trait ChannelRead {
    /// Read a ChannelMessage with the default max size
    async fn read_channel_message(&mut self) -> Result<ChannelMessage>;

    /// Read a ChannelMessage rejecting frames larger than `max_size`
    async fn read_channel_message_with_max_size(
        &mut self,
        max_size: usize,
    ) -> Result<ChannelMessage>;
}

/// Extension trait for writing ChannelMessages to any async byte sink
pub trait ChannelWrite {
    /// Write a ChannelMessage with the default max size
    async fn write_channel_message(&mut self, message: &ChannelMessage) -> Result<()>;

    /// Write a ChannelMessage rejecting encodings larger than `max_size`
    async fn write_channel_message_with_max_size(
        &mut self,
        message: &ChannelMessage,
        max_size: usize,
    ) -> Result<()>;
}

impl<R: AsyncRead + Unpin> ChannelRead for R {
    async fn read_channel_message(&mut self) -> Result<ChannelMessage> {
        self.read_channel_message_with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
            .await
    }

    async fn read_channel_message_with_max_size(
        &mut self,
        max_size: usize,
    ) -> Result<ChannelMessage> {
        // A clean EOF before the length prefix means the peer hung up
        let len = match self.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        };

        if len > max_size {
            return Err(ProtocolError::MessageTooLarge(len, max_size));
        }

        if len == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut buffer = vec![0u8; len];
        self.read_exact(&mut buffer).await?;

        ChannelMessage::from_bytes(&buffer).map_err(Into::into)
    }
}

impl<W: AsyncWrite + Unpin> ChannelWrite for W {
    async fn write_channel_message(&mut self, message: &ChannelMessage) -> Result<()> {
        self.write_channel_message_with_max_size(message, DEFAULT_MAX_MESSAGE_SIZE)
            .await
    }

    async fn write_channel_message_with_max_size(
        &mut self,
        message: &ChannelMessage,
        max_size: usize,
    ) -> Result<()> {
        let data = message.to_bytes()?;

        if data.len() > max_size {
            return Err(ProtocolError::MessageTooLarge(data.len(), max_size));
        }

        self.write_u32(data.len() as u32).await?;
        self.write_all(&data).await?;

        // Replies and events are latency sensitive, flush every frame
        self.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EventMessage, MethodResult};
    use crate::value::{Payload, Value};

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let mut payload = Payload::new();
        payload.insert("uid".into(), Value::Int(7));
        let first = ChannelMessage::Event(EventMessage::new("onUserJoined", payload));
        let second = ChannelMessage::Reply {
            id: 3,
            result: MethodResult::Success(Some(Value::Bool(true))),
        };

        server.write_channel_message(&first).await.unwrap();
        server.write_channel_message(&second).await.unwrap();

        assert_eq!(client.read_channel_message().await.unwrap(), first);
        assert_eq!(client.read_channel_message().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        server.write_u32(1024).await.unwrap();

        let err = client
            .read_channel_message_with_max_size(16)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge(1024, 16)));
    }

    #[tokio::test]
    async fn test_hangup_is_connection_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let err = client.read_channel_message().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
