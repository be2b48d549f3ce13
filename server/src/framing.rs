//! Reassembly of inbound transport messages into candidate requests.
//!
//! Fragmented (continuation) frames are joined by the WebSocket layer. The assembler configures
//! that layer so the size limit is enforced on every frame header, before a payload is buffered,
//! and turns whatever the layer yields into either a complete request frame or a protocol fault.

use crate::errors::ProtocolError;
use tokio_tungstenite::tungstenite::{
    self,
    error::CapacityError,
    protocol::{Message, WebSocketConfig},
};

/// What the connection should do with one inbound transport item.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A complete binary message.
    Frame(Vec<u8>),
    /// Control traffic the transport already handled.
    Ignore,
    /// The client closed the connection.
    Closed,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameAssembler {
    limit: usize,
}

impl FrameAssembler {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Transport settings that make the WebSocket layer stop reading a message as soon as its
    /// running size would exceed the limit.
    #[allow(deprecated)]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.limit),
            max_frame_size: Some(self.limit),
            ..WebSocketConfig::default()
        }
    }

    pub fn accept(
        &self,
        item: Option<Result<Message, tungstenite::Error>>,
    ) -> Result<Inbound, ProtocolError> {
        let message = match item {
            None => return Ok(Inbound::Closed),
            Some(Ok(message)) => message,
            Some(Err(tungstenite::Error::Capacity(CapacityError::MessageTooLong {
                size,
                max_size,
            }))) => {
                return Err(ProtocolError::TooLarge {
                    size,
                    limit: max_size,
                })
            }
            Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(Inbound::Closed),
            Some(Err(err)) => return Err(ProtocolError::Transport(err)),
        };
        match message {
            Message::Binary(data) if data.len() > self.limit => Err(ProtocolError::TooLarge {
                size: data.len(),
                limit: self.limit,
            }),
            Message::Binary(data) => Ok(Inbound::Frame(data)),
            Message::Text(_) => Err(ProtocolError::NotBinary),
            Message::Close(_) => Ok(Inbound::Closed),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Ignore),
        }
    }
}
