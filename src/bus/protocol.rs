//! Bus Protocol Frames
//!
//! Frames are bincode-encoded `BusFrame` values behind a 4-byte big-endian
//! length prefix.

use bincode::{Decode, Encode};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::BusError;

/// Protocol version for compatibility checking
pub const BUS_PROTOCOL_VERSION: u8 = 1;

/// Largest accepted frame body
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Messages exchanged between bus clients and the broker
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum BusFrame {
    /// First frame sent by a client
    Hello {
        /// Client identifier (the node's instance name)
        client_id: String,
        /// Protocol version
        version: u8,
    },

    /// Handshake acknowledgment
    HelloAck {
        /// Protocol version
        version: u8,
    },

    /// Refusal of a handshake or request; the broker closes after sending it
    Reject { reason: String },

    /// Register interest in destinations matching `filter`
    Subscribe { filter: String },

    /// Subscription registered
    SubAck { filter: String },

    /// Drop a subscription
    Unsubscribe { filter: String },

    /// Subscription dropped
    UnsubAck { filter: String },

    /// A message for `destination`
    Publish {
        destination: String,
        /// Message properties (origin instance, group)
        properties: Vec<(String, String)>,
        payload: Vec<u8>,
    },

    /// Keep-alive ping
    Ping,

    /// Keep-alive pong
    Pong,

    /// Graceful disconnect notification
    Goodbye,
}

impl BusFrame {
    /// Encode frame to bytes using bincode
    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::encode_to_vec(self, bincode::config::standard())
    }

    /// Decode frame from bytes using bincode
    pub fn decode(data: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        bincode::decode_from_slice(data, bincode::config::standard()).map(|(frame, _)| frame)
    }

    /// Get the frame type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            BusFrame::Hello { .. } => "Hello",
            BusFrame::HelloAck { .. } => "HelloAck",
            BusFrame::Reject { .. } => "Reject",
            BusFrame::Subscribe { .. } => "Subscribe",
            BusFrame::SubAck { .. } => "SubAck",
            BusFrame::Unsubscribe { .. } => "Unsubscribe",
            BusFrame::UnsubAck { .. } => "UnsubAck",
            BusFrame::Publish { .. } => "Publish",
            BusFrame::Ping => "Ping",
            BusFrame::Pong => "Pong",
            BusFrame::Goodbye => "Goodbye",
        }
    }
}

/// Frame a message with length prefix for TCP transmission
pub fn frame_message(frame: &BusFrame) -> Result<Vec<u8>, bincode::error::EncodeError> {
    let payload = frame.encode()?;
    let len = payload.len() as u32;

    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload);

    Ok(out)
}

/// Read frame length from bytes (returns None if not enough data)
pub fn read_frame_length(data: &[u8]) -> Option<u32> {
    if data.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Frame a message, refusing bodies the receiving `FrameReader` would reject
pub fn encode_frame(frame: &BusFrame) -> Result<Vec<u8>, BusError> {
    let bytes =
        frame_message(frame).map_err(|e| BusError::Protocol(format!("Encode error: {}", e)))?;
    let len = bytes.len() - 4;
    if len > MAX_FRAME_SIZE {
        return Err(BusError::Protocol(format!(
            "{} frame of {} bytes exceeds the {} byte limit",
            frame.type_name(),
            len,
            MAX_FRAME_SIZE
        )));
    }
    Ok(bytes)
}

/// Write one frame
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &BusFrame,
) -> Result<(), BusError> {
    let bytes = encode_frame(frame)?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| BusError::ConnectionLost(e.to_string()))
}

/// Buffers a byte stream and splits it into frames
///
/// `next_frame` only keeps state in its own buffer, so it can be used as a
/// `tokio::select!` branch without losing data.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Next complete frame, `None` when the peer closed cleanly
    pub async fn next_frame(&mut self) -> Result<Option<BusFrame>, BusError> {
        loop {
            if let Some(len) = read_frame_length(&self.buf) {
                let len = len as usize;
                if len > MAX_FRAME_SIZE {
                    return Err(BusError::Protocol(format!(
                        "frame of {} bytes exceeds the {} byte limit",
                        len, MAX_FRAME_SIZE
                    )));
                }
                if self.buf.len() >= 4 + len {
                    let frame = self.buf.split_to(4 + len);
                    return BusFrame::decode(&frame[4..])
                        .map(Some)
                        .map_err(|e| BusError::Protocol(format!("Decode error: {}", e)));
                }
            }

            let n = self
                .inner
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| BusError::ConnectionLost(e.to_string()))?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(BusError::ConnectionLost(
                    "Connection closed mid-frame".to_string(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_publish() {
        let frame = BusFrame::Publish {
            destination: "VirtualTopic.geoserver-cluster".to_string(),
            properties: vec![("instanceName".to_string(), "node-a".to_string())],
            payload: vec![1, 2, 3, 4],
        };

        let encoded = frame.encode().unwrap();
        let decoded = BusFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_frame_message() {
        let frame = frame_message(&BusFrame::Ping).unwrap();

        let len = read_frame_length(&frame).unwrap();
        assert_eq!(len as usize, frame.len() - 4);
        assert_eq!(BusFrame::decode(&frame[4..]).unwrap(), BusFrame::Ping);
    }

    #[test]
    fn test_read_frame_length_short() {
        assert_eq!(read_frame_length(&[0, 0, 1]), None);
    }

    #[tokio::test]
    async fn test_reader_splits_coalesced_frames() {
        let mut bytes = frame_message(&BusFrame::Hello {
            client_id: "node-a".to_string(),
            version: BUS_PROTOCOL_VERSION,
        })
        .unwrap();
        bytes.extend(frame_message(&BusFrame::Subscribe {
            filter: "VirtualTopic.>".to_string(),
        })
        .unwrap());

        let mut reader = FrameReader::new(&bytes[..]);
        assert!(matches!(
            reader.next_frame().await.unwrap(),
            Some(BusFrame::Hello { .. })
        ));
        assert!(matches!(
            reader.next_frame().await.unwrap(),
            Some(BusFrame::Subscribe { .. })
        ));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_truncated_frame() {
        let bytes = frame_message(&BusFrame::Goodbye).unwrap();
        let mut with_extra = bytes.clone();
        with_extra.extend_from_slice(&[0, 0, 0, 9, 1]);

        let mut reader = FrameReader::new(&with_extra[..]);
        assert_eq!(reader.next_frame().await.unwrap(), Some(BusFrame::Goodbye));
        assert!(matches!(
            reader.next_frame().await,
            Err(BusError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized_frame() {
        let bytes = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        let mut reader = FrameReader::new(&bytes[..]);
        assert!(matches!(reader.next_frame().await, Err(BusError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_not_written() {
        let frame = BusFrame::Publish {
            destination: "VirtualTopic.g".to_string(),
            properties: Vec::new(),
            payload: vec![0; MAX_FRAME_SIZE],
        };
        assert!(matches!(encode_frame(&frame), Err(BusError::Protocol(_))));

        let mut out = Vec::new();
        assert!(matches!(
            write_frame(&mut out, &frame).await,
            Err(BusError::Protocol(_))
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, &BusFrame::Pong).await.unwrap();
        assert_eq!(out, frame_message(&BusFrame::Pong).unwrap());
    }
}
