//! Message Bus Module
//!
//! A small topic bus carrying cluster events between nodes: a framed TCP
//! protocol, `.`-separated destinations with `*`/`>` wildcards, the client
//! side connection container and an embeddable broker.

use std::fmt;

mod broker;
mod client;
mod destination;
mod protocol;


pub use broker::{EmbeddedBroker, EmbeddedBrokerConfig};
pub use client::{parse_broker_url, BusClient, BusClientConfig, InboundMessage};
pub use destination::{
    destination_matches, publish_destination, validate_destination, validate_filter,
};
pub use protocol::{
    encode_frame, frame_message, read_frame_length, BusFrame, FrameReader, BUS_PROTOCOL_VERSION,
    MAX_FRAME_SIZE,
};

/// Message bus error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No connection to the broker
    NotConnected,
    /// Connection to the broker failed or was lost
    ConnectionLost(String),
    /// The broker refused the client or one of its requests
    Rejected(String),
    /// Operation timed out
    Timeout,
    /// Broker URL is not `tcp://host:port`
    InvalidUrl(String),
    /// Malformed frame or unexpected message
    Protocol(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NotConnected => write!(f, "Not connected"),
            BusError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            BusError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            BusError::Timeout => write!(f, "Operation timed out"),
            BusError::InvalidUrl(url) => write!(f, "Invalid broker URL: {}", url),
            BusError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for BusError {}
