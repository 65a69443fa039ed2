//! Cluster Events
//!
//! What travels between nodes: catalog mutations, settings changes and the
//! style documents backing styles. `EventSerializer` maps them to and from
//! transport payloads.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogInfo, GeoServerInfo, LoggingInfo, ServiceInfo};
use crate::error::Result;

mod json;
mod schema;


pub use json::JsonEventSerializer;
pub use schema::{omitted_fields, omitted_settings_fields};

/// Event property asking a style removal to delete the style document too
pub const PURGE_PROPERTY: &str = "purge";

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Add,
    Modify,
    Remove,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Add => write!(f, "Add"),
            EventKind::Modify => write!(f, "Modify"),
            EventKind::Remove => write!(f, "Remove"),
        }
    }
}

/// A catalog mutation made on some node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEvent {
    pub kind: EventKind,
    pub source: CatalogInfo,
    pub properties: BTreeMap<String, String>,
}

impl CatalogEvent {
    pub fn new(kind: EventKind, source: CatalogInfo) -> Self {
        Self {
            kind,
            source,
            properties: BTreeMap::new(),
        }
    }

    pub fn add(source: CatalogInfo) -> Self {
        Self::new(EventKind::Add, source)
    }

    pub fn modify(source: CatalogInfo) -> Self {
        Self::new(EventKind::Modify, source)
    }

    pub fn remove(source: CatalogInfo) -> Self {
        Self::new(EventKind::Remove, source)
    }

    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Read a boolean property; absent or unparsable reads as false
    pub fn flag(&self, key: &str) -> bool {
        self.property(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

impl fmt::Display for CatalogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.source)?;
        if !self.properties.is_empty() {
            write!(f, " {:?}", self.properties)?;
        }
        Ok(())
    }
}

/// A settings change made on some node
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationEvent {
    Global(GeoServerInfo),
    Service { kind: EventKind, service: ServiceInfo },
    Logging(LoggingInfo),
}

impl fmt::Display for ConfigurationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationEvent::Global(g) => write!(f, "Modify GeoServerInfo[id={}]", g.id),
            ConfigurationEvent::Service { kind, service } => write!(
                f,
                "{} ServiceInfo[id={}, name={}]",
                kind, service.id, service.name
            ),
            ConfigurationEvent::Logging(l) => write!(f, "Modify LoggingInfo[level={}]", l.level),
        }
    }
}

/// Content of a style document, addressed relative to the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDocument {
    pub path: String,
    pub content: String,
}

/// Anything replicated between nodes
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    Catalog(CatalogEvent),
    Configuration(ConfigurationEvent),
    Document(StyleDocument),
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterEvent::Catalog(e) => write!(f, "{}", e),
            ClusterEvent::Configuration(e) => write!(f, "{}", e),
            ClusterEvent::Document(d) => {
                write!(f, "StyleDocument[{} ({} bytes)]", d.path, d.content.len())
            }
        }
    }
}

impl From<CatalogEvent> for ClusterEvent {
    fn from(e: CatalogEvent) -> Self {
        ClusterEvent::Catalog(e)
    }
}

impl From<ConfigurationEvent> for ClusterEvent {
    fn from(e: ConfigurationEvent) -> Self {
        ClusterEvent::Configuration(e)
    }
}

impl From<StyleDocument> for ClusterEvent {
    fn from(d: StyleDocument) -> Self {
        ClusterEvent::Document(d)
    }
}

/// Maps events to and from transport payloads
pub trait EventSerializer: Send + Sync {
    fn serialize(&self, event: &ClusterEvent) -> Result<Bytes>;

    /// Fails with `MalformedPayload` when the payload is not a known event
    fn deserialize(&self, payload: &[u8]) -> Result<ClusterEvent>;
}
