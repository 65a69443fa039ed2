//! Catalog Module
//!
//! The local domain store replicated changes are applied to, seen through the
//! `Catalog` and `SettingsStore` traits. In-memory implementations back the
//! daemon and the tests; the data directory holds style documents.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::event::{CatalogEvent, ConfigurationEvent};

mod data_dir;
mod memory;
mod model;
mod settings;

#[cfg(test)]
pub(crate) mod fixtures;

pub use data_dir::DataDirectory;
pub use memory::MemoryCatalog;
pub use model::{
    ForeignInfo, GenericInfo, InfoRef, LayerGroupInfo, LayerInfo, MapInfo, NamespaceInfo,
    ResourceInfo, StoreInfo, StyleInfo, WorkspaceInfo,
};
pub use settings::{
    ContactInfo, CoverageAccessInfo, GeoServerInfo, JaiInfo, LocalHandle, LoggingInfo,
    MemorySettings, ServiceInfo, SettingsStore,
};

/// Catalog error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The entity (or one it references) does not exist
    NotFound(String),
    /// An entity with the same id or name already exists
    Duplicate(String),
    /// The backing storage failed
    Storage(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound(what) => write!(f, "Not found: {}", what),
            CatalogError::Duplicate(what) => write!(f, "Duplicate: {}", what),
            CatalogError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Storage(e.to_string())
    }
}

/// Catalog entity kinds with a specific handling path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    LayerGroup,
    Layer,
    Map,
    Namespace,
    Store,
    Resource,
    Style,
    Workspace,
    /// Base entity with no specialization
    Generic,
}

/// Order in which entity kinds are tested when applying an event; the base
/// kind comes last so it never shadows a specialization.
pub const DISPATCH_ORDER: [EntityKind; 9] = [
    EntityKind::LayerGroup,
    EntityKind::Layer,
    EntityKind::Map,
    EntityKind::Namespace,
    EntityKind::Store,
    EntityKind::Resource,
    EntityKind::Style,
    EntityKind::Workspace,
    EntityKind::Generic,
];

impl EntityKind {
    /// Type tag used on the wire
    pub fn type_name(self) -> &'static str {
        match self {
            EntityKind::LayerGroup => "LayerGroupInfo",
            EntityKind::Layer => "LayerInfo",
            EntityKind::Map => "MapInfo",
            EntityKind::Namespace => "NamespaceInfo",
            EntityKind::Store => "StoreInfo",
            EntityKind::Resource => "ResourceInfo",
            EntityKind::Style => "StyleInfo",
            EntityKind::Workspace => "WorkspaceInfo",
            EntityKind::Generic => "CatalogInfo",
        }
    }

    /// Map a wire type tag to its kind. Store and resource subtypes map to
    /// their base kind.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "LayerGroupInfo" => EntityKind::LayerGroup,
            "LayerInfo" => EntityKind::Layer,
            "MapInfo" => EntityKind::Map,
            "NamespaceInfo" => EntityKind::Namespace,
            "StoreInfo" | "DataStoreInfo" | "CoverageStoreInfo" | "WMSStoreInfo" => {
                EntityKind::Store
            }
            "ResourceInfo" | "FeatureTypeInfo" | "CoverageInfo" | "WMSLayerInfo" => {
                EntityKind::Resource
            }
            "StyleInfo" => EntityKind::Style,
            "WorkspaceInfo" => EntityKind::Workspace,
            "CatalogInfo" => EntityKind::Generic,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A catalog entity of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogInfo {
    LayerGroup(LayerGroupInfo),
    Layer(LayerInfo),
    Map(MapInfo),
    Namespace(NamespaceInfo),
    Store(StoreInfo),
    Resource(ResourceInfo),
    Style(StyleInfo),
    Workspace(WorkspaceInfo),
    Generic(GenericInfo),
    Foreign(ForeignInfo),
}

impl CatalogInfo {
    /// Kind of the entity, `None` for a type outside the known set
    pub fn kind(&self) -> Option<EntityKind> {
        let kind = match self {
            CatalogInfo::LayerGroup(_) => EntityKind::LayerGroup,
            CatalogInfo::Layer(_) => EntityKind::Layer,
            CatalogInfo::Map(_) => EntityKind::Map,
            CatalogInfo::Namespace(_) => EntityKind::Namespace,
            CatalogInfo::Store(_) => EntityKind::Store,
            CatalogInfo::Resource(_) => EntityKind::Resource,
            CatalogInfo::Style(_) => EntityKind::Style,
            CatalogInfo::Workspace(_) => EntityKind::Workspace,
            CatalogInfo::Generic(_) => EntityKind::Generic,
            CatalogInfo::Foreign(_) => return None,
        };
        Some(kind)
    }

    pub fn type_name(&self) -> &str {
        match (self, self.kind()) {
            (CatalogInfo::Foreign(f), _) => &f.type_name,
            (_, Some(kind)) => kind.type_name(),
            (_, None) => "unknown",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogInfo::LayerGroup(i) => &i.id,
            CatalogInfo::Layer(i) => &i.id,
            CatalogInfo::Map(i) => &i.id,
            CatalogInfo::Namespace(i) => &i.id,
            CatalogInfo::Store(i) => &i.id,
            CatalogInfo::Resource(i) => &i.id,
            CatalogInfo::Style(i) => &i.id,
            CatalogInfo::Workspace(i) => &i.id,
            CatalogInfo::Generic(i) => &i.id,
            CatalogInfo::Foreign(i) => &i.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            CatalogInfo::LayerGroup(i) => Some(&i.name),
            CatalogInfo::Layer(i) => Some(&i.name),
            CatalogInfo::Map(i) => Some(&i.name),
            CatalogInfo::Namespace(i) => Some(&i.prefix),
            CatalogInfo::Store(i) => Some(&i.name),
            CatalogInfo::Resource(i) => Some(&i.name),
            CatalogInfo::Style(i) => Some(&i.name),
            CatalogInfo::Workspace(i) => Some(&i.name),
            CatalogInfo::Generic(_) | CatalogInfo::Foreign(_) => None,
        }
    }

    /// Workspace or namespace qualifying the name, if any
    pub fn scope(&self) -> Option<&str> {
        match self {
            CatalogInfo::Store(i) => Some(&i.workspace.name),
            CatalogInfo::Resource(i) => Some(&i.namespace.name),
            CatalogInfo::Style(i) => i.workspace.as_ref().map(|w| w.name.as_str()),
            CatalogInfo::LayerGroup(i) => i.workspace.as_ref().map(|w| w.name.as_str()),
            _ => None,
        }
    }

    /// Reference to this entity
    pub fn to_ref(&self) -> InfoRef {
        InfoRef {
            id: self.id().to_string(),
            name: self.name().unwrap_or_default().to_string(),
            workspace: self.scope().map(str::to_string),
        }
    }

    /// Replace the identifier, keeping every other field
    pub fn with_id(mut self, id: &str) -> Self {
        let slot = match &mut self {
            CatalogInfo::LayerGroup(i) => &mut i.id,
            CatalogInfo::Layer(i) => &mut i.id,
            CatalogInfo::Map(i) => &mut i.id,
            CatalogInfo::Namespace(i) => &mut i.id,
            CatalogInfo::Store(i) => &mut i.id,
            CatalogInfo::Resource(i) => &mut i.id,
            CatalogInfo::Style(i) => &mut i.id,
            CatalogInfo::Workspace(i) => &mut i.id,
            CatalogInfo::Generic(i) => &mut i.id,
            CatalogInfo::Foreign(i) => &mut i.id,
        };
        *slot = id.to_string();
        self
    }
}

impl fmt::Display for CatalogInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}[id={}, name={}]", self.type_name(), self.id(), name),
            None => write!(f, "{}[id={}]", self.type_name(), self.id()),
        }
    }
}

/// The local catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn add(&self, info: CatalogInfo) -> Result<(), CatalogError>;

    /// Replace an existing entity (matched by id)
    async fn save(&self, info: CatalogInfo) -> Result<(), CatalogError>;

    async fn remove(&self, info: &CatalogInfo) -> Result<(), CatalogError>;

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Option<CatalogInfo>;

    /// Look up by name, qualified by workspace for workspace-scoped kinds
    async fn get_by_name(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        name: &str,
    ) -> Option<CatalogInfo>;

    /// Delete the document backing a style
    async fn purge_style(&self, style: &StyleInfo) -> Result<(), CatalogError>;

    fn add_listener(&self, listener: Arc<dyn CatalogListener>);
}

/// Receives local catalog and settings changes
///
/// All methods have no-op defaults.
#[async_trait]
pub trait CatalogListener: Send + Sync {
    async fn handle_catalog_event(&self, _event: &CatalogEvent) {}

    async fn handle_configuration_event(&self, _event: &ConfigurationEvent) {}
}

/// Fans change notifications out to every registered listener, in
/// registration order
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn CatalogListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn CatalogListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CatalogListener>> {
        self.listeners.read().clone()
    }

    pub async fn catalog_changed(&self, event: &CatalogEvent) {
        for listener in self.snapshot() {
            listener.handle_catalog_event(event).await;
        }
    }

    pub async fn configuration_changed(&self, event: &ConfigurationEvent) {
        for listener in self.snapshot() {
            listener.handle_configuration_event(event).await;
        }
    }
}
