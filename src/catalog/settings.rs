//! Server settings
//!
//! Global settings, per-service settings and logging settings. Some global
//! settings hold process-local runtime handles (thread pools, tile caches)
//! that are never transported and must survive applying a peer's settings.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::event::{ConfigurationEvent, EventKind};

use super::{CatalogError, CatalogListener, InfoRef, ListenerSet};

/// Handle to a resource living in this process only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHandle(Arc<String>);

impl LocalHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self(Arc::new(label.into()))
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub person: Option<String>,
    pub organization: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageAccessInfo {
    pub core_pool_size: u32,
    pub max_pool_size: u32,
    pub keep_alive_ms: u64,
    #[serde(skip)]
    pub executor: Option<LocalHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JaiInfo {
    pub memory_capacity: f64,
    pub tile_threads: u32,
    pub tile_priority: u32,
    #[serde(skip)]
    pub tile_cache: Option<LocalHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoServerInfo {
    pub id: String,
    pub contact: ContactInfo,
    pub coverage_access: CoverageAccessInfo,
    pub jai: JaiInfo,
    pub proxy_base_url: Option<String>,
    pub verbose: bool,
    pub update_sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub workspace: Option<InfoRef>,
    pub enabled: bool,
    pub title: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingInfo {
    pub level: String,
    pub location: String,
    pub stdout_logging: bool,
}

/// The local settings store
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn global(&self) -> GeoServerInfo;

    async fn save_global(&self, info: GeoServerInfo) -> Result<(), CatalogError>;

    async fn logging(&self) -> LoggingInfo;

    async fn save_logging(&self, info: LoggingInfo) -> Result<(), CatalogError>;

    async fn service_by_id(&self, id: &str) -> Option<ServiceInfo>;

    async fn service_by_name(&self, workspace: Option<&str>, name: &str) -> Option<ServiceInfo>;

    async fn add_service(&self, info: ServiceInfo) -> Result<(), CatalogError>;

    async fn save_service(&self, info: ServiceInfo) -> Result<(), CatalogError>;

    async fn remove_service(&self, info: &ServiceInfo) -> Result<(), CatalogError>;

    fn add_listener(&self, listener: Arc<dyn CatalogListener>);
}

/// In-memory settings store
#[derive(Default)]
pub struct MemorySettings {
    global: RwLock<GeoServerInfo>,
    logging: RwLock<LoggingInfo>,
    services: DashMap<String, ServiceInfo>,
    listeners: ListenerSet,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(global: GeoServerInfo) -> Self {
        Self {
            global: RwLock::new(global),
            ..Self::default()
        }
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn global(&self) -> GeoServerInfo {
        self.global.read().clone()
    }

    async fn save_global(&self, info: GeoServerInfo) -> Result<(), CatalogError> {
        *self.global.write() = info.clone();
        self.listeners
            .configuration_changed(&ConfigurationEvent::Global(info))
            .await;
        Ok(())
    }

    async fn logging(&self) -> LoggingInfo {
        self.logging.read().clone()
    }

    async fn save_logging(&self, info: LoggingInfo) -> Result<(), CatalogError> {
        *self.logging.write() = info.clone();
        self.listeners
            .configuration_changed(&ConfigurationEvent::Logging(info))
            .await;
        Ok(())
    }

    async fn service_by_id(&self, id: &str) -> Option<ServiceInfo> {
        self.services.get(id).map(|s| s.value().clone())
    }

    async fn service_by_name(&self, workspace: Option<&str>, name: &str) -> Option<ServiceInfo> {
        self.services
            .iter()
            .find(|s| {
                s.name == name && s.workspace.as_ref().map(|w| w.name.as_str()) == workspace
            })
            .map(|s| s.value().clone())
    }

    async fn add_service(&self, info: ServiceInfo) -> Result<(), CatalogError> {
        if self.services.contains_key(&info.id) {
            return Err(CatalogError::Duplicate(format!("service {}", info.id)));
        }
        let ws = info.workspace.as_ref().map(|w| w.name.clone());
        if self.service_by_name(ws.as_deref(), &info.name).await.is_some() {
            return Err(CatalogError::Duplicate(format!("service {}", info.name)));
        }
        self.services.insert(info.id.clone(), info.clone());
        self.listeners
            .configuration_changed(&ConfigurationEvent::Service {
                kind: EventKind::Add,
                service: info,
            })
            .await;
        Ok(())
    }

    async fn save_service(&self, info: ServiceInfo) -> Result<(), CatalogError> {
        if !self.services.contains_key(&info.id) {
            return Err(CatalogError::NotFound(format!("service {}", info.id)));
        }
        self.services.insert(info.id.clone(), info.clone());
        self.listeners
            .configuration_changed(&ConfigurationEvent::Service {
                kind: EventKind::Modify,
                service: info,
            })
            .await;
        Ok(())
    }

    async fn remove_service(&self, info: &ServiceInfo) -> Result<(), CatalogError> {
        if self.services.remove(&info.id).is_none() {
            return Err(CatalogError::NotFound(format!("service {}", info.id)));
        }
        self.listeners
            .configuration_changed(&ConfigurationEvent::Service {
                kind: EventKind::Remove,
                service: info.clone(),
            })
            .await;
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.listeners.add(listener);
    }
}
