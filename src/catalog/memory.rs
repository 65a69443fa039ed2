//! In-memory catalog
//!
//! Enforces unique ids, unique names within a scope and that every reference
//! points at an entity that exists, then notifies listeners of each change.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::event::{CatalogEvent, EventKind, PURGE_PROPERTY};

use super::{
    Catalog, CatalogError, CatalogInfo, CatalogListener, DataDirectory, EntityKind, InfoRef,
    ListenerSet, StyleInfo,
};

#[derive(Default)]
pub struct MemoryCatalog {
    entities: DashMap<(EntityKind, String), CatalogInfo>,
    data_dir: Option<Arc<DataDirectory>>,
    listeners: ListenerSet,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose styles are backed by documents in `data_dir`
    pub fn with_data_dir(data_dir: Arc<DataDirectory>) -> Self {
        Self {
            data_dir: Some(data_dir),
            ..Self::default()
        }
    }

    pub fn data_dir(&self) -> Option<&Arc<DataDirectory>> {
        self.data_dir.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|e| e.key().0 == kind).count()
    }

    /// Remove a style, optionally deleting its document, and tell listeners
    /// whether the document was purged
    pub async fn remove_style(&self, style: &StyleInfo, purge: bool) -> Result<(), CatalogError> {
        let info = CatalogInfo::Style(style.clone());
        self.detach(&info)?;
        if purge {
            if let Err(e) = self.purge_style(style).await {
                warn!("Failed to purge style {}: {}", style.name, e);
            }
        }
        let event =
            CatalogEvent::new(EventKind::Remove, info).with_property(PURGE_PROPERTY, purge.to_string());
        self.listeners.catalog_changed(&event).await;
        Ok(())
    }

    fn storable_kind(info: &CatalogInfo) -> Result<EntityKind, CatalogError> {
        match info.kind() {
            Some(EntityKind::Generic) | None => Err(CatalogError::Storage(format!(
                "cannot store entity of type {}",
                info.type_name()
            ))),
            Some(kind) => Ok(kind),
        }
    }

    fn exists(&self, kinds: &[EntityKind], r: &InfoRef) -> bool {
        kinds
            .iter()
            .any(|k| self.entities.contains_key(&(*k, r.id.clone())))
    }

    fn require(&self, kinds: &[EntityKind], r: &InfoRef) -> Result<(), CatalogError> {
        if self.exists(kinds, r) {
            Ok(())
        } else {
            Err(CatalogError::NotFound(format!(
                "{} '{}' (id {})",
                kinds[0], r, r.id
            )))
        }
    }

    fn check_references(&self, info: &CatalogInfo) -> Result<(), CatalogError> {
        use EntityKind as K;
        match info {
            CatalogInfo::Store(s) => self.require(&[K::Workspace], &s.workspace),
            CatalogInfo::Resource(r) => {
                self.require(&[K::Namespace], &r.namespace)?;
                self.require(&[K::Store], &r.store)
            }
            CatalogInfo::Style(s) => match &s.workspace {
                Some(ws) => self.require(&[K::Workspace], ws),
                None => Ok(()),
            },
            CatalogInfo::Layer(l) => {
                self.require(&[K::Resource], &l.resource)?;
                if let Some(style) = &l.default_style {
                    self.require(&[K::Style], style)?;
                }
                l.styles
                    .iter()
                    .try_for_each(|s| self.require(&[K::Style], s))
            }
            CatalogInfo::LayerGroup(g) => {
                if let Some(ws) = &g.workspace {
                    self.require(&[K::Workspace], ws)?;
                }
                g.layers
                    .iter()
                    .try_for_each(|l| self.require(&[K::Layer, K::LayerGroup], l))?;
                g.styles
                    .iter()
                    .flatten()
                    .try_for_each(|s| self.require(&[K::Style], s))
            }
            CatalogInfo::Map(m) => m
                .layers
                .iter()
                .try_for_each(|l| self.require(&[K::Layer], l)),
            _ => Ok(()),
        }
    }

    fn find_by_name(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        name: &str,
    ) -> Option<CatalogInfo> {
        self.entities
            .iter()
            .find(|e| e.key().0 == kind && e.value().name() == Some(name) && e.value().scope() == scope)
            .map(|e| e.value().clone())
    }

    fn detach(&self, info: &CatalogInfo) -> Result<CatalogInfo, CatalogError> {
        let kind = Self::storable_kind(info)?;
        self.entities
            .remove(&(kind, info.id().to_string()))
            .map(|(_, removed)| removed)
            .ok_or_else(|| CatalogError::NotFound(info.to_string()))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn add(&self, info: CatalogInfo) -> Result<(), CatalogError> {
        let kind = Self::storable_kind(&info)?;
        if self.entities.contains_key(&(kind, info.id().to_string())) {
            return Err(CatalogError::Duplicate(info.to_string()));
        }
        if let Some(name) = info.name() {
            if self.find_by_name(kind, info.scope(), name).is_some() {
                return Err(CatalogError::Duplicate(info.to_string()));
            }
        }
        self.check_references(&info)?;

        debug!("Catalog add {}", info);
        self.entities
            .insert((kind, info.id().to_string()), info.clone());
        self.listeners
            .catalog_changed(&CatalogEvent::new(EventKind::Add, info))
            .await;
        Ok(())
    }

    async fn save(&self, info: CatalogInfo) -> Result<(), CatalogError> {
        let kind = Self::storable_kind(&info)?;
        let key = (kind, info.id().to_string());
        if !self.entities.contains_key(&key) {
            return Err(CatalogError::NotFound(info.to_string()));
        }
        if let Some(name) = info.name() {
            if let Some(other) = self.find_by_name(kind, info.scope(), name) {
                if other.id() != info.id() {
                    return Err(CatalogError::Duplicate(info.to_string()));
                }
            }
        }
        self.check_references(&info)?;

        debug!("Catalog save {}", info);
        self.entities.insert(key, info.clone());
        self.listeners
            .catalog_changed(&CatalogEvent::new(EventKind::Modify, info))
            .await;
        Ok(())
    }

    async fn remove(&self, info: &CatalogInfo) -> Result<(), CatalogError> {
        let removed = self.detach(info)?;
        debug!("Catalog remove {}", removed);
        self.listeners
            .catalog_changed(&CatalogEvent::new(EventKind::Remove, removed))
            .await;
        Ok(())
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Option<CatalogInfo> {
        self.entities
            .get(&(kind, id.to_string()))
            .map(|e| e.value().clone())
    }

    async fn get_by_name(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        name: &str,
    ) -> Option<CatalogInfo> {
        self.find_by_name(kind, scope, name)
    }

    async fn purge_style(&self, style: &StyleInfo) -> Result<(), CatalogError> {
        let Some(data_dir) = &self.data_dir else {
            return Err(CatalogError::Storage(
                "no data directory to purge styles from".to_string(),
            ));
        };
        let path = DataDirectory::style_document_path(style);
        match data_dir.delete(&path).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CatalogError::Storage(format!(
                "style document {} was not deleted",
                path
            ))),
            Err(e) => Err(CatalogError::Storage(e.to_string())),
        }
    }

    fn add_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.listeners.add(listener);
    }
}
