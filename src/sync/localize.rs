//! Localization
//!
//! An entity arriving from a peer carries the peer's identities. Before it
//! touches the local catalog its own identity and every cross-reference are
//! re-resolved against local entities: by id first, then by (scope, name).

use crate::catalog::{Catalog, CatalogInfo, EntityKind, InfoRef};
use crate::error::{ClusterError, Result};
use crate::event::EventKind;

/// How to treat a cross-reference with no local counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fail with `UnresolvedReference`
    Strict,
    /// Keep the reference as received
    Lenient,
}

impl Mode {
    /// Removals only need the identity of the removed entity, so its
    /// references may point at things already gone locally.
    pub fn for_event(kind: EventKind) -> Self {
        match kind {
            EventKind::Add | EventKind::Modify => Mode::Strict,
            EventKind::Remove => Mode::Lenient,
        }
    }
}

pub struct Localizer<'a> {
    catalog: &'a dyn Catalog,
    mode: Mode,
}

impl<'a> Localizer<'a> {
    pub fn new(catalog: &'a dyn Catalog, mode: Mode) -> Self {
        Self { catalog, mode }
    }

    /// Rebuild `info` against the local catalog
    pub async fn localize(&self, info: CatalogInfo) -> Result<CatalogInfo> {
        let info = self.localize_references(info).await?;
        Ok(self.localize_identity(info).await)
    }

    /// Adopt the id of the matching local entity, if there is one
    async fn localize_identity(&self, info: CatalogInfo) -> CatalogInfo {
        let Some(kind) = info.kind() else {
            return info;
        };
        if self.catalog.get_by_id(kind, info.id()).await.is_some() {
            return info;
        }
        let Some(name) = info.name() else {
            return info;
        };
        match self.catalog.get_by_name(kind, info.scope(), name).await {
            Some(local) => {
                let id = local.id().to_string();
                info.with_id(&id)
            }
            None => info,
        }
    }

    async fn localize_references(&self, info: CatalogInfo) -> Result<CatalogInfo> {
        use EntityKind as K;
        let info = match info {
            CatalogInfo::Store(mut s) => {
                s.workspace = self.resolve(&[K::Workspace], s.workspace).await?;
                CatalogInfo::Store(s)
            }
            CatalogInfo::Resource(mut r) => {
                r.namespace = self.resolve(&[K::Namespace], r.namespace).await?;
                r.store = self.resolve(&[K::Store], r.store).await?;
                CatalogInfo::Resource(r)
            }
            CatalogInfo::Style(mut s) => {
                s.workspace = self.resolve_opt(&[K::Workspace], s.workspace).await?;
                CatalogInfo::Style(s)
            }
            CatalogInfo::Layer(mut l) => {
                l.resource = self.resolve(&[K::Resource], l.resource).await?;
                l.default_style = self.resolve_opt(&[K::Style], l.default_style).await?;
                l.styles = self.resolve_all(&[K::Style], l.styles).await?;
                CatalogInfo::Layer(l)
            }
            CatalogInfo::LayerGroup(mut g) => {
                g.workspace = self.resolve_opt(&[K::Workspace], g.workspace).await?;
                g.layers = self.resolve_all(&[K::Layer, K::LayerGroup], g.layers).await?;
                let mut styles = Vec::with_capacity(g.styles.len());
                for style in g.styles {
                    styles.push(self.resolve_opt(&[K::Style], style).await?);
                }
                g.styles = styles;
                CatalogInfo::LayerGroup(g)
            }
            CatalogInfo::Map(mut m) => {
                m.layers = self.resolve_all(&[K::Layer], m.layers).await?;
                CatalogInfo::Map(m)
            }
            other => other,
        };
        Ok(info)
    }

    /// Resolve a reference to an entity of one of `kinds`
    pub async fn resolve(&self, kinds: &[EntityKind], reference: InfoRef) -> Result<InfoRef> {
        for kind in kinds {
            if let Some(local) = self.catalog.get_by_id(*kind, &reference.id).await {
                return Ok(local.to_ref());
            }
        }
        for kind in kinds {
            let scope = reference.workspace.as_deref();
            if let Some(local) = self.catalog.get_by_name(*kind, scope, &reference.name).await {
                return Ok(local.to_ref());
            }
        }
        match self.mode {
            Mode::Lenient => Ok(reference),
            Mode::Strict => Err(ClusterError::UnresolvedReference {
                kind: kinds.first().map_or("CatalogInfo", |k| k.type_name()),
                name: reference.to_string(),
            }),
        }
    }

    async fn resolve_opt(
        &self,
        kinds: &[EntityKind],
        reference: Option<InfoRef>,
    ) -> Result<Option<InfoRef>> {
        match reference {
            Some(r) => Ok(Some(self.resolve(kinds, r).await?)),
            None => Ok(None),
        }
    }

    async fn resolve_all(&self, kinds: &[EntityKind], refs: Vec<InfoRef>) -> Result<Vec<InfoRef>> {
        let mut resolved = Vec::with_capacity(refs.len());
        for r in refs {
            resolved.push(self.resolve(kinds, r).await?);
        }
        Ok(resolved)
    }
}
