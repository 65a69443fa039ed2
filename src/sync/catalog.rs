//! Catalog synchronizer
//!
//! Applies catalog events from peers. The producer is suppressed for the
//! whole apply so the resulting local change is not published back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::catalog::{Catalog, CatalogInfo, EntityKind, StyleInfo};
use crate::error::{ClusterError, Result};
use crate::event::{CatalogEvent, ClusterEvent, EventKind, PURGE_PROPERTY};
use crate::toggle::ReplicationContext;

use super::localize::{Localizer, Mode};
use super::{bounded, Synchronizer};

pub struct CatalogSynchronizer {
    catalog: Arc<dyn Catalog>,
    context: Arc<ReplicationContext>,
    apply_timeout: Duration,
}

impl CatalogSynchronizer {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        context: Arc<ReplicationContext>,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            context,
            apply_timeout,
        }
    }

    async fn apply(&self, event: &CatalogEvent) -> Result<()> {
        let source = &event.source;
        let Some(kind) = source.kind() else {
            return Err(ClusterError::UnsupportedEntityKind(
                source.type_name().to_string(),
            ));
        };

        // Specific kinds are listed before the base kind so the base kind
        // never shadows them.
        match kind {
            EntityKind::LayerGroup
            | EntityKind::Layer
            | EntityKind::Map
            | EntityKind::Namespace
            | EntityKind::Store
            | EntityKind::Resource
            | EntityKind::Style
            | EntityKind::Workspace => self.apply_entity(event).await,
            EntityKind::Generic => {
                warn!(
                    "Nothing to apply for {} of base entity id={}",
                    event.kind,
                    source.id()
                );
                Ok(())
            }
        }
    }

    async fn apply_entity(&self, event: &CatalogEvent) -> Result<()> {
        let localizer = Localizer::new(self.catalog.as_ref(), Mode::for_event(event.kind));
        let local = bounded(self.apply_timeout, localizer.localize(event.source.clone())).await?;
        debug!("Localized {} as {}", event.source, local);

        match event.kind {
            EventKind::Add => bounded(self.apply_timeout, self.catalog.add(local)).await,
            EventKind::Modify => bounded(self.apply_timeout, self.catalog.save(local)).await,
            EventKind::Remove => {
                bounded(self.apply_timeout, self.catalog.remove(&local)).await?;
                if let CatalogInfo::Style(style) = &local {
                    if event.flag(PURGE_PROPERTY) {
                        self.purge(style).await;
                    }
                }
                Ok(())
            }
        }
    }

    /// Delete the document of a removed style. Failures are logged only.
    async fn purge(&self, style: &StyleInfo) {
        match bounded(self.apply_timeout, self.catalog.purge_style(style)).await {
            Ok(()) => debug!("Purged style document of {}", style.name),
            Err(e) => warn!("Unable to purge style {}: {}", style.name, e),
        }
    }
}

fn validate(event: &CatalogEvent) -> Result<()> {
    let source = &event.source;
    if source.id().is_empty() && source.name().map_or(true, str::is_empty) {
        return Err(ClusterError::InvalidArgument(format!(
            "{} event carries an entity with neither id nor name",
            event.kind
        )));
    }
    Ok(())
}

#[async_trait]
impl Synchronizer for CatalogSynchronizer {
    fn name(&self) -> &str {
        "catalog"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn synchronize(&self, event: &ClusterEvent) -> Result<bool> {
        let ClusterEvent::Catalog(event) = event else {
            return Ok(false);
        };
        validate(event)?;

        let result = {
            let _suppressed = self.context.suppress();
            self.apply(event).await
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("{} synchronizer is unable to apply {}: {}", self.name(), event, e);
                Err(e)
            }
        }
    }
}
