//! Configuration synchronizer
//!
//! Applies global, service and logging settings from peers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::catalog::{
    Catalog, CatalogError, EntityKind, GeoServerInfo, ServiceInfo, SettingsStore,
};
use crate::error::Result;
use crate::event::{ClusterEvent, ConfigurationEvent, EventKind};
use crate::toggle::ReplicationContext;

use super::localize::{Localizer, Mode};
use super::{bounded, bounded_lookup, Synchronizer};

pub struct ConfigurationSynchronizer {
    settings: Arc<dyn SettingsStore>,
    catalog: Arc<dyn Catalog>,
    context: Arc<ReplicationContext>,
    apply_timeout: Duration,
}

impl ConfigurationSynchronizer {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        catalog: Arc<dyn Catalog>,
        context: Arc<ReplicationContext>,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            catalog,
            context,
            apply_timeout,
        }
    }

    async fn apply(&self, event: &ConfigurationEvent) -> Result<()> {
        match event {
            ConfigurationEvent::Global(remote) => {
                let local = bounded_lookup(self.apply_timeout, self.settings.global()).await?;
                let merged = merge_global(local, remote.clone());
                bounded(self.apply_timeout, self.settings.save_global(merged)).await
            }
            ConfigurationEvent::Service { kind, service } => {
                self.apply_service(*kind, service.clone()).await
            }
            ConfigurationEvent::Logging(logging) => {
                bounded(self.apply_timeout, self.settings.save_logging(logging.clone())).await
            }
        }
    }

    async fn apply_service(&self, kind: EventKind, mut service: ServiceInfo) -> Result<()> {
        if let Some(workspace) = service.workspace.take() {
            let localizer = Localizer::new(self.catalog.as_ref(), Mode::for_event(kind));
            let resolved = bounded(
                self.apply_timeout,
                localizer.resolve(&[EntityKind::Workspace], workspace),
            )
            .await?;
            service.workspace = Some(resolved);
        }

        let by_id =
            bounded_lookup(self.apply_timeout, self.settings.service_by_id(&service.id)).await?;
        let local = match by_id {
            Some(local) => Some(local),
            None => {
                let ws = service.workspace.as_ref().map(|w| w.name.clone());
                bounded_lookup(
                    self.apply_timeout,
                    self.settings.service_by_name(ws.as_deref(), &service.name),
                )
                .await?
            }
        };

        match (kind, local) {
            (EventKind::Remove, Some(local)) => {
                bounded(self.apply_timeout, self.settings.remove_service(&local)).await
            }
            (EventKind::Remove, None) => Err(CatalogError::NotFound(format!(
                "service {} ({})",
                service.name, service.id
            ))
            .into()),
            (_, Some(local)) => {
                debug!("Service {} is local service {}", service.id, local.id);
                service.id = local.id;
                bounded(self.apply_timeout, self.settings.save_service(service)).await
            }
            (_, None) => bounded(self.apply_timeout, self.settings.add_service(service)).await,
        }
    }
}

/// Take every transported field of `remote`, keeping the identity and the
/// process-local handles of `local`
fn merge_global(local: GeoServerInfo, remote: GeoServerInfo) -> GeoServerInfo {
    let mut merged = remote;
    if !local.id.is_empty() {
        merged.id = local.id;
    }
    merged.coverage_access.executor = local.coverage_access.executor;
    merged.jai.tile_cache = local.jai.tile_cache;
    merged
}

#[async_trait]
impl Synchronizer for ConfigurationSynchronizer {
    fn name(&self) -> &str {
        "configuration"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn synchronize(&self, event: &ClusterEvent) -> Result<bool> {
        let ClusterEvent::Configuration(event) = event else {
            return Ok(false);
        };

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
