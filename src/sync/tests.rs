//! Synchronizer tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::{
    CatalogSynchronizer, ConfigurationSynchronizer, DocumentSynchronizer, HandlerChain,
    Synchronizer,
};
use crate::catalog::fixtures;
use crate::error::ClusterError;
use crate::event::ClusterEvent;
use crate::catalog::{
    Catalog, CatalogError, CatalogInfo, CatalogListener, DataDirectory, EntityKind, ForeignInfo,
    GeoServerInfo, GenericInfo, InfoRef, LocalHandle, LoggingInfo, MemoryCatalog, MemorySettings,
    ServiceInfo, SettingsStore, StyleInfo, DISPATCH_ORDER,
};
use crate::event::{
    CatalogEvent, ConfigurationEvent, EventKind, EventSerializer, JsonEventSerializer,
    StyleDocument, PURGE_PROPERTY,
};
use crate::toggle::ReplicationContext;

const APPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Catalog recording every mutation it is asked to perform
#[derive(Default)]
struct RecordingCatalog {
    inner: MemoryCatalog,
    calls: Mutex<Vec<(&'static str, CatalogInfo)>>,
    failing: bool,
    delay: Option<Duration>,
}

impl RecordingCatalog {
    fn with_data_dir(data_dir: Arc<DataDirectory>) -> Self {
        Self {
            inner: MemoryCatalog::with_data_dir(data_dir),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(&'static str, CatalogInfo)> {
        self.calls.lock().clone()
    }

    async fn record(&self, op: &'static str, info: &CatalogInfo) -> Result<(), CatalogError> {
        self.calls.lock().push((op, info.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(CatalogError::Storage("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for RecordingCatalog {
    async fn add(&self, info: CatalogInfo) -> Result<(), CatalogError> {
        self.record("add", &info).await?;
        self.inner.add(info).await
    }

    async fn save(&self, info: CatalogInfo) -> Result<(), CatalogError> {
        self.record("save", &info).await?;
        self.inner.save(info).await
    }

    async fn remove(&self, info: &CatalogInfo) -> Result<(), CatalogError> {
        self.record("remove", info).await?;
        self.inner.remove(info).await
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Option<CatalogInfo> {
        self.inner.get_by_id(kind, id).await
    }

    async fn get_by_name(
        &self,
        kind: EntityKind,
        scope: Option<&str>,
        name: &str,
    ) -> Option<CatalogInfo> {
        self.inner.get_by_name(kind, scope, name).await
    }

    async fn purge_style(&self, style: &StyleInfo) -> Result<(), CatalogError> {
        self.record("purge", &CatalogInfo::Style(style.clone()))
            .await?;
        self.inner.purge_style(style).await
    }

    fn add_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.inner.add_listener(listener);
    }
}

/// Records whether the producer was enabled when each change was notified
struct ProducerWatch {
    context: Arc<ReplicationContext>,
    seen: Mutex<Vec<bool>>,
}

#[async_trait]
impl CatalogListener for ProducerWatch {
    async fn handle_catalog_event(&self, _event: &CatalogEvent) {
        self.seen.lock().push(self.context.producer_enabled());
    }

    async fn handle_configuration_event(&self, _event: &ConfigurationEvent) {
        self.seen.lock().push(self.context.producer_enabled());
    }
}

fn context() -> Arc<ReplicationContext> {
    let context = Arc::new(ReplicationContext::default());
    context.activate();
    context
}

fn synchronizer(catalog: Arc<RecordingCatalog>, context: Arc<ReplicationContext>) -> CatalogSynchronizer {
    CatalogSynchronizer::new(catalog, context, APPLY_TIMEOUT)
}

/// Populate with the local graph, stopping before the first entity of `kind`
async fn populate_before(catalog: &RecordingCatalog, kind: EntityKind) {
    for info in fixtures::graph("local") {
        if info.kind() == Some(kind) {
            break;
        }
        catalog.inner.add(info).await.unwrap();
    }
}

fn origin_mentions(info: &CatalogInfo) -> usize {
    let payload = JsonEventSerializer::new()
        .serialize(&CatalogEvent::add(info.clone()).into())
        .unwrap();
    String::from_utf8_lossy(&payload).matches("origin-").count()
}

#[tokio::test]
async fn test_dispatch_completeness() {
    let specific: Vec<EntityKind> = DISPATCH_ORDER
        .into_iter()
        .filter(|k| *k != EntityKind::Generic)
        .collect();
    assert_eq!(specific.len(), 8);

    for kind in specific {
        for (event_kind, op) in [
            (EventKind::Add, "add"),
            (EventKind::Modify, "save"),
            (EventKind::Remove, "remove"),
        ] {
            let catalog = Arc::new(RecordingCatalog::default());
            match event_kind {
                EventKind::Add => populate_before(&catalog, kind).await,
                _ => fixtures::populate(&catalog.inner, "local").await,
            }
            let ctx = context();
            let sync = synchronizer(catalog.clone(), ctx.clone());

            let event = CatalogEvent::new(event_kind, fixtures::entity("origin", kind));
            let applied = sync.synchronize(&event.into()).await.unwrap();
            assert!(applied, "{} {}", event_kind, kind);

            let calls = catalog.calls();
            assert_eq!(calls.len(), 1, "{} {}: {:?}", event_kind, kind, calls);
            let (called, info) = &calls[0];
            assert_eq!(*called, op, "{} {}", event_kind, kind);
            assert_eq!(info.kind(), Some(kind));

            // an added entity keeps its own id, everything else is local
            match event_kind {
                EventKind::Add => {
                    assert!(info.id().starts_with("origin-"));
                    assert_eq!(origin_mentions(info), 1, "{} {}", event_kind, kind);
                }
                _ => {
                    assert!(info.id().starts_with("local-"), "{} {}", event_kind, kind);
                    assert_eq!(origin_mentions(info), 0, "{} {}", event_kind, kind);
                }
            }
            assert!(ctx.producer_enabled());
        }
    }
}

#[tokio::test]
async fn test_generic_entity_is_a_no_op() {
    let catalog = Arc::new(RecordingCatalog::default());
    let ctx = context();
    let sync = synchronizer(catalog.clone(), ctx.clone());

    for event_kind in [EventKind::Add, EventKind::Modify, EventKind::Remove] {
        let event = CatalogEvent::new(event_kind, fixtures::entity("origin", EntityKind::Generic));
        assert!(sync.synchronize(&event.into()).await.unwrap());
    }
    assert!(catalog.calls().is_empty());
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_unknown_entity_is_rejected() {
    let catalog = Arc::new(RecordingCatalog::default());
    fixtures::populate(&catalog.inner, "local").await;
    let ctx = context();
    let sync = synchronizer(catalog.clone(), ctx.clone());

    let event = CatalogEvent::add(CatalogInfo::Foreign(ForeignInfo {
        type_name: "WidgetInfo".to_string(),
        id: "w-1".to_string(),
    }));
    let result = sync.synchronize(&event.into()).await;

    match result {
        Err(ClusterError::UnsupportedEntityKind(name)) => assert_eq!(name, "WidgetInfo"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(catalog.calls().is_empty());
    assert_eq!(catalog.inner.len(), 8);
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_entity_without_identity_is_invalid() {
    let catalog = Arc::new(RecordingCatalog::default());
    let ctx = context();
    let sync = synchronizer(catalog.clone(), ctx.clone());

    let event = CatalogEvent::add(CatalogInfo::Generic(GenericInfo { id: String::new() }));
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(result, Err(ClusterError::InvalidArgument(_))));
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_other_event_classes_are_not_handled() {
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(catalog, context());
    let doc = StyleDocument {
        path: "styles/a.sld".to_string(),
        content: String::new(),
    };
    assert!(!sync.synchronize(&doc.into()).await.unwrap());
}

#[tokio::test]
async fn test_producer_suppressed_during_apply() {
    let catalog = Arc::new(RecordingCatalog::default());
    let ctx = context();
    let watch = Arc::new(ProducerWatch {
        context: ctx.clone(),
        seen: Mutex::new(Vec::new()),
    });
    catalog.add_listener(watch.clone());
    let sync = synchronizer(catalog.clone(), ctx.clone());

    let event = CatalogEvent::add(fixtures::entity("origin", EntityKind::Workspace));
    sync.synchronize(&event.into()).await.unwrap();

    assert_eq!(*watch.seen.lock(), vec![false]);
    assert!(ctx.producer_enabled());
    assert!(ctx.should_publish());
}

#[tokio::test]
async fn test_producer_reenabled_after_failures() {
    let ctx = context();

    // the store rejects the mutation
    let failing = Arc::new(RecordingCatalog::failing());
    let sync = synchronizer(failing.clone(), ctx.clone());
    let event = CatalogEvent::add(fixtures::entity("origin", EntityKind::Workspace));
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(result, Err(ClusterError::Catalog(CatalogError::Storage(_)))));
    assert_eq!(ctx.suppression_depth(), 0);

    // a reference does not resolve
    let empty = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(empty.clone(), ctx.clone());
    let event = CatalogEvent::add(fixtures::entity("origin", EntityKind::Store));
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(
        result,
        Err(ClusterError::UnresolvedReference {
            kind: "WorkspaceInfo",
            ..
        })
    ));
    assert!(empty.calls().is_empty());
    assert_eq!(ctx.suppression_depth(), 0);

    // modifying something that is not there
    let event = CatalogEvent::modify(fixtures::entity("origin", EntityKind::Workspace));
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(result, Err(ClusterError::Catalog(CatalogError::NotFound(_)))));
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let catalog = Arc::new(RecordingCatalog::slow(Duration::from_millis(500)));
    let ctx = context();
    let sync = CatalogSynchronizer::new(catalog, ctx.clone(), Duration::from_millis(20));

    let event = CatalogEvent::add(fixtures::entity("origin", EntityKind::Workspace));
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(result, Err(ClusterError::Timeout(_))));
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_remove_resolves_leniently() {
    let catalog = Arc::new(RecordingCatalog::default());
    fixtures::populate(&catalog.inner, "local").await;
    catalog
        .inner
        .remove(&fixtures::entity("local", EntityKind::Style))
        .await
        .unwrap();
    let sync = synchronizer(catalog.clone(), context());

    // the layer's default style is gone locally
    let modify = CatalogEvent::modify(fixtures::entity("origin", EntityKind::Layer));
    let result = sync.synchronize(&modify.into()).await;
    assert!(matches!(
        result,
        Err(ClusterError::UnresolvedReference {
            kind: "StyleInfo",
            ..
        })
    ));

    let remove = CatalogEvent::remove(fixtures::entity("origin", EntityKind::Layer));
    assert!(sync.synchronize(&remove.into()).await.unwrap());
    assert_eq!(catalog.inner.count(EntityKind::Layer), 0);
}

#[tokio::test]
async fn test_localized_references_follow_local_ids() {
    let catalog = Arc::new(RecordingCatalog::default());
    populate_before(&catalog, EntityKind::Resource).await;
    let sync = synchronizer(catalog.clone(), context());

    let event = CatalogEvent::add(fixtures::entity("origin", EntityKind::Resource));
    sync.synchronize(&event.into()).await.unwrap();

    let Some(CatalogInfo::Resource(resource)) =
        catalog.inner.get_by_id(EntityKind::Resource, "origin-ft").await
    else {
        panic!("resource not added");
    };
    assert_eq!(resource.namespace, InfoRef::new("local-ns", "topp"));
    assert_eq!(
        resource.store,
        InfoRef::new("local-st", "states_shp").in_workspace("topp")
    );
}

async fn style_catalog(dir: &tempfile::TempDir) -> Arc<RecordingCatalog> {
    let data_dir = Arc::new(DataDirectory::new(dir.path()));
    data_dir
        .write("styles/mystyle.sld", "<StyledLayerDescriptor/>")
        .await
        .unwrap();
    let catalog = Arc::new(RecordingCatalog::with_data_dir(data_dir));
    fixtures::populate(&catalog.inner, "local").await;
    catalog
}

#[tokio::test]
async fn test_style_remove_with_purge_deletes_document() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = style_catalog(&dir).await;
    let sync = synchronizer(catalog.clone(), context());

    let event = CatalogEvent::remove(fixtures::entity("origin", EntityKind::Style))
        .with_property(PURGE_PROPERTY, "true");
    assert!(sync.synchronize(&event.into()).await.unwrap());

    assert!(!dir.path().join("styles/mystyle.sld").exists());
    assert!(catalog
        .inner
        .get_by_name(EntityKind::Style, None, "mystyle")
        .await
        .is_none());
    let ops: Vec<&str> = catalog.calls().into_iter().map(|(op, _)| op).collect();
    assert_eq!(ops, vec!["remove", "purge"]);
}

#[tokio::test]
async fn test_style_remove_without_purge_keeps_document() {
    for purge in [None, Some("false")] {
        let dir = tempfile::tempdir().unwrap();
        let catalog = style_catalog(&dir).await;
        let sync = synchronizer(catalog.clone(), context());

        let mut event = CatalogEvent::remove(fixtures::entity("origin", EntityKind::Style));
        if let Some(value) = purge {
            event = event.with_property(PURGE_PROPERTY, value);
        }
        assert!(sync.synchronize(&event.into()).await.unwrap());

        assert!(dir.path().join("styles/mystyle.sld").exists(), "purge={:?}", purge);
        assert_eq!(catalog.inner.count(EntityKind::Style), 0);
    }
}

#[tokio::test]
async fn test_style_purge_failure_is_not_propagated() {
    // no data directory behind the catalog
    let catalog = Arc::new(RecordingCatalog::default());
    fixtures::populate(&catalog.inner, "local").await;
    let ctx = context();
    let sync = synchronizer(catalog.clone(), ctx.clone());

    let event = CatalogEvent::remove(fixtures::entity("origin", EntityKind::Style))
        .with_property(PURGE_PROPERTY, "true");
    assert!(sync.synchronize(&event.into()).await.unwrap());
    assert_eq!(catalog.inner.count(EntityKind::Style), 0);
    assert!(ctx.producer_enabled());
}

struct Stub {
    name: &'static str,
    priority: i32,
    outcome: fn() -> crate::error::Result<bool>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Synchronizer for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn synchronize(&self, _event: &ClusterEvent) -> crate::error::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

fn stub(
    name: &'static str,
    priority: i32,
    outcome: fn() -> crate::error::Result<bool>,
) -> (Stub, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Stub {
            name,
            priority,
            outcome,
            calls: calls.clone(),
        },
        calls,
    )
}

fn any_event() -> ClusterEvent {
    CatalogEvent::add(fixtures::entity("origin", EntityKind::Workspace)).into()
}

#[tokio::test]
async fn test_chain_orders_by_priority() {
    let (late, _) = stub("late", 20, || Ok(true));
    let (early, _) = stub("early", -5, || Ok(true));
    let (middle, _) = stub("middle", 0, || Ok(true));
    let (middle2, _) = stub("middle2", 0, || Ok(true));
    let chain = HandlerChain::new()
        .with(late)
        .with(middle)
        .with(early)
        .with(middle2);
    assert_eq!(chain.names(), vec!["early", "middle", "middle2", "late"]);
}

#[tokio::test]
async fn test_chain_stops_at_first_handler() {
    let (skip, skip_calls) = stub("skip", 0, || Ok(false));
    let (take, take_calls) = stub("take", 1, || Ok(true));
    let (never, never_calls) = stub("never", 2, || Ok(true));
    let chain = HandlerChain::new().with(never).with(take).with(skip);

    assert!(chain.dispatch(&any_event()).await.unwrap());
    assert_eq!(skip_calls.load(Ordering::SeqCst), 1);
    assert_eq!(take_calls.load(Ordering::SeqCst), 1);
    assert_eq!(never_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_error_aborts() {
    let (broken, _) = stub("broken", 0, || {
        Err(ClusterError::InvalidArgument("broken".to_string()))
    });
    let (after, after_calls) = stub("after", 1, || Ok(true));
    let chain = HandlerChain::new().with(broken).with(after);

    assert!(chain.dispatch(&any_event()).await.is_err());
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_without_taker() {
    let (skip, _) = stub("skip", 0, || Ok(false));
    let chain = HandlerChain::new().with(skip);
    assert!(!chain.dispatch(&any_event()).await.unwrap());
    assert!(!HandlerChain::new().dispatch(&any_event()).await.unwrap());
}

fn settings_fixture() -> (
    Arc<MemorySettings>,
    Arc<RecordingCatalog>,
    Arc<ReplicationContext>,
    ConfigurationSynchronizer,
) {
    let mut global = GeoServerInfo {
        id: "local-global".to_string(),
        ..GeoServerInfo::default()
    };
    global.coverage_access.executor = Some(LocalHandle::new("executor"));
    global.jai.tile_cache = Some(LocalHandle::new("tile-cache"));
    let settings = Arc::new(MemorySettings::with_global(global));
    let catalog = Arc::new(RecordingCatalog::default());
    let ctx = context();
    let sync = ConfigurationSynchronizer::new(
        settings.clone(),
        catalog.clone(),
        ctx.clone(),
        APPLY_TIMEOUT,
    );
    (settings, catalog, ctx, sync)
}

#[tokio::test]
async fn test_global_settings_keep_local_handles() {
    let (settings, _, ctx, sync) = settings_fixture();

    let remote = GeoServerInfo {
        id: "origin-global".to_string(),
        verbose: true,
        proxy_base_url: Some("https://maps.example.org/geoserver".to_string()),
        update_sequence: 7,
        ..GeoServerInfo::default()
    };
    assert!(sync
        .synchronize(&ConfigurationEvent::Global(remote).into())
        .await
        .unwrap());

    let local = settings.global().await;
    assert_eq!(local.id, "local-global");
    assert!(local.verbose);
    assert_eq!(local.update_sequence, 7);
    assert_eq!(
        local.coverage_access.executor.as_ref().map(LocalHandle::label),
        Some("executor")
    );
    assert_eq!(local.jai.tile_cache.as_ref().map(LocalHandle::label), Some("tile-cache"));
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_services_match_by_name_and_add_when_absent() {
    let (settings, catalog, _, sync) = settings_fixture();
    fixtures::populate(&catalog.inner, "local").await;
    settings
        .add_service(ServiceInfo {
            id: "local-wms".to_string(),
            name: "WMS".to_string(),
            ..ServiceInfo::default()
        })
        .await
        .unwrap();

    let wms = ServiceInfo {
        id: "origin-wms".to_string(),
        name: "WMS".to_string(),
        enabled: true,
        title: Some("Maps".to_string()),
        ..ServiceInfo::default()
    };
    let event = ConfigurationEvent::Service {
        kind: EventKind::Modify,
        service: wms,
    };
    assert!(sync.synchronize(&event.into()).await.unwrap());
    let local = settings.service_by_id("local-wms").await.unwrap();
    assert_eq!(local.title.as_deref(), Some("Maps"));
    assert_eq!(settings.service_count(), 1);

    let wfs = ServiceInfo {
        id: "origin-wfs".to_string(),
        name: "WFS".to_string(),
        workspace: Some(InfoRef::new("origin-ws", "topp")),
        ..ServiceInfo::default()
    };
    let event = ConfigurationEvent::Service {
        kind: EventKind::Add,
        service: wfs,
    };
    assert!(sync.synchronize(&event.into()).await.unwrap());
    let added = settings.service_by_name(Some("topp"), "WFS").await.unwrap();
    assert_eq!(added.workspace, Some(InfoRef::new("local-ws", "topp")));
}

#[tokio::test]
async fn test_service_remove() {
    let (settings, _, ctx, sync) = settings_fixture();
    let wcs = ServiceInfo {
        id: "local-wcs".to_string(),
        name: "WCS".to_string(),
        ..ServiceInfo::default()
    };
    settings.add_service(wcs.clone()).await.unwrap();

    let event = ConfigurationEvent::Service {
        kind: EventKind::Remove,
        service: ServiceInfo {
            id: "origin-wcs".to_string(),
            ..wcs
        },
    };
    assert!(sync.synchronize(&event.clone().into()).await.unwrap());
    assert_eq!(settings.service_count(), 0);

    let again = sync.synchronize(&event.into()).await;
    assert!(matches!(again, Err(ClusterError::Catalog(CatalogError::NotFound(_)))));
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_logging_settings_copied_under_suppression() {
    let (settings, _, ctx, sync) = settings_fixture();
    let watch = Arc::new(ProducerWatch {
        context: ctx.clone(),
        seen: Mutex::new(Vec::new()),
    });
    settings.add_listener(watch.clone());

    let logging = LoggingInfo {
        level: "VERBOSE_LOGGING".to_string(),
        location: "logs/geoserver.log".to_string(),
        stdout_logging: false,
    };
    assert!(sync
        .synchronize(&ConfigurationEvent::Logging(logging.clone()).into())
        .await
        .unwrap());
    assert_eq!(settings.logging().await, logging);
    assert_eq!(*watch.seen.lock(), vec![false]);
    assert!(ctx.producer_enabled());
}

/// Settings whose lookups stall for `delay`
struct StalledSettings {
    inner: MemorySettings,
    delay: Duration,
}

#[async_trait]
impl SettingsStore for StalledSettings {
    async fn global(&self) -> GeoServerInfo {
        tokio::time::sleep(self.delay).await;
        self.inner.global().await
    }

    async fn save_global(&self, info: GeoServerInfo) -> Result<(), CatalogError> {
        self.inner.save_global(info).await
    }

    async fn logging(&self) -> LoggingInfo {
        self.inner.logging().await
    }

    async fn save_logging(&self, info: LoggingInfo) -> Result<(), CatalogError> {
        self.inner.save_logging(info).await
    }

    async fn service_by_id(&self, id: &str) -> Option<ServiceInfo> {
        tokio::time::sleep(self.delay).await;
        self.inner.service_by_id(id).await
    }

    async fn service_by_name(&self, workspace: Option<&str>, name: &str) -> Option<ServiceInfo> {
        tokio::time::sleep(self.delay).await;
        self.inner.service_by_name(workspace, name).await
    }

    async fn add_service(&self, info: ServiceInfo) -> Result<(), CatalogError> {
        self.inner.add_service(info).await
    }

    async fn save_service(&self, info: ServiceInfo) -> Result<(), CatalogError> {
        self.inner.save_service(info).await
    }

    async fn remove_service(&self, info: &ServiceInfo) -> Result<(), CatalogError> {
        self.inner.remove_service(info).await
    }

    fn add_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.inner.add_listener(listener)
    }
}

#[tokio::test]
async fn test_stalled_settings_lookup_times_out() {
    let settings = Arc::new(StalledSettings {
        inner: MemorySettings::new(),
        delay: Duration::from_millis(500),
    });
    let ctx = context();
    let sync = ConfigurationSynchronizer::new(
        settings.clone(),
        Arc::new(RecordingCatalog::default()),
        ctx.clone(),
        Duration::from_millis(20),
    );

    let remote = GeoServerInfo {
        id: "origin-global".to_string(),
        verbose: true,
        ..GeoServerInfo::default()
    };
    let result = sync
        .synchronize(&ConfigurationEvent::Global(remote).into())
        .await;
    assert!(matches!(result, Err(ClusterError::Timeout(_))));
    assert!(!settings.inner.global().await.verbose);

    let event = ConfigurationEvent::Service {
        kind: EventKind::Add,
        service: ServiceInfo {
            id: "origin-wms".to_string(),
            name: "WMS".to_string(),
            ..ServiceInfo::default()
        },
    };
    let result = sync.synchronize(&event.into()).await;
    assert!(matches!(result, Err(ClusterError::Timeout(_))));
    assert_eq!(settings.inner.service_count(), 0);
    assert!(ctx.producer_enabled());
}

#[tokio::test]
async fn test_document_written_to_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = Arc::new(DataDirectory::new(dir.path()));
    let sync = DocumentSynchronizer::new(data_dir.clone(), APPLY_TIMEOUT);

    let doc = StyleDocument {
        path: "workspaces/topp/styles/roads.sld".to_string(),
        content: "<StyledLayerDescriptor/>".to_string(),
    };
    assert!(sync.synchronize(&doc.into()).await.unwrap());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("workspaces/topp/styles/roads.sld")).unwrap(),
        "<StyledLayerDescriptor/>"
    );

    data_dir.set_read_only(true);
    let doc = StyleDocument {
        path: "styles/other.sld".to_string(),
        content: String::new(),
    };
    assert!(sync.synchronize(&doc.into()).await.unwrap());
    assert!(!dir.path().join("styles/other.sld").exists());
}

#[tokio::test]
async fn test_document_outside_data_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sync = DocumentSynchronizer::new(Arc::new(DataDirectory::new(dir.path())), APPLY_TIMEOUT);
    let doc = StyleDocument {
        path: "../escape.sld".to_string(),
        content: String::new(),
    };
    let result = sync.synchronize(&doc.into()).await;
    assert!(matches!(result, Err(ClusterError::InvalidArgument(_))));
}
