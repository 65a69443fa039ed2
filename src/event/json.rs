//! JSON event encoding
//!
//! ```text
//! {"event":"catalog","kind":"Add","properties":{..},"source":{"type":"StoreInfo","entity":{..}}}
//! {"event":"configuration","kind":"Modify","source":{"type":"GeoServerInfo","entity":{..}}}
//! {"event":"document","path":"styles/roads.sld","content":".."}
//! ```
//!
//! Entities of an unknown type decode to `CatalogInfo::Foreign` so the
//! receiving side can reject them with the type name.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::{CatalogInfo, EntityKind, ForeignInfo};
use crate::error::{ClusterError, Result};

use super::schema;
use super::{CatalogEvent, ClusterEvent, ConfigurationEvent, EventKind, EventSerializer, StyleDocument};

const GLOBAL_TYPE: &str = "GeoServerInfo";
const SERVICE_TYPE: &str = "ServiceInfo";
const LOGGING_TYPE: &str = "LoggingInfo";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Envelope {
    Catalog {
        kind: EventKind,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, String>,
        source: TypedEntity,
    },
    Configuration {
        kind: EventKind,
        source: TypedEntity,
    },
    Document(StyleDocument),
}

#[derive(Debug, Serialize, Deserialize)]
struct TypedEntity {
    #[serde(rename = "type")]
    type_name: String,
    entity: Value,
}

/// `EventSerializer` producing self-describing JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEventSerializer;

impl JsonEventSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl EventSerializer for JsonEventSerializer {
    fn serialize(&self, event: &ClusterEvent) -> Result<Bytes> {
        let envelope = match event {
            ClusterEvent::Catalog(e) => Envelope::Catalog {
                kind: e.kind,
                properties: e.properties.clone(),
                source: encode_catalog_info(&e.source)?,
            },
            ClusterEvent::Configuration(e) => {
                let (kind, source) = encode_configuration(e)?;
                Envelope::Configuration { kind, source }
            }
            ClusterEvent::Document(d) => Envelope::Document(d.clone()),
        };
        Ok(Bytes::from(serde_json::to_vec(&envelope)?))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<ClusterEvent> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        let event = match envelope {
            Envelope::Catalog {
                kind,
                properties,
                source,
            } => {
                let source = decode_catalog_info(source)?;
                ClusterEvent::Catalog(CatalogEvent {
                    kind,
                    source,
                    properties,
                })
            }
            Envelope::Configuration { kind, source } => {
                ClusterEvent::Configuration(decode_configuration(kind, source)?)
            }
            Envelope::Document(d) => ClusterEvent::Document(d),
        };
        debug!("Decoded {}", event);
        Ok(event)
    }
}

fn encode_catalog_info(info: &CatalogInfo) -> Result<TypedEntity> {
    let (kind, mut entity) = match info {
        CatalogInfo::LayerGroup(i) => (EntityKind::LayerGroup, serde_json::to_value(i)?),
        CatalogInfo::Layer(i) => (EntityKind::Layer, serde_json::to_value(i)?),
        CatalogInfo::Map(i) => (EntityKind::Map, serde_json::to_value(i)?),
        CatalogInfo::Namespace(i) => (EntityKind::Namespace, serde_json::to_value(i)?),
        CatalogInfo::Store(i) => (EntityKind::Store, serde_json::to_value(i)?),
        CatalogInfo::Resource(i) => (EntityKind::Resource, serde_json::to_value(i)?),
        CatalogInfo::Style(i) => (EntityKind::Style, serde_json::to_value(i)?),
        CatalogInfo::Workspace(i) => (EntityKind::Workspace, serde_json::to_value(i)?),
        CatalogInfo::Generic(i) => (EntityKind::Generic, serde_json::to_value(i)?),
        CatalogInfo::Foreign(f) => {
            return Ok(TypedEntity {
                type_name: f.type_name.clone(),
                entity: serde_json::json!({ "id": f.id }),
            })
        }
    };
    schema::strip(kind, &mut entity);
    Ok(TypedEntity {
        type_name: kind.type_name().to_string(),
        entity,
    })
}

fn decode_catalog_info(source: TypedEntity) -> Result<CatalogInfo> {
    let Some(kind) = EntityKind::from_type_name(&source.type_name) else {
        let id = source
            .entity
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(CatalogInfo::Foreign(ForeignInfo {
            type_name: source.type_name,
            id,
        }));
    };
    let entity = source.entity;
    let info = match kind {
        EntityKind::LayerGroup => CatalogInfo::LayerGroup(serde_json::from_value(entity)?),
        EntityKind::Layer => CatalogInfo::Layer(serde_json::from_value(entity)?),
        EntityKind::Map => CatalogInfo::Map(serde_json::from_value(entity)?),
        EntityKind::Namespace => CatalogInfo::Namespace(serde_json::from_value(entity)?),
        EntityKind::Store => CatalogInfo::Store(serde_json::from_value(entity)?),
        EntityKind::Resource => CatalogInfo::Resource(serde_json::from_value(entity)?),
        EntityKind::Style => CatalogInfo::Style(serde_json::from_value(entity)?),
        EntityKind::Workspace => CatalogInfo::Workspace(serde_json::from_value(entity)?),
        EntityKind::Generic => CatalogInfo::Generic(serde_json::from_value(entity)?),
    };
    Ok(info)
}

fn encode_configuration(event: &ConfigurationEvent) -> Result<(EventKind, TypedEntity)> {
    let (kind, type_name, mut entity) = match event {
        ConfigurationEvent::Global(g) => (EventKind::Modify, GLOBAL_TYPE, serde_json::to_value(g)?),
        ConfigurationEvent::Service { kind, service } => {
            (*kind, SERVICE_TYPE, serde_json::to_value(service)?)
        }
        ConfigurationEvent::Logging(l) => {
            (EventKind::Modify, LOGGING_TYPE, serde_json::to_value(l)?)
        }
    };
    schema::strip_settings(type_name, &mut entity);
    Ok((
        kind,
        TypedEntity {
            type_name: type_name.to_string(),
            entity,
        },
    ))
}

fn decode_configuration(kind: EventKind, source: TypedEntity) -> Result<ConfigurationEvent> {
    let event = match source.type_name.as_str() {
        GLOBAL_TYPE => ConfigurationEvent::Global(serde_json::from_value(source.entity)?),
        SERVICE_TYPE => ConfigurationEvent::Service {
            kind,
            service: serde_json::from_value(source.entity)?,
        },
        LOGGING_TYPE => ConfigurationEvent::Logging(serde_json::from_value(source.entity)?),
        other => {
            return Err(ClusterError::MalformedPayload(format!(
                "unknown configuration type '{}'",
                other
            )))
        }
    };
    Ok(event)
}
