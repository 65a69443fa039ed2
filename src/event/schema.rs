//! Per-kind field omissions
//!
//! Fields listed here are node-local state and are removed from the encoded
//! entity before it leaves the node. Decoding tolerates their absence.
//! Settings fields are dotted paths into nested sections.

use serde_json::Value;

use crate::catalog::EntityKind;

/// Fields of `kind` that are never transported
pub fn omitted_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        // last connection error seen by the origin node
        EntityKind::Store => &["error"],
        EntityKind::LayerGroup
        | EntityKind::Layer
        | EntityKind::Map
        | EntityKind::Namespace
        | EntityKind::Resource
        | EntityKind::Style
        | EntityKind::Workspace
        | EntityKind::Generic => &[],
    }
}

/// Fields of the settings type `type_name` that are never transported
pub fn omitted_settings_fields(type_name: &str) -> &'static [&'static str] {
    match type_name {
        // thread pool and tile cache live in the node process
        "GeoServerInfo" => &["coverage_access.executor", "jai.tile_cache"],
        _ => &[],
    }
}

/// Remove the omitted fields of `kind` from an encoded entity
pub(crate) fn strip(kind: EntityKind, entity: &mut Value) {
    for field in omitted_fields(kind) {
        remove_path(entity, field);
    }
}

/// Remove the omitted fields of a settings type from an encoded entity
pub(crate) fn strip_settings(type_name: &str, entity: &mut Value) {
    for field in omitted_settings_fields(type_name) {
        remove_path(entity, field);
    }
}

fn remove_path(entity: &mut Value, path: &str) {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };
    let mut target = entity;
    for section in parents.into_iter().flat_map(|p| p.split('.')) {
        match target.get_mut(section) {
            Some(next) => target = next,
            None => return,
        }
    }
    if let Value::Object(map) = target {
        map.remove(last);
    }
}
