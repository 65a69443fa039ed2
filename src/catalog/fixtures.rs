//! Test fixtures: a small catalog graph whose ids carry a node prefix, so the
//! same names can be built with origin and local identities.

use super::*;

pub fn workspace(node: &str) -> WorkspaceInfo {
    WorkspaceInfo {
        id: format!("{}-ws", node),
        name: "topp".to_string(),
        isolated: false,
    }
}

pub fn namespace(node: &str) -> NamespaceInfo {
    NamespaceInfo {
        id: format!("{}-ns", node),
        prefix: "topp".to_string(),
        uri: "http://www.openplans.org/topp".to_string(),
    }
}

pub fn store(node: &str) -> StoreInfo {
    StoreInfo {
        id: format!("{}-st", node),
        name: "states_shp".to_string(),
        workspace: InfoRef::new(format!("{}-ws", node), "topp"),
        store_type: "DataStore".to_string(),
        enabled: true,
        connection_parameters: [("url".to_string(), "file:data/states.shp".to_string())]
            .into_iter()
            .collect(),
        error: None,
    }
}

pub fn resource(node: &str) -> ResourceInfo {
    ResourceInfo {
        id: format!("{}-ft", node),
        name: "states".to_string(),
        native_name: "states".to_string(),
        namespace: InfoRef::new(format!("{}-ns", node), "topp"),
        store: InfoRef::new(format!("{}-st", node), "states_shp").in_workspace("topp"),
        title: Some("USA Population".to_string()),
        srs: Some("EPSG:4326".to_string()),
        enabled: true,
    }
}

pub fn style(node: &str) -> StyleInfo {
    StyleInfo {
        id: format!("{}-sy", node),
        name: "mystyle".to_string(),
        workspace: None,
        filename: "mystyle.sld".to_string(),
        format: "sld".to_string(),
    }
}

pub fn layer(node: &str) -> LayerInfo {
    LayerInfo {
        id: format!("{}-ly", node),
        name: "states".to_string(),
        resource: InfoRef::new(format!("{}-ft", node), "states").in_workspace("topp"),
        default_style: Some(InfoRef::new(format!("{}-sy", node), "mystyle")),
        styles: Vec::new(),
        enabled: true,
    }
}

pub fn layer_group(node: &str) -> LayerGroupInfo {
    LayerGroupInfo {
        id: format!("{}-lg", node),
        name: "tasmania".to_string(),
        workspace: None,
        layers: vec![InfoRef::new(format!("{}-ly", node), "states")],
        styles: vec![None],
        mode: "SINGLE".to_string(),
    }
}

pub fn map(node: &str) -> MapInfo {
    MapInfo {
        id: format!("{}-mp", node),
        name: "overview".to_string(),
        layers: vec![InfoRef::new(format!("{}-ly", node), "states")],
        enabled: true,
    }
}

/// Every entity of the graph, referenced entities first
pub fn graph(node: &str) -> Vec<CatalogInfo> {
    vec![
        CatalogInfo::Workspace(workspace(node)),
        CatalogInfo::Namespace(namespace(node)),
        CatalogInfo::Store(store(node)),
        CatalogInfo::Resource(resource(node)),
        CatalogInfo::Style(style(node)),
        CatalogInfo::Layer(layer(node)),
        CatalogInfo::LayerGroup(layer_group(node)),
        CatalogInfo::Map(map(node)),
    ]
}

/// The graph entity of `kind`
pub fn entity(node: &str, kind: EntityKind) -> CatalogInfo {
    match kind {
        EntityKind::LayerGroup => CatalogInfo::LayerGroup(layer_group(node)),
        EntityKind::Layer => CatalogInfo::Layer(layer(node)),
        EntityKind::Map => CatalogInfo::Map(map(node)),
        EntityKind::Namespace => CatalogInfo::Namespace(namespace(node)),
        EntityKind::Store => CatalogInfo::Store(store(node)),
        EntityKind::Resource => CatalogInfo::Resource(resource(node)),
        EntityKind::Style => CatalogInfo::Style(style(node)),
        EntityKind::Workspace => CatalogInfo::Workspace(workspace(node)),
        EntityKind::Generic => CatalogInfo::Generic(GenericInfo {
            id: format!("{}-gen", node),
        }),
    }
}

/// Populate `catalog` with the graph of `node`
pub async fn populate(catalog: &dyn Catalog, node: &str) {
    for info in graph(node) {
        catalog.add(info).await.unwrap();
    }
}
