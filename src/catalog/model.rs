//! Catalog entity model
//!
//! Only the fields replication needs: identity, cross-references to other
//! entities and the attributes peers should see. Cross-references are carried
//! as `InfoRef` values (origin id plus name) and re-resolved on arrival.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to another catalog entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRef {
    pub id: String,
    pub name: String,
    /// Workspace (or namespace prefix) qualifying `name`, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl InfoRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workspace: None,
        }
    }

    pub fn in_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }
}

impl fmt::Display for InfoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.workspace {
            Some(ws) => write!(f, "{}:{}", ws, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub id: String,
    pub prefix: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: String,
    pub name: String,
    pub workspace: InfoRef,
    /// `DataStore`, `CoverageStore`, `WMSStore`, ...
    pub store_type: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub connection_parameters: BTreeMap<String, String>,
    /// Last connection error seen by this instance
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub native_name: String,
    pub namespace: InfoRef,
    pub store: InfoRef,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub srs: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub workspace: Option<InfoRef>,
    /// File name of the style document, relative to its styles directory
    pub filename: String,
    #[serde(default = "default_style_format")]
    pub format: String,
}

fn default_style_format() -> String {
    "sld".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub id: String,
    pub name: String,
    pub resource: InfoRef,
    #[serde(default)]
    pub default_style: Option<InfoRef>,
    #[serde(default)]
    pub styles: Vec<InfoRef>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGroupInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub workspace: Option<InfoRef>,
    #[serde(default)]
    pub layers: Vec<InfoRef>,
    /// Per-layer style, `None` for the layer default
    #[serde(default)]
    pub styles: Vec<Option<InfoRef>>,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub layers: Vec<InfoRef>,
    #[serde(default)]
    pub enabled: bool,
}

/// A base catalog entity with no specialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericInfo {
    pub id: String,
}

/// An entity of a type this node does not know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignInfo {
    pub type_name: String,
    pub id: String,
}
