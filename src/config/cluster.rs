//! Cluster Configuration Store
//!
//! Process-wide key/value store replicated settings are read from. Built from
//! an ordered set of extensions, each installing defaults for its keys and
//! taking overrides from an authoritative source, and persisted as
//! `cluster.properties` in the configuration directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::extensions::{
    standard_extensions, ConfigurationExtension, EnvironmentSource, OverrideSource, Status,
    BROKER_URL_KEY, DEFAULT_BROKER_URL, DEFAULT_GROUP, DEFAULT_TOPIC_NAME,
    EMBEDDED_BROKER_PROPERTIES_KEY, GROUP_KEY, TOPIC_NAME_KEY,
};
use super::properties::Properties;
use super::ConfigError;

/// Key of the built-in instance identity
pub const INSTANCE_NAME_KEY: &str = "instanceName";

/// Name of the persisted properties file
pub const CONFIG_FILE_NAME: &str = "cluster.properties";

const FILE_COMMENT: &str = "Cluster replication settings";

/// Lifecycle of the store during start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Uninitialized,
    Defaulted,
    OverrideChecked,
    Persisted,
    Ready,
}

/// The replicated configuration store
pub struct ClusterConfiguration {
    props: RwLock<Properties>,
    extensions: Vec<Box<dyn ConfigurationExtension>>,
    source: Box<dyn OverrideSource>,
    dir: Option<PathBuf>,
    state: Mutex<ConfigState>,
}

impl std::fmt::Debug for ClusterConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfiguration")
            .field("dir", &self.dir)
            .field("state", &*self.state.lock())
            .field("props", &*self.props.read())
            .finish()
    }
}

impl ClusterConfiguration {
    /// Create a store over `dir` with the given extensions and override source.
    ///
    /// Fails when two extensions declare the same key or an extension claims
    /// the instance identity key.
    pub fn new(
        dir: Option<PathBuf>,
        extensions: Vec<Box<dyn ConfigurationExtension>>,
        source: Box<dyn OverrideSource>,
    ) -> Result<Self, ConfigError> {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(INSTANCE_NAME_KEY);
        for ext in &extensions {
            for (key, _) in ext.defaults() {
                if !seen.insert(key) {
                    return Err(ConfigError::Validation(format!(
                        "configuration key '{}' of extension '{}' is already registered",
                        key,
                        ext.name()
                    )));
                }
            }
        }

        Ok(Self {
            props: RwLock::new(Properties::new()),
            extensions,
            source,
            dir,
            state: Mutex::new(ConfigState::Uninitialized),
        })
    }

    /// Store over `dir` with the standard extensions and environment overrides
    pub fn with_standard_extensions(dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::new(dir, standard_extensions(), Box::new(EnvironmentSource))
    }

    /// Run the start-up sequence: load, defaults, override check, and a
    /// store when the override check changed anything.
    ///
    /// Returns whether an override was applied. Persistence failures are
    /// logged and leave the store in memory only.
    pub fn init(&self) -> bool {
        match self.load() {
            Ok(true) => info!("Loaded cluster configuration"),
            Ok(false) => debug!("No stored cluster configuration, using defaults"),
            Err(e) => warn!("Failed to load cluster configuration: {}", e),
        }
        self.init_defaults();

        let changed = self.check_for_override();
        if changed {
            match self.store() {
                Ok(Some(path)) => {
                    info!("Stored overridden cluster configuration to {}", path.display());
                    *self.state.lock() = ConfigState::Persisted;
                }
                Ok(None) => *self.state.lock() = ConfigState::Ready,
                Err(e) => {
                    warn!("Failed to store cluster configuration: {}", e);
                    *self.state.lock() = ConfigState::Ready;
                }
            }
        } else {
            *self.state.lock() = ConfigState::Ready;
        }
        changed
    }

    /// Install default values for every key not already present.
    pub fn init_defaults(&self) {
        {
            let mut props = self.props.write();
            if !props.contains(INSTANCE_NAME_KEY) {
                props.set(INSTANCE_NAME_KEY, uuid::Uuid::new_v4().to_string());
            }
            for ext in &self.extensions {
                ext.init_defaults(&mut props);
            }
        }
        let mut state = self.state.lock();
        if *state == ConfigState::Uninitialized {
            *state = ConfigState::Defaulted;
        }
    }

    /// Take values from the override source, instance identity first, then
    /// every extension. Returns true if any stored value changed.
    pub fn check_for_override(&self) -> bool {
        let mut changed = false;
        {
            let mut props = self.props.write();
            match self.source.lookup(INSTANCE_NAME_KEY) {
                Some(external) => {
                    if props.get(INSTANCE_NAME_KEY) != Some(external.as_str()) {
                        info!("Instance name overridden to '{}'", external);
                        props.set(INSTANCE_NAME_KEY, external);
                        changed = true;
                    }
                }
                None => {
                    changed |= props
                        .set_if_absent(INSTANCE_NAME_KEY, uuid::Uuid::new_v4().to_string());
                }
            }
            for ext in &self.extensions {
                if ext.check_for_override(&mut props, self.source.as_ref()) {
                    debug!("Extension '{}' overrode cluster configuration", ext.name());
                    changed = true;
                }
            }
        }
        *self.state.lock() = if changed {
            ConfigState::OverrideChecked
        } else {
            ConfigState::Ready
        };
        changed
    }

    /// Read the persisted file. Returns false when there is none.
    pub fn load(&self) -> Result<bool, ConfigError> {
        let Some(path) = self.file_path() else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }
        let loaded = Properties::load(&path)?;
        let mut props = self.props.write();
        for (key, value) in loaded.iter() {
            props.set(key, value);
        }
        Ok(true)
    }

    /// Write the store to its file.
    ///
    /// Returns `Ok(None)` without writing when there is no usable storage
    /// location.
    pub fn store(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(path) = self.storage_path() else {
            warn!("No writable configuration directory, cluster configuration kept in memory");
            return Ok(None);
        };
        let snapshot = self.snapshot();
        snapshot.store(&path, FILE_COMMENT)?;
        debug!("Stored {} cluster properties to {}", snapshot.len(), path.display());
        Ok(Some(path))
    }

    /// Location of the persisted file, if the configuration directory exists
    /// (or can be created), is a directory and is writable.
    pub fn storage_path(&self) -> Option<PathBuf> {
        let dir = self.dir.as_deref()?;
        if !dir.exists() && std::fs::create_dir_all(dir).is_err() {
            return None;
        }
        let meta = std::fs::metadata(dir).ok()?;
        if !meta.is_dir() || meta.permissions().readonly() {
            return None;
        }
        Some(dir.join(CONFIG_FILE_NAME))
    }

    fn file_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn state(&self) -> ConfigState {
        *self.state.lock()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.props.read().get(key).map(str::to_string)
    }

    /// Set a value, returning the previous one
    pub fn put(&self, key: &str, value: impl Into<String>) -> Option<String> {
        self.props.write().set(key, value)
    }

    /// Copy of the current key/value map
    pub fn snapshot(&self) -> Properties {
        self.props.read().clone()
    }

    pub fn instance_name(&self) -> String {
        self.get(INSTANCE_NAME_KEY).unwrap_or_default()
    }

    pub fn group(&self) -> String {
        self.get(GROUP_KEY)
            .unwrap_or_else(|| DEFAULT_GROUP.to_string())
    }

    pub fn broker_url(&self) -> String {
        self.get(BROKER_URL_KEY)
            .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string())
    }

    pub fn topic_name(&self) -> String {
        self.get(TOPIC_NAME_KEY)
            .unwrap_or_else(|| DEFAULT_TOPIC_NAME.to_string())
    }

    /// Read a `true`/`false` key; absent or unparsable values read as `default`
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| v.trim().parse::<bool>().ok())
            .unwrap_or(default)
    }

    /// Read an `enabled`/`disabled` key
    pub fn status(&self, key: &str) -> Status {
        self.get(key)
            .map(|v| Status::parse(&v))
            .unwrap_or(Status::Disabled)
    }

    pub fn set_status(&self, key: &str, status: Status) {
        self.put(key, status.as_str());
    }

    /// Path of the embedded broker properties file, relative to the
    /// configuration directory
    pub fn embedded_broker_properties_path(&self) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let name = self.get(EMBEDDED_BROKER_PROPERTIES_KEY)?;
        Some(dir.join(name))
    }
}
