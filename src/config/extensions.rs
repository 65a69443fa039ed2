//! Configuration Extensions
//!
//! Each extension contributes default values for the keys it owns to the
//! cluster properties and may take an override for them from an
//! authoritative external source.

use super::properties::Properties;

/// Broker URL key
pub const BROKER_URL_KEY: &str = "brokerURL";
/// Default broker URL
pub const DEFAULT_BROKER_URL: &str = "tcp://localhost:61616";

/// Topic name (subscription filter) key
pub const TOPIC_NAME_KEY: &str = "topicName";
/// Default topic name
pub const DEFAULT_TOPIC_NAME: &str = "VirtualTopic.>";

/// Cluster group key
pub const GROUP_KEY: &str = "group";
/// Default cluster group
pub const DEFAULT_GROUP: &str = "geoserver-cluster";

/// Embedded broker switch key
pub const EMBEDDED_BROKER_KEY: &str = "embeddedBroker";
/// Embedded broker properties file name key
pub const EMBEDDED_BROKER_PROPERTIES_KEY: &str = "embeddedBrokerProperties";
/// Default embedded broker properties file name
pub const DEFAULT_EMBEDDED_BROKER_PROPERTIES: &str = "embeddedBroker.properties";

/// Read-only data directory key
pub const READ_ONLY_KEY: &str = "readOnly";

/// Master (producer side) toggle key
pub const TOGGLE_MASTER_KEY: &str = "toggleMaster";
/// Slave (consumer side) toggle key
pub const TOGGLE_SLAVE_KEY: &str = "toggleSlave";

/// Connection switch key
pub const CONNECTION_KEY: &str = "connection";

/// Producer toggle key
pub const TOGGLE_PRODUCER_KEY: &str = "toggleProducer";

/// Value of an `enabled`/`disabled` switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Enabled,
    Disabled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Enabled => "enabled",
            Status::Disabled => "disabled",
        }
    }

    /// Parse a switch value. Unknown values are treated as disabled.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("enabled") {
            Status::Enabled
        } else {
            Status::Disabled
        }
    }

    pub fn from_bool(on: bool) -> Self {
        if on {
            Status::Enabled
        } else {
            Status::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Status::Enabled
    }
}

/// Authoritative source of override values (e.g. the deployment environment)
pub trait OverrideSource: Send + Sync {
    /// Look up an override value for a key
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads overrides from process environment variables.
///
/// The exact key is tried first (`instanceName`), then its upper-snake form
/// (`INSTANCE_NAME`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentSource;

impl OverrideSource for EnvironmentSource {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| std::env::var(upper_snake(key)).ok())
            .filter(|v| !v.is_empty())
    }
}

/// Fixed set of overrides
#[derive(Debug, Default, Clone)]
pub struct MapSource {
    values: Properties,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.set(key, value);
        self
    }
}

impl OverrideSource for MapSource {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).map(str::to_string)
    }
}

/// `brokerURL` becomes `BROKER_URL`: a word starts where lower case meets
/// upper case, so acronyms stay together
fn upper_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    for c in key.chars() {
        if c.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
        prev = Some(c);
    }
    out
}

/// Apply the override rule for a single key.
///
/// With an external value present, the store takes it and a change is
/// reported when it differs from the stored value. Without one, an existing
/// stored value is kept; a missing one is filled with `default` and reported
/// as a change.
pub fn override_key(
    props: &mut Properties,
    source: &dyn OverrideSource,
    key: &str,
    default: &str,
) -> bool {
    match source.lookup(key) {
        Some(external) => {
            let changed = props.get(key) != Some(external.as_str());
            props.set(key, external);
            changed
        }
        None => props.set_if_absent(key, default),
    }
}

/// A contributor of cluster configuration keys
pub trait ConfigurationExtension: Send + Sync {
    /// Extension name, for logging
    fn name(&self) -> &str;

    /// Keys owned by this extension and their default values
    fn defaults(&self) -> Vec<(&'static str, String)>;

    /// Install defaults for keys not already present
    fn init_defaults(&self, props: &mut Properties) {
        for (key, value) in self.defaults() {
            props.set_if_absent(key, value);
        }
    }

    /// Take overrides from `source`. Returns true if any value changed.
    fn check_for_override(&self, props: &mut Properties, source: &dyn OverrideSource) -> bool {
        let mut changed = false;
        for (key, default) in self.defaults() {
            changed |= override_key(props, source, key, &default);
        }
        changed
    }
}

/// Extension owning a static set of keys
#[derive(Debug, Clone)]
pub struct KeyedExtension {
    name: &'static str,
    defaults: Vec<(&'static str, String)>,
}

impl KeyedExtension {
    pub fn new(name: &'static str, defaults: &[(&'static str, &str)]) -> Self {
        Self {
            name,
            defaults: defaults
                .iter()
                .map(|(k, v)| (*k, (*v).to_string()))
                .collect(),
        }
    }
}

impl ConfigurationExtension for KeyedExtension {
    fn name(&self) -> &str {
        self.name
    }

    fn defaults(&self) -> Vec<(&'static str, String)> {
        self.defaults.clone()
    }
}

pub fn broker_extension() -> KeyedExtension {
    KeyedExtension::new("broker", &[(BROKER_URL_KEY, DEFAULT_BROKER_URL)])
}

pub fn topic_extension() -> KeyedExtension {
    KeyedExtension::new("topic", &[(TOPIC_NAME_KEY, DEFAULT_TOPIC_NAME)])
}

pub fn group_extension() -> KeyedExtension {
    KeyedExtension::new("group", &[(GROUP_KEY, DEFAULT_GROUP)])
}

pub fn embedded_broker_extension() -> KeyedExtension {
    KeyedExtension::new(
        "embedded-broker",
        &[
            (EMBEDDED_BROKER_KEY, Status::Enabled.as_str()),
            (
                EMBEDDED_BROKER_PROPERTIES_KEY,
                DEFAULT_EMBEDDED_BROKER_PROPERTIES,
            ),
        ],
    )
}

pub fn read_only_extension() -> KeyedExtension {
    KeyedExtension::new("read-only", &[(READ_ONLY_KEY, Status::Disabled.as_str())])
}

pub fn toggle_extension() -> KeyedExtension {
    KeyedExtension::new(
        "toggle",
        &[(TOGGLE_MASTER_KEY, "true"), (TOGGLE_SLAVE_KEY, "true")],
    )
}

pub fn connection_extension() -> KeyedExtension {
    KeyedExtension::new("connection", &[(CONNECTION_KEY, Status::Enabled.as_str())])
}

pub fn producer_extension() -> KeyedExtension {
    KeyedExtension::new("producer", &[(TOGGLE_PRODUCER_KEY, "true")])
}

/// The extensions every node registers, in registration order
pub fn standard_extensions() -> Vec<Box<dyn ConfigurationExtension>> {
    vec![
        Box::new(broker_extension()),
        Box::new(topic_extension()),
        Box::new(group_extension()),
        Box::new(embedded_broker_extension()),
        Box::new(read_only_extension()),
        Box::new(toggle_extension()),
        Box::new(connection_extension()),
        Box::new(producer_extension()),
    ]
}
