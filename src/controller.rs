//! Cluster Controller
//!
//! Administrative operations on a running node. Every change is applied to
//! the live component and recorded in the cluster properties; `save` makes
//! the recorded state durable.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{parse_broker_url, BusClient};
use crate::catalog::DataDirectory;
use crate::config::{
    ClusterConfiguration, Status, BROKER_URL_KEY, CONNECTION_KEY, INSTANCE_NAME_KEY,
    READ_ONLY_KEY, TOGGLE_MASTER_KEY, TOGGLE_SLAVE_KEY,
};
use crate::error::{ClusterError, Result};
use crate::toggle::{ReplicationContext, ToggleType};

pub struct ClusterController {
    config: Arc<ClusterConfiguration>,
    ctx: Arc<ReplicationContext>,
    client: Arc<BusClient>,
    data_dir: Option<Arc<DataDirectory>>,
}

impl ClusterController {
    pub fn new(
        config: Arc<ClusterConfiguration>,
        ctx: Arc<ReplicationContext>,
        client: Arc<BusClient>,
        data_dir: Option<Arc<DataDirectory>>,
    ) -> Self {
        Self {
            config,
            ctx,
            client,
            data_dir,
        }
    }

    /// Rename this instance. Used as the origin of published events and as
    /// the bus client id from the next connection on.
    pub fn set_instance_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClusterError::InvalidArgument(
                "instance name cannot be empty".to_string(),
            ));
        }
        self.config.put(INSTANCE_NAME_KEY, name);
        self.client.set_client_id(name);
        info!("Instance name set to '{}'", name);
        Ok(())
    }

    /// Change the broker; takes effect on the next connection
    pub fn set_broker_url(&self, url: &str) -> Result<()> {
        parse_broker_url(url).map_err(|e| ClusterError::InvalidArgument(e.to_string()))?;
        self.config.put(BROKER_URL_KEY, url.trim());
        self.client.set_broker_url(url.trim());
        info!("Broker URL set to {}", url.trim());
        Ok(())
    }

    pub fn set_read_only(&self, read_only: bool) {
        if let Some(data_dir) = &self.data_dir {
            data_dir.set_read_only(read_only);
        }
        self.config
            .set_status(READ_ONLY_KEY, Status::from_bool(read_only));
    }

    /// Turn publishing (`Master`) or applying (`Slave`) on or off
    pub fn toggle(&self, switch_to: bool, toggle: ToggleType) {
        self.ctx.set_toggle(toggle, switch_to);
        let key = match toggle {
            ToggleType::Master => TOGGLE_MASTER_KEY,
            ToggleType::Slave => TOGGLE_SLAVE_KEY,
        };
        self.config.put(key, switch_to.to_string());
        info!("Toggle {} switched {}", toggle, if switch_to { "on" } else { "off" });
    }

    /// Connect or disconnect the bus client. Asking for the current state
    /// succeeds without doing anything.
    pub async fn connect_client(&self, connect: bool) -> Result<()> {
        if connect == self.client.is_running() {
            self.config
                .set_status(CONNECTION_KEY, Status::from_bool(connect));
            return Ok(());
        }

        let done = if connect {
            self.client.connect().await
        } else {
            self.client.disconnect().await
        };

        if !done {
            let what = if connect { "connect to" } else { "disconnect from" };
            warn!("Unable to {} {}", what, self.client.config().broker_url);
            return Err(ClusterError::Io(std::io::Error::other(format!(
                "unable to {} {}",
                what,
                self.client.config().broker_url
            ))));
        }
        self.config
            .set_status(CONNECTION_KEY, Status::from_bool(connect));
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_running()
    }

    /// Store the cluster properties. `None` when there is no writable
    /// configuration directory.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        Ok(self.config.store()?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::{BusClientConfig, EmbeddedBroker, EmbeddedBrokerConfig};
    use crate::config::{standard_extensions, MapSource, Properties, CONFIG_FILE_NAME};

    fn setup(dir: Option<PathBuf>, broker_url: &str) -> (ClusterController, Arc<ClusterConfiguration>) {
        let config = Arc::new(
            ClusterConfiguration::new(dir, standard_extensions(), Box::new(MapSource::new()))
                .unwrap(),
        );
        config.init();
        let ctx = Arc::new(ReplicationContext::default());
        let (tx, _rx) = mpsc::channel(4);
        let client = Arc::new(BusClient::new(
            BusClientConfig {
                broker_url: broker_url.to_string(),
                client_id: config.instance_name(),
                filter: config.topic_name(),
                connect_timeout: Duration::from_secs(1),
            },
            tx,
        ));
        (
            ClusterController::new(config.clone(), ctx, client, None),
            config,
        )
    }

    #[test]
    fn test_set_broker_url() {
        let (controller, config) = setup(None, "tcp://127.0.0.1:1");
        controller.set_broker_url("tcp://10.0.0.2:61617").unwrap();
        assert_eq!(config.broker_url(), "tcp://10.0.0.2:61617");
        assert_eq!(controller.client.config().broker_url, "tcp://10.0.0.2:61617");

        let err = controller.set_broker_url("10.0.0.2").unwrap_err();
        assert!(matches!(err, ClusterError::InvalidArgument(_)));
        assert_eq!(config.broker_url(), "tcp://10.0.0.2:61617");
    }

    #[test]
    fn test_set_instance_name() {
        let (controller, config) = setup(None, "tcp://127.0.0.1:1");
        controller.set_instance_name("node-z").unwrap();
        assert_eq!(config.instance_name(), "node-z");
        assert_eq!(controller.client.config().client_id, "node-z");
        assert!(controller.set_instance_name("  ").is_err());
    }

    #[test]
    fn test_toggle_writes_its_own_key() {
        let (controller, config) = setup(None, "tcp://127.0.0.1:1");
        controller.toggle(false, ToggleType::Master);
        assert_eq!(config.get(TOGGLE_MASTER_KEY).as_deref(), Some("false"));
        assert_eq!(config.get(TOGGLE_SLAVE_KEY).as_deref(), Some("true"));
        assert!(!controller.ctx.is_enabled(ToggleType::Master));

        controller.toggle(false, ToggleType::Slave);
        assert_eq!(config.get(TOGGLE_SLAVE_KEY).as_deref(), Some("false"));
        assert!(!controller.ctx.accepts_incoming());
    }

    #[tokio::test]
    async fn test_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = Arc::new(DataDirectory::new(dir.path()));
        let (controller, config) = setup(None, "tcp://127.0.0.1:1");
        let controller = ClusterController {
            data_dir: Some(data_dir.clone()),
            ..controller
        };

        controller.set_read_only(true);
        assert_eq!(config.status(READ_ONLY_KEY), Status::Enabled);
        assert!(!data_dir.write("styles/a.sld", "x").await.unwrap());

        controller.set_read_only(false);
        assert_eq!(config.status(READ_ONLY_KEY), Status::Disabled);
        assert!(data_dir.write("styles/a.sld", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_client() {
        let broker = EmbeddedBroker::new(EmbeddedBrokerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 4,
            ..EmbeddedBrokerConfig::default()
        });
        assert!(broker.start().await);
        let url = format!("tcp://{}", broker.local_addr().unwrap());
        let (controller, config) = setup(None, &url);

        controller.connect_client(true).await.unwrap();
        assert!(controller.is_connected());
        assert_eq!(config.status(CONNECTION_KEY), Status::Enabled);
        controller.connect_client(true).await.unwrap();

        controller.connect_client(false).await.unwrap();
        assert!(!controller.is_connected());
        assert_eq!(config.status(CONNECTION_KEY), Status::Disabled);
    }

    #[tokio::test]
    async fn test_connect_failure_is_io_error() {
        let (controller, config) = setup(None, "tcp://127.0.0.1:1");
        let before = config.status(CONNECTION_KEY);
        let err = controller.connect_client(true).await.unwrap_err();
        assert!(matches!(err, ClusterError::Io(_)));
        assert_eq!(config.status(CONNECTION_KEY), before);
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _config) = setup(Some(dir.path().to_path_buf()), "tcp://127.0.0.1:1");
        controller.toggle(false, ToggleType::Master);

        let path = controller.save().unwrap().unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
        let stored = Properties::load(&path).unwrap();
        assert_eq!(stored.get(TOGGLE_MASTER_KEY), Some("false"));

        let (controller, _config) = setup(None, "tcp://127.0.0.1:1");
        assert_eq!(controller.save().unwrap(), None);
    }
}
