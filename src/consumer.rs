//! Event Consumer
//!
//! The consumer path: drains messages received by the bus client, drops the
//! ones this node must not apply and hands the rest to the synchronizers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bus::InboundMessage;
use crate::config::{ClusterConfiguration, GROUP_KEY, INSTANCE_NAME_KEY};
use crate::error::Result;
use crate::event::EventSerializer;
use crate::sync::HandlerChain;
use crate::toggle::ReplicationContext;

pub struct EventConsumer {
    config: Arc<ClusterConfiguration>,
    ctx: Arc<ReplicationContext>,
    serializer: Arc<dyn EventSerializer>,
    chain: HandlerChain,
}

impl EventConsumer {
    pub fn new(
        config: Arc<ClusterConfiguration>,
        ctx: Arc<ReplicationContext>,
        serializer: Arc<dyn EventSerializer>,
        chain: HandlerChain,
    ) -> Self {
        Self {
            config,
            ctx,
            serializer,
            chain,
        }
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Apply one message
    ///
    /// # Returns
    /// * `Ok(true)` - A synchronizer applied the event
    /// * `Ok(false)` - The message was filtered out or nobody handled it
    /// * `Err(_)` - Decoding or applying failed
    pub async fn handle(&self, msg: &InboundMessage) -> Result<bool> {
        let instance = self.config.instance_name();
        let origin = msg.property(INSTANCE_NAME_KEY);
        if origin == Some(instance.as_str()) {
            debug!("Ignoring message published by this instance ({})", instance);
            return Ok(false);
        }

        let group = self.config.group();
        if msg.property(GROUP_KEY) != Some(group.as_str()) {
            debug!(
                "Ignoring message from group {:?}, this instance is in '{}'",
                msg.property(GROUP_KEY),
                group
            );
            return Ok(false);
        }

        if !self.ctx.accepts_incoming() {
            info!(
                "Slave toggle is off, discarding message from {}",
                origin.unwrap_or("unknown")
            );
            return Ok(false);
        }

        let event = self.serializer.deserialize(&msg.payload)?;
        debug!("Received {} from {}", event, origin.unwrap_or("unknown"));
        self.chain.dispatch(&event).await
    }

    /// Consume until the sending side is dropped
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound.recv().await {
            if let Err(e) = self.handle(&msg).await {
                error!(
                    "Failed to apply message on '{}' ({} bytes): {}",
                    msg.destination,
                    msg.payload.len(),
                    e
                );
            }
        }
        debug!("Inbound queue closed, consumer stopped");
    }
}
