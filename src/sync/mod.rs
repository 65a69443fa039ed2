//! Synchronizers Module
//!
//! Apply events received from peers to the local catalog, settings and data
//! directory. Each synchronizer handles one event class and reports
//! `Ok(false)` for anything else, so they can be chained.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};
use crate::event::ClusterEvent;

mod catalog;
mod configuration;
mod document;
mod localize;

#[cfg(test)]
mod tests;

pub use catalog::CatalogSynchronizer;
pub use configuration::ConfigurationSynchronizer;
pub use document::DocumentSynchronizer;
pub use localize::{Localizer, Mode};

/// Applies peer events of one class to local state
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Position in a `HandlerChain`; lower runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Apply `event`
    ///
    /// # Returns
    /// * `Ok(true)` - The event was handled
    /// * `Ok(false)` - The event is not for this synchronizer
    /// * `Err(_)` - Applying the event failed
    async fn synchronize(&self, event: &ClusterEvent) -> Result<bool>;
}

#[async_trait]
impl<T: Synchronizer> Synchronizer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn priority(&self) -> i32 {
        (**self).priority()
    }

    async fn synchronize(&self, event: &ClusterEvent) -> Result<bool> {
        (**self).synchronize(event).await
    }
}

/// Synchronizers ordered by priority
///
/// The first synchronizer that handles an event ends the dispatch; an error
/// ends it too and is returned to the caller.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn Synchronizer>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronizer. Equal priorities keep registration order.
    pub fn add<S: Synchronizer + 'static>(&mut self, handler: S) {
        let priority = handler.priority();
        let pos = self.handlers.partition_point(|h| h.priority() <= priority);
        self.handlers.insert(pos, Box::new(handler));
    }

    /// Register a synchronizer and return self for chaining
    pub fn with<S: Synchronizer + 'static>(mut self, handler: S) -> Self {
        self.add(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in dispatch order
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub async fn dispatch(&self, event: &ClusterEvent) -> Result<bool> {
        for handler in &self.handlers {
            if handler.synchronize(event).await? {
                debug!("{} applied {}", handler.name(), event);
                return Ok(true);
            }
        }
        warn!("No synchronizer accepted {}", event);
        Ok(false)
    }
}

/// Run a local store operation, failing with `Timeout` after `limit`
pub(crate) async fn bounded<T, E, F>(limit: Duration, op: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    ClusterError: From<E>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(ClusterError::from),
        Err(_) => Err(ClusterError::Timeout(limit)),
    }
}

/// Run a local store lookup, failing with `Timeout` after `limit`
pub(crate) async fn bounded_lookup<T, F>(limit: Duration, lookup: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, lookup)
        .await
        .map_err(|_| ClusterError::Timeout(limit))
}
