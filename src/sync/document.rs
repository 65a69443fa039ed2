//! Document synchronizer
//!
//! Writes style documents from peers into the local data directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::catalog::DataDirectory;
use crate::error::Result;
use crate::event::ClusterEvent;

use super::{bounded, Synchronizer};

pub struct DocumentSynchronizer {
    data_dir: Arc<DataDirectory>,
    apply_timeout: Duration,
}

impl DocumentSynchronizer {
    pub fn new(data_dir: Arc<DataDirectory>, apply_timeout: Duration) -> Self {
        Self {
            data_dir,
            apply_timeout,
        }
    }
}

#[async_trait]
impl Synchronizer for DocumentSynchronizer {
    fn name(&self) -> &str {
        "document"
    }

    /// Documents go first so a style arriving right after finds its file
    fn priority(&self) -> i32 {
        0
    }

    async fn synchronize(&self, event: &ClusterEvent) -> Result<bool> {
        let ClusterEvent::Document(doc) = event else {
            return Ok(false);
        };

        match bounded(self.apply_timeout, self.data_dir.write(&doc.path, &doc.content)).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                info!("Style document {} not written (read-only data directory)", doc.path);
                Ok(true)
            }
            Err(e) => {
                error!("{} synchronizer is unable to apply {}: {}", self.name(), event, e);
                Err(e)
            }
        }
    }
}
