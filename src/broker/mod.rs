//! Brokers.
//!
//! This module contains:
//! - Broker configuration types and the `init_broker` factory
//! - Implementations: in-memory (feature `memory`), mock
//!
//! The `Broker` trait itself and the publisher/subscriber contracts live in
//! `crate::interfaces`; they are re-exported here.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

// Implementation modules
#[cfg(feature = "memory")]
pub mod memory;
pub mod mock;

// Re-exports
pub use crate::interfaces::broker::{Broker, BrokerError, Result};
pub use crate::interfaces::delivery::{
    DeliveryError, DeliveryFailure, DeliveryObserver, PublishReport,
};
#[cfg(feature = "memory")]
pub use memory::{InMemoryBroker, InMemorySubscription};
pub use mock::MockBroker;

// ============================================================================
// Configuration
// ============================================================================

/// Broker type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    /// In-process broker, no external deps.
    #[default]
    Memory,
}

/// Broker configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker type discriminator.
    #[serde(rename = "type")]
    pub broker_type: BrokerType,
    /// Name used in logs. Defaults to the category the broker serves.
    pub name: Option<String>,
    /// In-memory specific configuration.
    pub memory: InMemoryConfig,
}

/// In-memory broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Upper bound on waiting for in-flight deliveries when a subscription
    /// is disposed.
    pub dispose_timeout_ms: u64,
}

impl InMemoryConfig {
    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            dispose_timeout_ms: 5_000,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize a broker from configuration.
///
/// `default_name` is used when the config does not name the broker.
/// Requires the corresponding feature:
/// - Memory: `--features memory` (included in default)
pub fn init_broker(default_name: &str, config: &BrokerConfig) -> Result<Arc<dyn Broker>> {
    let name = config.name.as_deref().unwrap_or(default_name);

    match config.broker_type {
        BrokerType::Memory => {
            #[cfg(feature = "memory")]
            {
                let broker = InMemoryBroker::from_config(name, config.memory.clone());
                info!(broker = %name, broker_type = "memory", "Broker initialized");
                Ok(Arc::new(broker))
            }

            #[cfg(not(feature = "memory"))]
            {
                Err(BrokerError::UnsupportedBroker(format!(
                    "'{name}': memory broker requires the 'memory' feature"
                )))
            }
        }
    }
}
