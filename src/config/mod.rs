//! Application configuration.
//!
//! Aggregates broker and discovery configuration into a single Config
//! struct that can be loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::broker::BrokerConfig;
use crate::discovery::DiscoveryOptions;
use crate::interfaces::SubscriptionOptions;
use crate::message::MessageKind;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SWITCHYARD_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SWITCHYARD";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SWITCHYARD_LOG";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker per message category.
    pub brokers: BrokersConfig,
    /// Handler auto-registration.
    pub discovery: DiscoveryConfig,
}

/// Broker configuration per message category. Unset categories have no
/// broker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokersConfig {
    pub event: Option<BrokerConfig>,
    pub command: Option<BrokerConfig>,
    pub message: Option<BrokerConfig>,
}

impl BrokersConfig {
    pub fn get(&self, kind: MessageKind) -> Option<&BrokerConfig> {
        match kind {
            MessageKind::Event => self.event.as_ref(),
            MessageKind::Command => self.command.as_ref(),
            MessageKind::Message => self.message.as_ref(),
        }
    }
}

/// Handler discovery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Run the auto-registration service.
    pub enabled: bool,
    /// Module path prefixes to scan. Empty scans every registration.
    pub modules: Vec<String>,
    /// Skip handlers that fail to register instead of aborting startup.
    pub continue_on_error: bool,
    /// Options applied to every auto-registered subscription.
    pub subscription: SubscriptionOptions,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            modules: Vec::new(),
            continue_on_error: true,
            subscription: SubscriptionOptions::default(),
        }
    }
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        config
            .modules
            .iter()
            .fold(DiscoveryOptions::new(), |options, module| {
                options.with_module(module.clone())
            })
            .with_continue_on_error(config.continue_on_error)
            .with_subscription_options(config.subscription.clone())
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Every category served by one in-memory broker named `memory`.
    pub fn in_memory() -> Self {
        let shared = BrokerConfig {
            name: Some("memory".to_string()),
            ..Default::default()
        };
        Self {
            brokers: BrokersConfig {
                event: Some(shared.clone()),
                command: Some(shared.clone()),
                message: Some(shared),
            },
            discovery: DiscoveryConfig::default(),
        }
    }
}
