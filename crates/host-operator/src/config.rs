//! Operator configuration registry
//!
//! Host settings come from an optional YAML file, overridden by `HOST_*`
//! environment variables. Registration service settings come from
//! `REGISTRATION_SERVICE_*` environment variables only. A dotted key such as
//! `cluster.health.interval` maps to `HOST_CLUSTER_HEALTH_INTERVAL`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use toolchain_cluster::controller::DEFAULT_HEALTH_INTERVAL;
use toolchain_common::crd::{AuthClientConfig, RegistrationServiceSpec};
use toolchain_mur::controller::DEFAULT_PROVISIONING_REQUEUE;

/// Prefix of host operator environment variables
pub const HOST_ENV_PREFIX: &str = "HOST";

/// Prefix of registration service environment variables
pub const REGISTRATION_SERVICE_ENV_PREFIX: &str = "REGISTRATION_SERVICE";

/// Registration service environment used when none is configured
pub const DEFAULT_ENVIRONMENT: &str = "prod";

/// Interval between two ToolchainStatus publications
pub const DEFAULT_COUNTER_PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

const CLUSTER_HEALTH_INTERVAL: &str = "cluster.health.interval";
const COUNTER_PUBLISH_INTERVAL: &str = "counter.publish.interval";
const PROVISIONING_REQUEUE: &str = "mur.provisioning.requeue";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the file
        path: String,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML
    #[error("failed to read config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A setting holds a value of the wrong type
    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidValue {
        /// Dotted key of the setting
        key: String,
        /// Raw value
        value: String,
        /// Why the value was rejected
        message: String,
    },
}

/// Source of environment variables
#[cfg_attr(test, automock)]
pub trait EnvSource: Send + Sync {
    /// Value of `key`, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Environment variable name for a dotted key
pub fn env_key(prefix: &str, key: &str) -> String {
    format!("{prefix}_{}", key.replace('.', "_").to_ascii_uppercase())
}

/// Layered configuration of the host operator
pub struct Configuration {
    file: BTreeMap<String, String>,
    env: Arc<dyn EnvSource>,
}

impl Configuration {
    /// Configuration backed by the environment and defaults only
    pub fn empty(env: Arc<dyn EnvSource>) -> Self {
        Self {
            file: BTreeMap::new(),
            env,
        }
    }

    /// Load host settings from `path` when given
    pub fn load(path: Option<&Path>, env: Arc<dyn EnvSource>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::empty(env));
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw, env)
    }

    /// Parse host settings from a YAML document
    pub fn from_yaml(raw: &str, env: Arc<dyn EnvSource>) -> Result<Self, ConfigError> {
        let document: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let mut file = BTreeMap::new();
        flatten("", &document, &mut file);
        Ok(Self { file, env })
    }

    /// Host setting: `HOST_*` environment first, then the config file
    pub fn host_value(&self, key: &str) -> Option<String> {
        self.env_value(HOST_ENV_PREFIX, key)
            .or_else(|| self.file.get(&key.to_ascii_lowercase()).cloned())
    }

    /// Registration service setting from `REGISTRATION_SERVICE_*`
    pub fn registration_service_value(&self, key: &str) -> Option<String> {
        self.env_value(REGISTRATION_SERVICE_ENV_PREFIX, key)
    }

    fn env_value(&self, prefix: &str, key: &str) -> Option<String> {
        self.env
            .var(&env_key(prefix, key))
            .filter(|value| !value.is_empty())
    }

    fn host_duration(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.host_value(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                    message: format!("expected seconds: {e}"),
                }),
        }
    }

    /// How often member clusters are checked
    pub fn cluster_health_interval(&self) -> Result<Duration, ConfigError> {
        self.host_duration(CLUSTER_HEALTH_INTERVAL, DEFAULT_HEALTH_INTERVAL)
    }

    /// How often the account counter is written to the ToolchainStatus
    pub fn counter_publish_interval(&self) -> Result<Duration, ConfigError> {
        self.host_duration(COUNTER_PUBLISH_INTERVAL, DEFAULT_COUNTER_PUBLISH_INTERVAL)
    }

    /// Delay before the MasterUserRecord pass following a create or update
    pub fn provisioning_requeue(&self) -> Result<Duration, ConfigError> {
        self.host_duration(PROVISIONING_REQUEUE, DEFAULT_PROVISIONING_REQUEUE)
    }

    /// Registration service image, empty when unset
    pub fn registration_service_image(&self) -> String {
        self.registration_service_value("image").unwrap_or_default()
    }

    /// Registration service environment such as prod, stage, dev or e2e-tests
    pub fn registration_service_environment(&self) -> String {
        self.registration_service_value("environment")
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    /// Registration service replica count, zero when unset
    pub fn registration_service_replicas(&self) -> Result<i32, ConfigError> {
        match self.registration_service_value("replicas") {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "replicas".to_string(),
                    value: raw,
                    message: format!("{e}"),
                }),
        }
    }

    /// Desired RegistrationService spec
    pub fn registration_service_spec(&self) -> Result<RegistrationServiceSpec, ConfigError> {
        let value = |key: &str| self.registration_service_value(key).unwrap_or_default();
        Ok(RegistrationServiceSpec {
            image: self.registration_service_image(),
            environment: self.registration_service_environment(),
            replicas: self.registration_service_replicas()?,
            auth_client: AuthClientConfig {
                library_url: value("auth_client.library_url"),
                config: value("auth_client.config"),
                public_keys_url: value("auth_client.public_keys_url"),
            },
        })
    }
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, nested) in map {
                let Some(key) = scalar(key) else { continue };
                let key = key.to_ascii_lowercase();
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, nested, out);
            }
        }
        other => {
            if let Some(scalar) = scalar(other) {
                out.insert(prefix.to_string(), scalar);
            }
        }
    }
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
