//! Configuration for the control plane.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ephemeris_state::StorageConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Environment variable prefix. Nested keys are separated by `__`, e.g.
/// `EPHEMERIS_STORAGE__BACKEND=valkey`.
pub const ENV_PREFIX: &str = "EPHEMERIS_";

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ephemeris.toml";

/// Top-level control-plane configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Session name. Used as the storage namespace unless one is configured.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            cluster: ClusterConfig::default(),
            collaborators: CollaboratorConfig::default(),
        }
    }
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `ephemeris.toml` in the current directory (if present)
    /// 3. The given file (if any). It must exist.
    /// 4. Environment variables with `EPHEMERIS_` prefix
    pub fn load(path: Option<&str>) -> ControlResult<Self> {
        let mut figment = Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = path {
            require_file(Path::new(path))?;
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, with env overrides.
    pub fn from_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        require_file(path.as_ref())?;
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ControlResult<()> {
        if self.session_name.is_empty() {
            return Err(ControlError::Config("session_name must not be empty".into()));
        }
        if self.server.io_threads == 0 {
            return Err(ControlError::Config("server.io_threads must be at least 1".into()));
        }
        if self.cluster.cluster_id_attempts == 0 {
            return Err(ControlError::Config(
                "cluster.cluster_id_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn require_file(path: &Path) -> ControlResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ControlError::Config(format!("config file {} not found", path.display())))
    }
}

fn default_session_name() -> String {
    "ephemeris".to_owned()
}

/// RPC listener and runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the RPC surface listens on. Port 0 picks a free port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// How long shutdown waits for in-flight requests.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Worker threads of the runtime that performs storage and RPC I/O.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6380)
}

const fn default_drain_timeout_secs() -> u64 {
    5
}

const fn default_io_threads() -> usize {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            drain_timeout_secs: default_drain_timeout_secs(),
            io_threads: default_io_threads(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Cluster identity bring-up.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Attempts at reading or persisting the cluster id before giving up.
    #[serde(default = "default_cluster_id_attempts")]
    pub cluster_id_attempts: u32,

    /// Delay between attempts.
    #[serde(default = "default_cluster_id_retry_ms")]
    pub cluster_id_retry_ms: u64,
}

const fn default_cluster_id_attempts() -> u32 {
    5
}

const fn default_cluster_id_retry_ms() -> u64 {
    200
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_id_attempts: default_cluster_id_attempts(),
            cluster_id_retry_ms: default_cluster_id_retry_ms(),
        }
    }
}

impl ClusterConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.cluster_id_retry_ms)
    }
}

/// Built-in collaborators. An interval of zero disables that collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Consecutive failed checks before the store is reported unhealthy.
    #[serde(default = "default_health_failure_threshold")]
    pub health_failure_threshold: u32,

    #[serde(default = "default_debug_state_interval_secs")]
    pub debug_state_interval_secs: u64,
}

const fn default_health_check_interval_ms() -> u64 {
    5_000
}

const fn default_health_failure_threshold() -> u32 {
    3
}

const fn default_debug_state_interval_secs() -> u64 {
    60
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            health_failure_threshold: default_health_failure_threshold(),
            debug_state_interval_secs: default_debug_state_interval_secs(),
        }
    }
}

impl CollaboratorConfig {
    /// Disables every built-in collaborator.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            health_check_interval_ms: 0,
            health_failure_threshold: default_health_failure_threshold(),
            debug_state_interval_secs: 0,
        }
    }
}

/// Settings for a [`StateAccessor`](crate::StateAccessor).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AccessorConfig {
    /// Upper bound on how long each call blocks.
    #[serde(default = "default_accessor_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_accessor_timeout_ms() -> u64 {
    5_000
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_accessor_timeout_ms(),
        }
    }
}

impl AccessorConfig {
    /// Rounds down to whole milliseconds, with a floor of one.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
