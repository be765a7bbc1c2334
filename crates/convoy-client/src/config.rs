//! Pool configuration.
//!
//! Settings are plain serde structs so they can be loaded from YAML or
//! built programmatically. Field defaults follow the original deployment
//! values; the two historical magic numbers (borrow-count recycling
//! threshold and backoff cap) are exposed as fields with their original
//! values as defaults.

use convoy_common::{ConvoyError, Envelope, Result, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Borrow count at which an idle connection is force-recycled.
pub const DEFAULT_RECYCLE_THRESHOLD: u32 = 20;

/// Cap, in seconds, on the exponential retry backoff (`2^5`).
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 32;

fn default_max_idle() -> usize {
    2
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_recycle_threshold() -> u32 {
    DEFAULT_RECYCLE_THRESHOLD
}

fn default_backoff_cap_secs() -> u64 {
    DEFAULT_BACKOFF_CAP_SECS
}

/// Settings for one pool, i.e. one logical backend cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Candidate backend addresses; any host may serve any request.
    pub hosts: Vec<String>,

    /// Length-prefixed framing when true, buffered records otherwise.
    #[serde(default)]
    pub framed: bool,

    /// Soft cap on cached idle connections.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Hard cap on live connections; 0 means unbounded.
    #[serde(default)]
    pub max_active: usize,

    /// Retry budget for `call_with_retry`.
    #[serde(default)]
    pub max_retry: u32,

    /// Block at capacity instead of failing fast.
    #[serde(default)]
    pub wait: bool,

    /// Abort a blocking acquire after this many milliseconds. `None` waits
    /// indefinitely.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,

    /// Timeout for opening one backend connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Buffer size for the buffered envelope.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Borrow count at which an idle connection is force-recycled.
    #[serde(default = "default_recycle_threshold")]
    pub recycle_threshold: u32,

    /// Cap, in seconds, on the exponential retry backoff.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl PoolConfig {
    /// Settings for `hosts` with every other field at its default.
    pub fn new(hosts: Vec<String>) -> Self {
        PoolConfig {
            hosts,
            framed: false,
            max_idle: default_max_idle(),
            max_active: 0,
            max_retry: 0,
            wait: false,
            acquire_timeout_ms: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            buffer_size: default_buffer_size(),
            recycle_threshold: default_recycle_threshold(),
            backoff_cap_secs: default_backoff_cap_secs(),
        }
    }

    pub fn envelope(&self) -> Envelope {
        if self.framed {
            Envelope::Framed
        } else {
            Envelope::Buffered {
                buffer_size: self.buffer_size,
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration: one [`PoolConfig`] per pool name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pools: HashMap<String, PoolConfig>,
}

impl RegistryConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| ConvoyError::Config(format!("invalid pool configuration: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConvoyError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
    }
}
