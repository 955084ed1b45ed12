//! Configuration for the relay executables
//!
//! Both executables start from built-in defaults, optionally overlay a TOML
//! file given with `--config`, then apply command line flags on top (see
//! [`crate::cli`]). Every struct is `#[serde(default)]` so a config file only
//! needs the keys it changes:
//!
//! ```toml
//! linger_timeout_ms = 2000
//!
//! [transport]
//! channel = "udp://10.0.0.5:20121"
//! stream_id = 1001
//! ```
//!
//! # Transport Directory
//!
//! Session counters and optional log files are written to the transport
//! directory. It defaults to the platform data location:
//! - **Linux**: `~/.local/share/ohlcv-relay/`
//! - **macOS**: `~/Library/Application Support/ohlcv-relay/`
//! - **Windows**: `%APPDATA%\ohlcv-relay\`

use crate::error::{RelayError, Result};
use crate::ingest::idle::{BackoffIdleStrategy, IdleStrategy, SleepingIdleStrategy};
use crate::publisher::PublishOptions;
use crate::transport::ChannelUri;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "ohlcv-relay";

/// Default channel address
pub const DEFAULT_CHANNEL: &str = "udp://localhost:20121";

/// Default stream id
pub const DEFAULT_STREAM_ID: i32 = 1001;

/// Default linger after the last row, in milliseconds
pub const DEFAULT_LINGER_TIMEOUT_MS: u64 = 0;

/// Longest accepted linger (one hour)
pub const MAX_LINGER_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Default number of fragments taken per poll
pub const DEFAULT_FRAGMENT_LIMIT: usize = 10;

/// Default idle sleep when a poll finds nothing
pub const DEFAULT_IDLE_SLEEP_MS: u64 = 1;

/// Default pause between successfully sent rows
pub const DEFAULT_PACE_MS: u64 = 1;

/// Default largest datagram payload
pub const DEFAULT_MTU: usize = 1408;

/// Default receiver window in datagrams
pub const DEFAULT_RECEIVER_WINDOW: u32 = 128;

// ==================== Paths ====================

/// Platform default for the transport directory
pub fn default_transport_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_ID)
}

/// Parse a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;

    toml::from_str(&content).map_err(|e| {
        RelayError::Config(format!("Failed to parse config file {:?}: {}", path, e))
    })
}

// ==================== Transport ====================

/// Channel endpoint and datagram transport tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport directory; `None` uses [`default_transport_dir`]
    pub dir: Option<PathBuf>,

    /// Channel address, `udp://host:port`
    pub channel: String,

    /// Stream id both sides agree on
    pub stream_id: i32,

    /// Largest payload per datagram in bytes
    pub mtu: usize,

    /// Datagrams a publisher may have in flight past the subscriber position
    pub receiver_window: u32,

    /// A peer not heard from for this long is disconnected
    pub liveness_timeout_ms: u64,

    /// Subscriber status cadence while idle
    pub status_interval_ms: u64,

    /// Publisher setup/heartbeat cadence
    pub setup_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dir: None,
            channel: DEFAULT_CHANNEL.to_string(),
            stream_id: DEFAULT_STREAM_ID,
            mtu: DEFAULT_MTU,
            receiver_window: DEFAULT_RECEIVER_WINDOW,
            liveness_timeout_ms: 1000,
            status_interval_ms: 100,
            setup_interval_ms: 100,
        }
    }
}

impl TransportConfig {
    /// Effective transport directory
    pub fn transport_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_transport_dir)
    }

    pub fn channel_uri(&self) -> Result<ChannelUri> {
        self.channel.parse()
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn setup_interval(&self) -> Duration {
        Duration::from_millis(self.setup_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.channel_uri()?;

        if self.stream_id <= 0 {
            return Err(RelayError::Config(format!(
                "Stream id must be positive, got {}",
                self.stream_id
            )));
        }
        if self.mtu == 0 || self.mtu > u16::MAX as usize {
            return Err(RelayError::Config(format!(
                "MTU must be between 1 and {}, got {}",
                u16::MAX,
                self.mtu
            )));
        }
        if self.receiver_window == 0 {
            return Err(RelayError::Config(
                "Receiver window must be at least 1".to_string(),
            ));
        }
        if self.liveness_timeout_ms == 0 {
            return Err(RelayError::Config(
                "Liveness timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

// ==================== Logging ====================

/// Log output settings shared by both executables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive overriding the default, e.g. `"debug"`
    pub level: Option<String>,

    /// Also write a daily log file into the transport directory
    pub to_file: bool,
}

// ==================== Publisher ====================

/// Settings for the sending executable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub transport: TransportConfig,

    /// Delimited input file
    pub input: Option<PathBuf>,

    /// Keep the publication open this long after the last row
    pub linger_timeout_ms: u64,

    /// Pause after each sent row
    pub pace_ms: u64,

    /// Retry backoff bounds for back pressure and admin actions
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,

    /// Stop after this many rows
    pub max_rows: Option<usize>,

    /// Give up waiting for a subscriber after this long; `None` waits until
    /// interrupted
    pub connect_timeout_ms: Option<u64>,

    pub log: LogConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            input: None,
            linger_timeout_ms: DEFAULT_LINGER_TIMEOUT_MS,
            pace_ms: DEFAULT_PACE_MS,
            backoff_min_ms: 1,
            backoff_max_ms: 100,
            max_rows: None,
            connect_timeout_ms: None,
            log: LogConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Load a publisher config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;

        if self.input.is_none() {
            return Err(RelayError::Config("An input file is required".to_string()));
        }
        if self.linger_timeout_ms > MAX_LINGER_TIMEOUT_MS {
            return Err(RelayError::Config(format!(
                "Linger timeout {} ms exceeds the maximum of {} ms",
                self.linger_timeout_ms, MAX_LINGER_TIMEOUT_MS
            )));
        }
        if self.backoff_min_ms == 0 {
            return Err(RelayError::Config(
                "Backoff minimum must be at least 1 ms".to_string(),
            ));
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(RelayError::Config(format!(
                "Backoff minimum {} ms is above the maximum {} ms",
                self.backoff_min_ms, self.backoff_max_ms
            )));
        }

        Ok(())
    }

    /// Send loop settings derived from this config
    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            pace: Duration::from_millis(self.pace_ms),
            backoff_min: Duration::from_millis(self.backoff_min_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            max_rows: self.max_rows,
            linger: Duration::from_millis(self.linger_timeout_ms),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ==================== Subscriber ====================

/// How the ingest loop waits when a poll finds nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IdleKind {
    /// Fixed sleep
    #[default]
    Sleeping,
    /// Spin, then yield, then park with a growing period
    Backoff,
}

impl std::fmt::Display for IdleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdleKind::Sleeping => write!(f, "sleeping"),
            IdleKind::Backoff => write!(f, "backoff"),
        }
    }
}

/// Idle strategy selection and tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub strategy: IdleKind,

    /// Sleep period of the sleeping strategy
    pub sleep_ms: u64,

    /// Backoff strategy: busy checks before yielding
    pub max_spins: u32,

    /// Backoff strategy: yields before parking
    pub max_yields: u32,

    /// Backoff strategy: park period bounds
    pub min_park_us: u64,
    pub max_park_us: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            strategy: IdleKind::Sleeping,
            sleep_ms: DEFAULT_IDLE_SLEEP_MS,
            max_spins: 10,
            max_yields: 5,
            min_park_us: 1,
            max_park_us: 1000,
        }
    }
}

impl IdleConfig {
    /// Build the configured strategy
    pub fn build(&self) -> Box<dyn IdleStrategy> {
        match self.strategy {
            IdleKind::Sleeping => Box::new(SleepingIdleStrategy::new(Duration::from_millis(
                self.sleep_ms,
            ))),
            IdleKind::Backoff => Box::new(BackoffIdleStrategy::new(
                self.max_spins,
                self.max_yields,
                Duration::from_micros(self.min_park_us),
                Duration::from_micros(self.max_park_us),
            )),
        }
    }
}

/// Settings for the receiving executable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub transport: TransportConfig,

    /// Fragments taken per poll
    pub fragment_limit: usize,

    pub idle: IdleConfig,

    /// Run without the chart window, logging new data instead
    pub headless: bool,

    /// Headless consumer check interval
    pub refresh_interval_ms: u64,

    pub log: LogConfig,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            idle: IdleConfig::default(),
            headless: false,
            refresh_interval_ms: 250,
            log: LogConfig::default(),
        }
    }
}

impl SubscriberConfig {
    /// Load a subscriber config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;

        if self.fragment_limit == 0 {
            return Err(RelayError::Config(
                "Fragment limit must be at least 1".to_string(),
            ));
        }
        if self.idle.sleep_ms == 0 {
            return Err(RelayError::Config(
                "Idle sleep must be at least 1 ms".to_string(),
            ));
        }
        if self.idle.min_park_us == 0 {
            return Err(RelayError::Config(
                "Idle park minimum must be at least 1 us".to_string(),
            ));
        }
        if self.idle.min_park_us > self.idle.max_park_us {
            return Err(RelayError::Config(
                "Idle park minimum is above the maximum".to_string(),
            ));
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

// ==================== Tests ====================
