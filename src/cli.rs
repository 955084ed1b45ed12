//! Command line arguments for both executables
//!
//! Flags are applied on top of the config file (or defaults), so anything
//! not given on the command line keeps its configured value.

use crate::config::{IdleKind, LogConfig, PublisherConfig, SubscriberConfig, TransportConfig};
use crate::error::Result;
use clap::{Args, Parser};
use std::path::PathBuf;

/// Channel options shared by both executables
#[derive(Debug, Clone, Default, Args)]
pub struct TransportArgs {
    /// Transport directory for counters and log files
    #[arg(short = 'p', long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Channel address, e.g. udp://localhost:20121
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Stream id
    #[arg(short, long = "stream-id", value_name = "ID")]
    pub stream_id: Option<i32>,

    /// Largest datagram payload in bytes
    #[arg(long)]
    pub mtu: Option<usize>,

    /// Receiver window in datagrams
    #[arg(long, value_name = "DATAGRAMS")]
    pub window: Option<u32>,
}

impl TransportArgs {
    fn apply(&self, config: &mut TransportConfig) {
        if let Some(dir) = &self.dir {
            config.dir = Some(dir.clone());
        }
        if let Some(channel) = &self.channel {
            config.channel = channel.clone();
        }
        if let Some(stream_id) = self.stream_id {
            config.stream_id = stream_id;
        }
        if let Some(mtu) = self.mtu {
            config.mtu = mtu;
        }
        if let Some(window) = self.window {
            config.receiver_window = window;
        }
    }
}

/// Logging options shared by both executables
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Log filter, e.g. "debug" or "info,ohlcv_relay=trace"
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Also write a daily log file into the transport directory
    #[arg(long)]
    pub log_file: bool,
}

impl LogArgs {
    fn apply(&self, config: &mut LogConfig) {
        if let Some(level) = &self.log_level {
            config.level = Some(level.clone());
        }
        if self.log_file {
            config.to_file = true;
        }
    }
}

/// Relay rows of a delimited OHLCV file to a subscriber
#[derive(Debug, Clone, Parser)]
#[command(name = "ohlcv-publisher")]
#[command(version)]
pub struct PublisherArgs {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub transport: TransportArgs,

    /// Input file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Input file (positional form)
    #[arg(value_name = "INPUT", conflicts_with = "file")]
    pub input: Option<PathBuf>,

    /// Keep the publication open this long after the last row
    #[arg(short = 'l', long = "linger", value_name = "MS")]
    pub linger_ms: Option<u64>,

    /// Publish at most this many rows
    #[arg(short = 'm', long = "messages", value_name = "COUNT")]
    pub max_rows: Option<usize>,

    /// Pause after each row
    #[arg(long = "pace", value_name = "MS")]
    pub pace_ms: Option<u64>,

    /// Give up if no subscriber connects within this long
    #[arg(long = "connect-timeout", value_name = "MS")]
    pub connect_timeout_ms: Option<u64>,

    #[command(flatten)]
    pub log: LogArgs,
}

impl PublisherArgs {
    /// Load the config file if given and apply flags over it
    pub fn into_config(self) -> Result<PublisherConfig> {
        let mut config = match &self.config {
            Some(path) => PublisherConfig::load(path)?,
            None => PublisherConfig::default(),
        };

        self.transport.apply(&mut config.transport);
        self.log.apply(&mut config.log);
        if let Some(file) = self.file.or(self.input) {
            config.input = Some(file);
        }
        if let Some(linger) = self.linger_ms {
            config.linger_timeout_ms = linger;
        }
        if let Some(max_rows) = self.max_rows {
            config.max_rows = Some(max_rows);
        }
        if let Some(pace) = self.pace_ms {
            config.pace_ms = pace;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout_ms = Some(timeout);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Receive OHLCV records and show them as they arrive
#[derive(Debug, Clone, Parser)]
#[command(name = "ohlcv-subscriber")]
#[command(version)]
pub struct SubscriberArgs {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub transport: TransportArgs,

    /// Fragments taken per poll
    #[arg(long, value_name = "COUNT")]
    pub fragment_limit: Option<usize>,

    /// Idle strategy when there is nothing to read
    #[arg(long, value_enum)]
    pub idle: Option<IdleKind>,

    /// Log updates instead of opening the chart window
    #[arg(long)]
    pub headless: bool,

    #[command(flatten)]
    pub log: LogArgs,
}

impl SubscriberArgs {
    /// Load the config file if given and apply flags over it
    pub fn into_config(self) -> Result<SubscriberConfig> {
        let mut config = match &self.config {
            Some(path) => SubscriberConfig::load(path)?,
            None => SubscriberConfig::default(),
        };

        self.transport.apply(&mut config.transport);
        self.log.apply(&mut config.log);
        if let Some(limit) = self.fragment_limit {
            config.fragment_limit = limit;
        }
        if let Some(idle) = self.idle {
            config.idle.strategy = idle;
        }
        if self.headless {
            config.headless = true;
        }

        config.validate()?;
        Ok(config)
    }
}
