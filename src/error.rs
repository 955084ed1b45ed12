//! Error handling for the OHLCV relay
//!
//! This module defines the relay's error taxonomy and a Result alias for use
//! throughout the crate. Per-record codec failures live in
//! [`crate::codec::CodecError`] and are wrapped here when they need to cross
//! a session boundary.

use crate::codec::CodecError;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Input file missing or unreadable
    #[error("Input error: {0}")]
    Input(String),

    /// Per-record encode/decode failure
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport could not be created or connected
    #[error("Transport error on {channel} (stream {stream_id}): {message}")]
    Transport {
        channel: String,
        stream_id: i32,
        message: String,
    },

    /// The channel was closed underneath an active session
    #[error("Channel closed: {channel} (stream {stream_id})")]
    ChannelClosed { channel: String, stream_id: i32 },

    /// Invalid arguments or configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RelayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a transport error for the given channel and stream
    pub fn transport(
        channel: impl Into<String>,
        stream_id: i32,
        message: impl Into<String>,
    ) -> Self {
        RelayError::Transport {
            channel: channel.into(),
            stream_id,
            message: message.into(),
        }
    }

    /// Whether this error ends the current session (as opposed to one record)
    pub fn is_fatal(&self) -> bool {
        match self {
            RelayError::Codec(_) => false,
            RelayError::WithContext { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RelayError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RelayError::Io(e).with_context(f()))
    }
}
