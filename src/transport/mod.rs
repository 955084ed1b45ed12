//! Message transport
//!
//! The relay only ever talks to a channel through the [`Publication`] and
//! [`Subscription`] traits, so the send loop and the ingest loop can be
//! driven by the UDP transport in production and by scripted channels in
//! tests.
//!
//! # Implementations
//!
//! - [`udp`] - Unicast datagrams with receiver status messages for
//!   connection liveness and flow control
//! - [`loopback`] - In-process channel over a bounded crossbeam queue
//!
//! # Outcomes
//!
//! Every offer resolves to exactly one [`OfferResult`]. Callers match on it
//! exhaustively; there is no catch-all arm anywhere in the crate.

pub mod frame;
pub mod loopback;
pub mod udp;

use crate::error::{RelayError, Result};
use serde::Serialize;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

pub use loopback::{LoopbackPublication, LoopbackSubscription};
pub use udp::{UdpPublication, UdpSubscription};

/// Result of a non-blocking offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OfferResult {
    /// The whole message was handed to the transport
    Success,
    /// The receiver window is full; retry the same message later
    BackPressured,
    /// No subscriber is currently connected
    NotConnected,
    /// The transport was busy with housekeeping; retry the same message
    AdminAction,
    /// The publication can no longer be used
    Closed,
}

impl OfferResult {
    /// Outcomes that are retried locally rather than surfaced
    pub fn is_transient(&self) -> bool {
        match self {
            OfferResult::BackPressured | OfferResult::NotConnected | OfferResult::AdminAction => {
                true
            }
            OfferResult::Success | OfferResult::Closed => false,
        }
    }
}

impl fmt::Display for OfferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferResult::Success => write!(f, "success"),
            OfferResult::BackPressured => write!(f, "back pressured"),
            OfferResult::NotConnected => write!(f, "not connected"),
            OfferResult::AdminAction => write!(f, "admin action"),
            OfferResult::Closed => write!(f, "closed"),
        }
    }
}

/// One physical chunk of a message as delivered by a subscription
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    buffer: &'a [u8],
    offset: usize,
    length: usize,
    is_first: bool,
    is_final: bool,
}

impl<'a> Fragment<'a> {
    /// Describe `buffer[offset..offset + length]`
    ///
    /// The range is clamped to the buffer.
    pub fn new(
        buffer: &'a [u8],
        offset: usize,
        length: usize,
        is_first: bool,
        is_final: bool,
    ) -> Self {
        let offset = offset.min(buffer.len());
        let length = length.min(buffer.len() - offset);
        Self {
            buffer,
            offset,
            length,
            is_first,
            is_final,
        }
    }

    /// A fragment that is a whole message
    pub fn unfragmented(bytes: &'a [u8]) -> Self {
        Self::new(bytes, 0, bytes.len(), true, true)
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// The fragment's payload
    pub fn bytes(&self) -> &'a [u8] {
        &self.buffer[self.offset..self.offset + self.length]
    }

    /// First fragment of a message
    pub fn is_first(&self) -> bool {
        self.is_first
    }

    /// Last fragment of a message
    pub fn is_final(&self) -> bool {
        self.is_final
    }
}

/// Sending side of a channel
pub trait Publication: Send {
    /// Attempt to send one whole message without blocking
    fn offer(&mut self, payload: &[u8]) -> OfferResult;

    /// Whether at least one subscriber is currently connected
    ///
    /// Takes `&mut self` because checking may process pending control
    /// traffic.
    fn is_connected(&mut self) -> bool;

    /// Channel address, for diagnostics
    fn channel(&self) -> String;

    fn stream_id(&self) -> i32;

    /// Release the publication; later offers return [`OfferResult::Closed`]
    fn close(&mut self) {}
}

/// Receiving side of a channel
pub trait Subscription: Send {
    /// Deliver up to `fragment_limit` fragments to `handler`, in arrival order
    ///
    /// Returns the number of fragments delivered. Errors are fatal to the
    /// session.
    fn poll(&mut self, handler: &mut dyn FnMut(Fragment<'_>), fragment_limit: usize)
        -> Result<usize>;

    /// Whether a publisher is currently sending to this subscription
    fn is_connected(&self) -> bool;

    /// Channel address, for diagnostics
    fn channel(&self) -> String;

    fn stream_id(&self) -> i32;

    /// Release the subscription
    fn close(&mut self) {}
}

/// Number of fragments a payload of `len` bytes needs at the given MTU
pub fn fragment_count(len: usize, mtu: usize) -> usize {
    let mtu = mtu.max(1);
    len.div_ceil(mtu).max(1)
}

/// A datagram channel address
///
/// Accepted forms: `udp://host:port` and `aeron:udp?endpoint=host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUri {
    endpoint: String,
}

impl ChannelUri {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve the endpoint to a socket address
    pub fn resolve(&self) -> Result<SocketAddr> {
        self.endpoint
            .to_socket_addrs()
            .map_err(|e| RelayError::Config(format!("Cannot resolve '{}': {}", self.endpoint, e)))?
            .next()
            .ok_or_else(|| {
                RelayError::Config(format!("'{}' resolved to no address", self.endpoint))
            })
    }
}

impl FromStr for ChannelUri {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let endpoint = if let Some(rest) = s.strip_prefix("udp://") {
            rest
        } else if let Some(params) = s.strip_prefix("aeron:udp?") {
            params
                .split('|')
                .find_map(|kv| kv.strip_prefix("endpoint="))
                .ok_or_else(|| RelayError::Config(format!("Channel '{}' has no endpoint", s)))?
        } else {
            return Err(RelayError::Config(format!(
                "Unsupported channel '{}', expected udp://host:port",
                s
            )));
        };

        let valid = endpoint
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(RelayError::Config(format!(
                "Channel endpoint '{}' must be host:port",
                endpoint
            )));
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
        })
    }
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "udp://{}", self.endpoint)
    }
}
