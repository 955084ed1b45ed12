//! # ohlcv-relay: OHLCV market data over a flow-controlled datagram link
//!
//! A publisher reads rows of a delimited OHLCV file, encodes each row into a
//! compact text frame and offers it to a publication, retrying on back
//! pressure. A subscriber polls fragments off its subscription, reassembles
//! and decodes records, and appends them to a shared store that a viewer
//! consumes through a ready signal.
//!
//! ## Architecture
//!
//! - **Transport**: [`transport::Publication`] / [`transport::Subscription`]
//!   traits with a UDP implementation and an in-process loopback
//! - **Publisher**: [`publisher::run`] send loop with bounded backoff
//! - **Ingest**: [`ingest::RecordIngest`] poll loop on its own thread,
//!   paced by an [`ingest::idle::IdleStrategy`]
//! - **Store**: [`store::TimeSeriesStore`], single writer, many readers
//! - **Viewer**: [`consumer::SeriesView`] plus the egui candlestick chart
//!   behind the `gui` feature
//!
//! ## Example
//!
//! ```ignore
//! use ohlcv_relay::{cancel::CancelToken, ingest, store::TimeSeriesStore, transport::loopback};
//! use std::sync::Arc;
//!
//! let (mut publication, mut subscription) = loopback::channel(1001, 64, 1408);
//! let store = Arc::new(TimeSeriesStore::new());
//! let cancel = CancelToken::new();
//!
//! let table = ohlcv_relay::source::CsvTable::read("prices.csv")?;
//! let options = ohlcv_relay::PublishOptions::default();
//! let report = ohlcv_relay::publisher::run(&table.rows, &mut publication, &options, &cancel);
//! ```

pub mod cancel;
pub mod cli;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
#[cfg(feature = "gui")]
pub mod frontend;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod publisher;
pub mod source;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use codec::{decode, encode, CodecError};
pub use error::{RelayError, Result};
pub use publisher::{PublishOptions, PublishReport, SessionOutcome};
pub use store::TimeSeriesStore;
pub use transport::{OfferResult, Publication, Subscription};
pub use types::{Record, Row};
