//! Subscribe side: fragment reassembly and the ingest poll loop
//!
//! The transport hands over fragments in arrival order. [`FragmentAssembler`]
//! buffers them until the final fragment of a message, decodes the whole
//! message and hands back a [`Record`]. [`RecordIngest`] drives a
//! [`Subscription`], feeds the assembler and appends every decoded record
//! to the [`TimeSeriesStore`].
//!
//! Decode failures cost one record: they are logged, counted and the loop
//! carries on. Only a failing subscription ends the loop early.

pub mod idle;

use crate::cancel::CancelToken;
use crate::codec::{self, MAX_FRAME_LEN};
use crate::error::Result;
use crate::store::TimeSeriesStore;
use crate::transport::{Fragment, Subscription};
use crate::types::Record;
use idle::IdleStrategy;
use serde::Serialize;
use std::sync::Arc;

/// Reassembles fragmented messages into records
///
/// The buffer is cleared at every final fragment whatever the decode
/// outcome, and at every first fragment, so nothing from one message can
/// leak into the next.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    buffer: Vec<u8>,
    /// Current message outgrew the frame limit; swallow it until its end
    oversized: bool,
    records: u64,
    decode_failures: u64,
    oversize_discards: u64,
    incomplete_discards: u64,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
            ..Default::default()
        }
    }

    /// Accumulate one chunk; decode when it completes a message
    pub fn on_fragment(&mut self, bytes: &[u8], is_final: bool) -> Option<Record> {
        if !self.oversized {
            if self.buffer.len() + bytes.len() > MAX_FRAME_LEN {
                self.oversized = true;
                self.buffer.clear();
            } else {
                self.buffer.extend_from_slice(bytes);
            }
        }

        if !is_final {
            return None;
        }

        if self.oversized {
            self.oversized = false;
            self.oversize_discards += 1;
            tracing::warn!("Discarded message larger than {} bytes", MAX_FRAME_LEN);
            return None;
        }

        let decoded = codec::decode(&self.buffer);
        self.buffer.clear();

        match decoded {
            Ok(record) => {
                self.records += 1;
                Some(record)
            }
            Err(e) => {
                self.decode_failures += 1;
                tracing::warn!(decode_failures = self.decode_failures, "Dropping record: {}", e);
                None
            }
        }
    }

    /// Handle a transport fragment, restarting on a message start
    pub fn on_transport_fragment(&mut self, fragment: Fragment<'_>) -> Option<Record> {
        if fragment.is_first() && (!self.buffer.is_empty() || self.oversized) {
            tracing::debug!(
                "Discarding {} bytes of an incomplete message",
                self.buffer.len()
            );
            self.incomplete_discards += 1;
            self.reset();
        }
        self.on_fragment(fragment.bytes(), fragment.is_final())
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.oversized = false;
    }

    /// Bytes held for the message in progress
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    pub fn oversize_discards(&self) -> u64 {
        self.oversize_discards
    }

    pub fn incomplete_discards(&self) -> u64 {
        self.incomplete_discards
    }
}

/// What an ingest session did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub polls: u64,
    pub fragments: u64,
    pub records: u64,
    pub decode_failures: u64,
    pub oversize_discards: u64,
    pub incomplete_discards: u64,
}

/// Poll loop feeding a store
#[derive(Debug)]
pub struct RecordIngest {
    store: Arc<TimeSeriesStore>,
    assembler: FragmentAssembler,
    fragment_limit: usize,
    polls: u64,
    fragments: u64,
}

impl RecordIngest {
    pub fn new(store: Arc<TimeSeriesStore>, fragment_limit: usize) -> Self {
        Self {
            store,
            assembler: FragmentAssembler::new(),
            fragment_limit: fragment_limit.max(1),
            polls: 0,
            fragments: 0,
        }
    }

    /// Feed one fragment, appending the record it completes
    pub fn on_fragment(&mut self, fragment: Fragment<'_>) {
        self.fragments += 1;
        if let Some(record) = self.assembler.on_transport_fragment(fragment) {
            tracing::trace!(timestamp = record.timestamp, "Record received");
            self.store.append(record);
        }
    }

    /// Poll the subscription once; returns fragments handled
    pub fn poll_once(&mut self, subscription: &mut dyn Subscription) -> Result<usize> {
        self.polls += 1;
        let limit = self.fragment_limit;
        subscription.poll(&mut |fragment| self.on_fragment(fragment), limit)
    }

    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            polls: self.polls,
            fragments: self.fragments,
            records: self.assembler.records(),
            decode_failures: self.assembler.decode_failures(),
            oversize_discards: self.assembler.oversize_discards(),
            incomplete_discards: self.assembler.incomplete_discards(),
        }
    }

    /// Poll until cancelled or the subscription fails
    ///
    /// The subscription is closed on the way out either way.
    pub fn run(
        mut self,
        subscription: &mut dyn Subscription,
        idle: &mut dyn IdleStrategy,
        cancel: &CancelToken,
    ) -> Result<IngestSummary> {
        let channel = subscription.channel();
        let stream_id = subscription.stream_id();
        tracing::info!(
            channel = %channel,
            stream_id,
            idle = idle.name(),
            fragment_limit = self.fragment_limit,
            "Ingest started"
        );

        let mut connected = false;
        while !cancel.is_cancelled() {
            let work = match self.poll_once(subscription) {
                Ok(work) => work,
                Err(e) => {
                    subscription.close();
                    let summary = self.summary();
                    tracing::error!(
                        channel = %channel,
                        stream_id,
                        records = summary.records,
                        "Ingest aborted: {}",
                        e
                    );
                    return Err(e);
                }
            };

            let now_connected = subscription.is_connected();
            if now_connected != connected {
                if now_connected {
                    tracing::info!(channel = %channel, stream_id, "Publisher connected");
                } else {
                    tracing::info!(channel = %channel, stream_id, "Publisher went away");
                }
                connected = now_connected;
            }

            idle.idle(work);
        }

        subscription.close();
        let summary = self.summary();
        tracing::info!(
            channel = %channel,
            stream_id,
            records = summary.records,
            decode_failures = summary.decode_failures,
            "Ingest stopped"
        );
        Ok(summary)
    }
}

/// Run an ingest session to completion
pub fn run_ingest(
    subscription: &mut dyn Subscription,
    store: Arc<TimeSeriesStore>,
    idle: &mut dyn IdleStrategy,
    fragment_limit: usize,
    cancel: &CancelToken,
) -> Result<IngestSummary> {
    RecordIngest::new(store, fragment_limit).run(subscription, idle, cancel)
}
