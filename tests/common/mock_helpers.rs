//! Mock construction helpers

use ohlcv_relay::transport::{Fragment, OfferResult, Publication, Subscription};
use std::collections::VecDeque;

/// Publication that replays a fixed list of offer results
///
/// Once the script runs out every offer succeeds. Every offered payload is
/// recorded, successful or not.
#[derive(Debug, Default)]
pub struct ScriptedPublication {
    pub script: VecDeque<OfferResult>,
    pub offers: Vec<Vec<u8>>,
    pub delivered: Vec<Vec<u8>>,
    pub connected: bool,
    pub closed: bool,
}

impl ScriptedPublication {
    pub fn new(script: impl IntoIterator<Item = OfferResult>) -> Self {
        Self {
            script: script.into_iter().collect(),
            connected: true,
            ..Default::default()
        }
    }
}

impl Publication for ScriptedPublication {
    fn offer(&mut self, payload: &[u8]) -> OfferResult {
        self.offers.push(payload.to_vec());
        if self.closed {
            return OfferResult::Closed;
        }
        let result = self.script.pop_front().unwrap_or(OfferResult::Success);
        if result == OfferResult::Success {
            self.delivered.push(payload.to_vec());
        }
        result
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn channel(&self) -> String {
        "scripted".to_string()
    }

    fn stream_id(&self) -> i32 {
        7
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Subscription fed from a prepared list of fragments
///
/// Each queued entry is `(bytes, is_first, is_final)`.
#[derive(Debug, Default)]
pub struct FragmentFeeder {
    pub queue: VecDeque<(Vec<u8>, bool, bool)>,
    pub closed: bool,
}

impl FragmentFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a whole message as one fragment
    pub fn message(mut self, bytes: &[u8]) -> Self {
        self.queue.push_back((bytes.to_vec(), true, true));
        self
    }

    /// Queue a message split into chunks of `size` bytes
    pub fn split(mut self, bytes: &[u8], size: usize) -> Self {
        let chunks: Vec<&[u8]> = bytes.chunks(size.max(1)).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.queue.push_back((chunk.to_vec(), i == 0, i == last));
        }
        self
    }

    /// Queue a raw fragment
    pub fn fragment(mut self, bytes: &[u8], is_first: bool, is_final: bool) -> Self {
        self.queue.push_back((bytes.to_vec(), is_first, is_final));
        self
    }
}

impl Subscription for FragmentFeeder {
    fn poll(
        &mut self,
        handler: &mut dyn FnMut(Fragment<'_>),
        fragment_limit: usize,
    ) -> ohlcv_relay::Result<usize> {
        let mut delivered = 0;
        while delivered < fragment_limit {
            let Some((bytes, is_first, is_final)) = self.queue.pop_front() else {
                break;
            };
            handler(Fragment::new(&bytes, 0, bytes.len(), is_first, is_final));
            delivered += 1;
        }
        Ok(delivered)
    }

    fn is_connected(&self) -> bool {
        !self.queue.is_empty()
    }

    fn channel(&self) -> String {
        "feeder".to_string()
    }

    fn stream_id(&self) -> i32 {
        7
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
