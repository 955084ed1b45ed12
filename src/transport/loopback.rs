//! In-process transport
//!
//! A crossbeam queue of fragments stands in for the network. `capacity` is
//! the receiver window: when the queued fragments plus a message's
//! fragments would exceed it, the offer is back pressured and nothing is
//! enqueued. An empty queue always takes the whole message, so a message
//! wider than the window still gets through.

use super::{fragment_count, Fragment, OfferResult, Publication, Subscription};
use crate::error::Result;
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Channel name reported by loopback endpoints
pub const LOOPBACK_CHANNEL: &str = "loopback";

#[derive(Debug)]
struct LoopbackFragment {
    data: Vec<u8>,
    is_first: bool,
    is_final: bool,
}

#[derive(Debug, Default)]
struct LinkState {
    /// Subscriber is attached and consuming
    attached: AtomicBool,
    subscription_dropped: AtomicBool,
    publication_dropped: AtomicBool,
}

/// Create a connected publication/subscription pair
///
/// `capacity` is the queue size in fragments, `mtu` the largest fragment
/// payload in bytes.
pub fn channel(
    stream_id: i32,
    capacity: usize,
    mtu: usize,
) -> (LoopbackPublication, LoopbackSubscription) {
    let capacity = capacity.max(1);
    let (tx, rx) = unbounded();
    let state = Arc::new(LinkState::default());
    state.attached.store(true, Ordering::SeqCst);

    let publication = LoopbackPublication {
        tx,
        state: state.clone(),
        stream_id,
        mtu: mtu.max(1),
        capacity,
        closed: false,
    };
    let subscription = LoopbackSubscription {
        rx,
        state,
        stream_id,
    };
    (publication, subscription)
}

/// Sending half of a loopback channel
#[derive(Debug)]
pub struct LoopbackPublication {
    tx: Sender<LoopbackFragment>,
    state: Arc<LinkState>,
    stream_id: i32,
    mtu: usize,
    capacity: usize,
    closed: bool,
}

impl Publication for LoopbackPublication {
    fn offer(&mut self, payload: &[u8]) -> OfferResult {
        if self.closed || self.state.subscription_dropped.load(Ordering::SeqCst) {
            return OfferResult::Closed;
        }
        if !self.state.attached.load(Ordering::SeqCst) {
            return OfferResult::NotConnected;
        }

        let queued = self.tx.len();
        let needed = fragment_count(payload.len(), self.mtu);
        if queued > 0 && queued + needed > self.capacity {
            return OfferResult::BackPressured;
        }

        let mut chunks: Vec<&[u8]> = payload.chunks(self.mtu).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let fragment = LoopbackFragment {
                data: chunk.to_vec(),
                is_first: i == 0,
                is_final: i == last,
            };
            match self.tx.try_send(fragment) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return OfferResult::BackPressured,
                Err(TrySendError::Disconnected(_)) => return OfferResult::Closed,
            }
        }

        OfferResult::Success
    }

    fn is_connected(&mut self) -> bool {
        !self.closed
            && !self.state.subscription_dropped.load(Ordering::SeqCst)
            && self.state.attached.load(Ordering::SeqCst)
    }

    fn channel(&self) -> String {
        LOOPBACK_CHANNEL.to_string()
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for LoopbackPublication {
    fn drop(&mut self) {
        self.state.publication_dropped.store(true, Ordering::SeqCst);
    }
}

/// Receiving half of a loopback channel
#[derive(Debug)]
pub struct LoopbackSubscription {
    rx: Receiver<LoopbackFragment>,
    state: Arc<LinkState>,
    stream_id: i32,
}

impl LoopbackSubscription {
    /// Stop accepting offers; the publication sees `NotConnected`
    pub fn detach(&self) {
        self.state.attached.store(false, Ordering::SeqCst);
    }

    /// Resume accepting offers
    pub fn attach(&self) {
        self.state.attached.store(true, Ordering::SeqCst);
    }

    /// Fragments queued and not yet polled
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

impl Subscription for LoopbackSubscription {
    fn poll(
        &mut self,
        handler: &mut dyn FnMut(Fragment<'_>),
        fragment_limit: usize,
    ) -> Result<usize> {
        let mut delivered = 0;
        while delivered < fragment_limit {
            let Ok(fragment) = self.rx.try_recv() else {
                break;
            };
            handler(Fragment::new(
                &fragment.data,
                0,
                fragment.data.len(),
                fragment.is_first,
                fragment.is_final,
            ));
            delivered += 1;
        }
        Ok(delivered)
    }

    fn is_connected(&self) -> bool {
        !self.state.publication_dropped.load(Ordering::SeqCst) || !self.rx.is_empty()
    }

    fn channel(&self) -> String {
        LOOPBACK_CHANNEL.to_string()
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }
}

impl Drop for LoopbackSubscription {
    fn drop(&mut self) {
        self.state.subscription_dropped.store(true, Ordering::SeqCst);
    }
}
