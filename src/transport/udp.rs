//! Unicast datagram transport
//!
//! The subscriber binds the channel endpoint. The publisher sends from an
//! ephemeral socket and learns liveness and flow control from STATUS
//! datagrams the subscriber sends back:
//!
//! 1. The publisher sends a SETUP datagram every setup interval, whether
//!    or not it is connected, so the subscriber learns its address and
//!    knows it is still alive between rows.
//! 2. The subscriber answers with STATUS carrying the next sequence it
//!    expects and its receiver window, after every poll that received data
//!    and at least once per status interval.
//! 3. The publisher is connected while it has heard a STATUS within the
//!    liveness timeout, and back pressured while the datagrams it has sent
//!    past the subscriber's position would exceed the window.
//!
//! Loss is tolerated: on a sequence gap the subscriber drops fragments until
//! the next message start. Nothing is retransmitted.

use super::frame::{self, FrameHeader, FrameKind, HEADER_LEN};
use super::{fragment_count, ChannelUri, Fragment, OfferResult, Publication, Subscription};
use crate::config::TransportConfig;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Largest datagram the subscriber reads
const RECV_BUFFER_LEN: usize = 64 * 1024;

/// Per-session transport statistics, written to the transport directory on
/// close
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportCounters {
    pub channel: String,
    pub stream_id: i32,
    pub session_id: i32,
    /// Whole messages sent or delivered
    pub messages: u64,
    pub datagrams: u64,
    pub bytes: u64,
    pub back_pressured: u64,
    pub admin_actions: u64,
    pub not_connected: u64,
    pub status_messages: u64,
    pub setup_messages: u64,
    pub gaps: u64,
    /// Fragments dropped while resynchronising after a gap
    pub discarded: u64,
    /// Datagrams for another stream, or not parseable
    pub ignored: u64,
}

/// Path of a counters file inside a transport directory
pub fn counters_path(dir: &Path, role: &str, stream_id: i32) -> PathBuf {
    dir.join(format!("{}-counters-{}.json", role, stream_id))
}

impl TransportCounters {
    /// Write as pretty JSON into `dir`
    pub fn write(&self, dir: &Path, role: &str) -> Result<PathBuf> {
        let path = counters_path(dir, role, self.stream_id);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize counters: {}", e)))?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Read a counters file back
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse counters: {}", e)))
    }
}

fn prepare_dir(cfg: &TransportConfig, channel: &str) -> Result<PathBuf> {
    let dir = cfg.transport_dir();
    std::fs::create_dir_all(&dir).map_err(|e| {
        RelayError::transport(
            channel,
            cfg.stream_id,
            format!("Cannot create transport directory {:?}: {}", dir, e),
        )
    })?;
    Ok(dir)
}

fn new_session_id() -> i32 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos ^ std::process::id().rotate_left(16)) as i32
}

/// Whether `a` is after `b` in wrapping sequence space
fn seq_after(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < u32::MAX / 2
}

// ==================== Publication ====================

/// Sending side of a UDP channel
#[derive(Debug)]
pub struct UdpPublication {
    socket: UdpSocket,
    channel: String,
    stream_id: i32,
    session_id: i32,
    mtu: usize,
    dir: PathBuf,

    next_sequence: u32,
    /// Subscriber's next expected sequence, from its last status
    consumed: u32,
    window: u32,
    last_status: Option<Instant>,
    last_setup: Option<Instant>,
    liveness: Duration,
    setup_interval: Duration,

    closed: bool,
    send_buf: Vec<u8>,
    counters: TransportCounters,
}

impl UdpPublication {
    /// Open a publication towards the channel endpoint
    pub fn connect(cfg: &TransportConfig) -> Result<Self> {
        let uri: ChannelUri = cfg.channel_uri()?;
        let channel = uri.to_string();
        let dir = prepare_dir(cfg, &channel)?;
        let fail =
            |e: std::io::Error| RelayError::transport(&channel, cfg.stream_id, e.to_string());

        let remote = uri.resolve()?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local).map_err(fail)?;
        socket.connect(remote).map_err(fail)?;
        socket.set_nonblocking(true).map_err(fail)?;

        let session_id = new_session_id();
        tracing::info!(
            channel = %channel,
            stream_id = cfg.stream_id,
            session_id,
            "Publication opened"
        );

        Ok(Self {
            socket,
            channel: channel.clone(),
            stream_id: cfg.stream_id,
            session_id,
            mtu: cfg.mtu.clamp(1, u16::MAX as usize),
            dir,
            next_sequence: 0,
            consumed: 0,
            window: cfg.receiver_window,
            last_status: None,
            last_setup: None,
            liveness: cfg.liveness_timeout(),
            setup_interval: cfg.setup_interval(),
            closed: false,
            send_buf: Vec::with_capacity(HEADER_LEN + cfg.mtu),
            counters: TransportCounters {
                channel,
                stream_id: cfg.stream_id,
                session_id,
                ..Default::default()
            },
        })
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    fn live(&self) -> bool {
        self.last_status
            .is_some_and(|at| at.elapsed() < self.liveness)
    }

    /// Drain pending status datagrams and send a setup if one is due
    fn service(&mut self) -> std::io::Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => self.on_control(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // ICMP port unreachable from a previous send: nobody listening
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    self.last_status = None;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let due = self
            .last_setup
            .map_or(true, |at| at.elapsed() >= self.setup_interval);
        if due {
            self.send_setup()?;
        }
        Ok(())
    }

    fn on_control(&mut self, datagram: &[u8]) {
        let Some((header, payload)) = FrameHeader::parse(datagram) else {
            self.counters.ignored += 1;
            return;
        };
        if header.kind() != FrameKind::Status
            || header.stream_id != self.stream_id
            || header.session_id != self.session_id
        {
            self.counters.ignored += 1;
            return;
        }

        if !self.live() {
            tracing::info!(
                channel = %self.channel,
                stream_id = self.stream_id,
                "Subscriber connected"
            );
        }
        if seq_after(header.sequence, self.consumed) || header.sequence == self.consumed {
            self.consumed = header.sequence;
        }
        if let Some(window) = frame::status_window(payload) {
            self.window = window.max(1);
        }
        self.last_status = Some(Instant::now());
        self.counters.status_messages += 1;
    }

    fn send_setup(&mut self) -> std::io::Result<()> {
        self.send_buf.clear();
        FrameHeader::setup(self.stream_id, self.session_id, self.next_sequence)
            .write_to(&mut self.send_buf);
        self.last_setup = Some(Instant::now());

        match self.socket.send(&self.send_buf) {
            Ok(_) => {
                self.counters.setup_messages += 1;
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::ConnectionRefused
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn fail(&mut self, e: std::io::Error) -> OfferResult {
        tracing::error!(
            channel = %self.channel,
            stream_id = self.stream_id,
            "Publication socket failed: {}",
            e
        );
        self.close();
        OfferResult::Closed
    }
}

impl Publication for UdpPublication {
    fn offer(&mut self, payload: &[u8]) -> OfferResult {
        if self.closed {
            return OfferResult::Closed;
        }
        if let Err(e) = self.service() {
            return self.fail(e);
        }
        if !self.live() {
            self.counters.not_connected += 1;
            return OfferResult::NotConnected;
        }

        let needed = fragment_count(payload.len(), self.mtu) as u32;
        let in_flight = self.next_sequence.wrapping_sub(self.consumed);
        if in_flight > 0 && in_flight.saturating_add(needed) > self.window {
            self.counters.back_pressured += 1;
            return OfferResult::BackPressured;
        }

        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(self.mtu).collect()
        };
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            self.send_buf.clear();
            FrameHeader::data(
                self.stream_id,
                self.session_id,
                self.next_sequence,
                chunk.len() as u16,
                i == 0,
                i == last,
            )
            .write_to(&mut self.send_buf);
            self.send_buf.extend_from_slice(chunk);

            match self.socket.send(&self.send_buf) {
                Ok(_) => {
                    self.next_sequence = self.next_sequence.wrapping_add(1);
                    self.counters.datagrams += 1;
                    self.counters.bytes += chunk.len() as u64;
                }
                // The whole message is offered again; the subscriber drops the
                // partial one when the next BEGIN arrives.
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    self.counters.admin_actions += 1;
                    return OfferResult::AdminAction;
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    self.last_status = None;
                    self.counters.not_connected += 1;
                    return OfferResult::NotConnected;
                }
                Err(e) => return self.fail(e),
            }
        }

        self.counters.messages += 1;
        OfferResult::Success
    }

    fn is_connected(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if let Err(e) = self.service() {
            self.fail(e);
            return false;
        }
        self.live()
    }

    fn channel(&self) -> String {
        self.channel.clone()
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match self.counters.write(&self.dir, "publisher") {
            Ok(path) => tracing::debug!("Publication counters written to {:?}", path),
            Err(e) => tracing::warn!("Failed to write publication counters: {}", e),
        }
        tracing::info!(
            channel = %self.channel,
            stream_id = self.stream_id,
            messages = self.counters.messages,
            "Publication closed"
        );
    }
}

impl Drop for UdpPublication {
    fn drop(&mut self) {
        self.close();
    }
}

// ==================== Subscription ====================

#[derive(Debug, Clone, Copy)]
struct Peer {
    addr: SocketAddr,
    session_id: i32,
    next_expected: u32,
    last_heard: Instant,
}

/// Receiving side of a UDP channel
#[derive(Debug)]
pub struct UdpSubscription {
    socket: UdpSocket,
    channel: String,
    stream_id: i32,
    dir: PathBuf,
    window: u32,
    liveness: Duration,
    status_interval: Duration,

    peer: Option<Peer>,
    /// Dropping fragments until the next message start
    resync: bool,
    last_status_sent: Option<Instant>,

    closed: bool,
    recv_buf: Vec<u8>,
    counters: TransportCounters,
}

impl UdpSubscription {
    /// Bind the channel endpoint
    pub fn bind(cfg: &TransportConfig) -> Result<Self> {
        let uri: ChannelUri = cfg.channel_uri()?;
        let channel = uri.to_string();
        let dir = prepare_dir(cfg, &channel)?;
        let fail =
            |e: std::io::Error| RelayError::transport(&channel, cfg.stream_id, e.to_string());

        let addr = uri.resolve()?;
        let socket = UdpSocket::bind(addr).map_err(fail)?;
        socket.set_nonblocking(true).map_err(fail)?;

        tracing::info!(
            channel = %channel,
            stream_id = cfg.stream_id,
            "Subscription bound to {}",
            socket.local_addr().map(|a| a.to_string()).unwrap_or_default()
        );

        Ok(Self {
            socket,
            channel: channel.clone(),
            stream_id: cfg.stream_id,
            dir,
            window: cfg.receiver_window.max(1),
            liveness: cfg.liveness_timeout(),
            status_interval: cfg.status_interval(),
            peer: None,
            resync: false,
            last_status_sent: None,
            closed: false,
            recv_buf: vec![0; RECV_BUFFER_LEN],
            counters: TransportCounters {
                channel,
                stream_id: cfg.stream_id,
                ..Default::default()
            },
        })
    }

    /// Address actually bound, useful when the endpoint port was 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    /// Adopt a new publisher session starting at `sequence`
    fn adopt(&mut self, from: SocketAddr, header: &FrameHeader) {
        tracing::info!(
            channel = %self.channel,
            stream_id = self.stream_id,
            session_id = header.session_id,
            "Publisher session {} from {}",
            header.session_id,
            from
        );
        self.peer = Some(Peer {
            addr: from,
            session_id: header.session_id,
            next_expected: header.sequence,
            last_heard: Instant::now(),
        });
        self.counters.session_id = header.session_id;
        self.resync = header.kind() == FrameKind::Data && !header.is_begin();
        self.last_status_sent = None;
    }

    fn send_status(&mut self) {
        let Some(peer) = self.peer else {
            return;
        };
        let datagram = frame::status_datagram(
            self.stream_id,
            peer.session_id,
            peer.next_expected,
            self.window,
        );
        match self.socket.send_to(&datagram, peer.addr) {
            Ok(_) => self.counters.status_messages += 1,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(e) => tracing::warn!("Failed to send status to {}: {}", peer.addr, e),
        }
        self.last_status_sent = Some(Instant::now());
    }

    /// Read datagrams until `fragment_limit` fragments were delivered or the
    /// socket is drained. Returns delivered fragments and whether any data
    /// datagram arrived.
    fn receive(
        &mut self,
        buf: &mut [u8],
        handler: &mut dyn FnMut(Fragment<'_>),
        fragment_limit: usize,
    ) -> Result<(usize, bool)> {
        let mut delivered = 0;
        let mut got_data = false;

        while delivered < fragment_limit {
            let (len, from) = match self.socket.recv_from(buf) {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e)
                    if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::ConnectionReset) =>
                {
                    continue
                }
                Err(e) => {
                    return Err(RelayError::transport(
                        &self.channel,
                        self.stream_id,
                        format!("Receive failed: {}", e),
                    ))
                }
            };

            let Some((header, payload)) = FrameHeader::parse(&buf[..len]) else {
                self.counters.ignored += 1;
                continue;
            };
            if header.stream_id != self.stream_id {
                tracing::trace!("Ignoring datagram for stream {}", header.stream_id);
                self.counters.ignored += 1;
                continue;
            }

            let known = self
                .peer
                .is_some_and(|p| p.session_id == header.session_id && p.addr == from);

            match header.kind() {
                FrameKind::Status => {
                    self.counters.ignored += 1;
                    continue;
                }
                FrameKind::Setup => {
                    if known {
                        self.on_setup(&header);
                    } else {
                        self.adopt(from, &header);
                    }
                    continue;
                }
                FrameKind::Data => {}
            }

            got_data = true;
            if !known {
                self.adopt(from, &header);
            }
            if !self.accept_sequence(&header) {
                continue;
            }

            self.counters.datagrams += 1;
            self.counters.bytes += payload.len() as u64;
            if header.is_end() {
                self.counters.messages += 1;
            }
            handler(Fragment::new(
                payload,
                0,
                payload.len(),
                header.is_begin(),
                header.is_end(),
            ));
            delivered += 1;
        }

        Ok((delivered, got_data))
    }

    /// Heartbeat from the current publisher
    fn on_setup(&mut self, header: &FrameHeader) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        peer.last_heard = Instant::now();

        // Setup carries the publisher's next sequence; anything before it
        // that never arrived is lost.
        if seq_after(header.sequence, peer.next_expected) {
            tracing::warn!(
                stream_id = self.stream_id,
                "Lost datagrams {}..{}",
                peer.next_expected,
                header.sequence
            );
            peer.next_expected = header.sequence;
            self.counters.gaps += 1;
            self.resync = true;
            self.last_status_sent = None;
        }
    }

    /// Track the data sequence; returns whether the fragment is delivered
    fn accept_sequence(&mut self, header: &FrameHeader) -> bool {
        let Some(peer) = self.peer.as_mut() else {
            return false;
        };
        peer.last_heard = Instant::now();

        if header.sequence != peer.next_expected {
            if seq_after(peer.next_expected, header.sequence) {
                // Duplicate or stale
                self.counters.ignored += 1;
                return false;
            }
            tracing::warn!(
                stream_id = self.stream_id,
                "Sequence gap: expected {}, got {}",
                peer.next_expected,
                header.sequence
            );
            self.counters.gaps += 1;
            self.resync = true;
        }
        peer.next_expected = header.sequence.wrapping_add(1);

        if header.is_begin() {
            self.resync = false;
        }
        if self.resync {
            self.counters.discarded += 1;
            return false;
        }
        true
    }
}

impl Subscription for UdpSubscription {
    fn poll(
        &mut self,
        handler: &mut dyn FnMut(Fragment<'_>),
        fragment_limit: usize,
    ) -> Result<usize> {
        if self.closed {
            return Err(RelayError::ChannelClosed {
                channel: self.channel.clone(),
                stream_id: self.stream_id,
            });
        }

        let mut buf = std::mem::take(&mut self.recv_buf);
        let received = self.receive(&mut buf, handler, fragment_limit);
        self.recv_buf = buf;
        let (delivered, got_data) = received?;

        let status_due = self
            .last_status_sent
            .map_or(true, |at| at.elapsed() >= self.status_interval);
        if self.is_connected() && (got_data || status_due) {
            self.send_status();
        }

        Ok(delivered)
    }

    fn is_connected(&self) -> bool {
        self.peer
            .is_some_and(|p| p.last_heard.elapsed() < self.liveness)
    }

    fn channel(&self) -> String {
        self.channel.clone()
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match self.counters.write(&self.dir, "subscriber") {
            Ok(path) => tracing::debug!("Subscription counters written to {:?}", path),
            Err(e) => tracing::warn!("Failed to write subscription counters: {}", e),
        }
        tracing::info!(
            channel = %self.channel,
            stream_id = self.stream_id,
            messages = self.counters.messages,
            gaps = self.counters.gaps,
            "Subscription closed"
        );
    }
}

impl Drop for UdpSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config(dir: &Path, channel: String) -> TransportConfig {
        TransportConfig {
            dir: Some(dir.to_path_buf()),
            channel,
            stream_id: 1001,
            setup_interval_ms: 5,
            status_interval_ms: 5,
            ..Default::default()
        }
    }

    /// Bind a subscriber on an ephemeral port and aim a publisher at it
    fn pair(dir: &Path, mtu: usize, window: u32) -> (UdpPublication, UdpSubscription) {
        let mut cfg = config(dir, "udp://127.0.0.1:0".into());
        cfg.receiver_window = window;
        let subscription = UdpSubscription::bind(&cfg).unwrap();
        let addr = subscription.local_addr().unwrap();
        let mut cfg = config(dir, format!("udp://{}", addr));
        cfg.mtu = mtu;
        let publication = UdpPublication::connect(&cfg).unwrap();
        (publication, subscription)
    }

    fn wait_connected(publication: &mut UdpPublication, subscription: &mut UdpSubscription) {
        for _ in 0..500 {
            subscription.poll(&mut |_| {}, 10).unwrap();
            if publication.is_connected() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("publication never connected");
    }

    fn drain(subscription: &mut UdpSubscription) -> Vec<(Vec<u8>, bool, bool)> {
        let mut out = Vec::new();
        for _ in 0..50 {
            subscription
                .poll(
                    &mut |f: Fragment<'_>| {
                        out.push((f.bytes().to_vec(), f.is_first(), f.is_final()))
                    },
                    100,
                )
                .unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        out
    }

    #[test]
    fn test_seq_after_wraps() {
        assert!(seq_after(1, 0));
        assert!(!seq_after(0, 0));
        assert!(!seq_after(0, 1));
        assert!(seq_after(0, u32::MAX));
    }

    #[test]
    #[serial]
    fn test_not_connected_without_subscriber_status() {
        let dir = tempfile::tempdir().unwrap();
        let (mut publication, _subscription) = pair(dir.path(), 1408, 128);
        // Nobody polls the subscription, so no status ever arrives
        assert_eq!(publication.offer(b"x"), OfferResult::NotConnected);
        assert!(!publication.is_connected());
    }

    #[test]
    #[serial]
    fn test_handshake_and_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let (mut publication, mut subscription) = pair(dir.path(), 1408, 128);
        wait_connected(&mut publication, &mut subscription);
        assert!(subscription.is_connected());

        assert_eq!(publication.offer(b"hello"), OfferResult::Success);
        let fragments = drain(&mut subscription);
        assert_eq!(fragments, vec![(b"hello".to_vec(), true, true)]);
    }

    #[test]
    #[serial]
    fn test_small_mtu_fragments_message() {
        let dir = tempfile::tempdir().unwrap();
        let (mut publication, mut subscription) = pair(dir.path(), 4, 128);
        wait_connected(&mut publication, &mut subscription);

        assert_eq!(publication.offer(b"0123456789"), OfferResult::Success);
        let fragments = drain(&mut subscription);
        assert_eq!(fragments.len(), 3);
        assert!(fragments[0].1 && !fragments[0].2);
        assert!(!fragments[2].1 && fragments[2].2);
        let joined: Vec<u8> = fragments.iter().flat_map(|f| f.0.clone()).collect();
        assert_eq!(joined, b"0123456789");
    }

    #[test]
    #[serial]
    fn test_window_back_pressure() {
        let dir = tempfile::tempdir().unwrap();
        let (mut publication, mut subscription) = pair(dir.path(), 1408, 2);
        wait_connected(&mut publication, &mut subscription);

        assert_eq!(publication.offer(b"a"), OfferResult::Success);
        assert_eq!(publication.offer(b"b"), OfferResult::Success);
        assert_eq!(publication.offer(b"c"), OfferResult::BackPressured);

        // Subscriber consumes and reports its position
        drain(&mut subscription);
        let mut result = OfferResult::BackPressured;
        for _ in 0..200 {
            result = publication.offer(b"c");
            if result == OfferResult::Success {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(result, OfferResult::Success);
    }

    #[test]
    #[serial]
    fn test_close_writes_counters() {
        let dir = tempfile::tempdir().unwrap();
        let (mut publication, mut subscription) = pair(dir.path(), 1408, 128);
        wait_connected(&mut publication, &mut subscription);
        assert_eq!(publication.offer(b"abc"), OfferResult::Success);
        drain(&mut subscription);

        publication.close();
        assert_eq!(publication.offer(b"abc"), OfferResult::Closed);
        subscription.close();

        let sent = TransportCounters::read(counters_path(dir.path(), "publisher", 1001)).unwrap();
        assert_eq!(sent.messages, 1);
        assert_eq!(sent.bytes, 3);

        let received =
            TransportCounters::read(counters_path(dir.path(), "subscriber", 1001)).unwrap();
        assert_eq!(received.messages, 1);
        assert_eq!(received.session_id, sent.session_id);
    }

    #[test]
    #[serial]
    fn test_foreign_stream_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut subscription =
            UdpSubscription::bind(&config(dir.path(), "udp://127.0.0.1:0".into())).unwrap();
        let addr = subscription.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut datagram = Vec::new();
        FrameHeader::data(42, 1, 0, 1, true, true).write_to(&mut datagram);
        datagram.push(b'x');
        socket.send_to(&datagram, addr).unwrap();

        let fragments = drain(&mut subscription);
        assert!(fragments.is_empty());
        assert_eq!(subscription.counters().ignored, 1);
    }

    #[test]
    #[serial]
    fn test_gap_drops_until_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut subscription =
            UdpSubscription::bind(&config(dir.path(), "udp://127.0.0.1:0".into())).unwrap();
        let addr = subscription.local_addr().unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();

        let send = |seq: u32, begin: bool, end: bool, body: &[u8]| {
            let mut datagram = Vec::new();
            FrameHeader::data(1001, 7, seq, body.len() as u16, begin, end).write_to(&mut datagram);
            datagram.extend_from_slice(body);
            socket.send_to(&datagram, addr).unwrap();
        };

        send(0, true, false, b"ab");
        // seq 1 lost
        send(2, false, true, b"ef");
        send(3, true, true, b"gh");

        let fragments = drain(&mut subscription);
        let bodies: Vec<&[u8]> = fragments.iter().map(|f| f.0.as_slice()).collect();
        assert_eq!(bodies, vec![&b"ab"[..], &b"gh"[..]]);
        assert_eq!(subscription.counters().gaps, 1);
        assert_eq!(subscription.counters().discarded, 1);
    }
}
