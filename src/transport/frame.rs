//! Datagram header for the UDP transport
//!
//! Every datagram starts with a fixed 16-byte big-endian header:
//!
//! ```text
//!  0       1       2               4               8              12              16
//!  +-------+-------+---------------+---------------+---------------+---------------+
//!  |version| flags |  payload len  |   stream id   |  session id   |   sequence    |
//!  +-------+-------+---------------+---------------+---------------+---------------+
//! ```
//!
//! Data datagrams carry BEGIN and/or END flags and a payload of
//! `payload len` bytes. STATUS datagrams flow back from the subscriber; their
//! sequence is the next data sequence it expects and their 4-byte payload is
//! the receiver window in datagrams. SETUP datagrams have no payload and
//! announce a publisher session.

pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;

pub const FLAG_BEGIN: u8 = 0x80;
pub const FLAG_END: u8 = 0x40;
pub const FLAG_STATUS: u8 = 0x20;
pub const FLAG_SETUP: u8 = 0x10;

/// Decoded datagram header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub length: u16,
    pub stream_id: i32,
    pub session_id: i32,
    pub sequence: u32,
}

/// What a datagram is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Status,
    Setup,
}

impl FrameHeader {
    pub fn data(
        stream_id: i32,
        session_id: i32,
        sequence: u32,
        length: u16,
        begin: bool,
        end: bool,
    ) -> Self {
        let mut flags = 0;
        if begin {
            flags |= FLAG_BEGIN;
        }
        if end {
            flags |= FLAG_END;
        }
        Self {
            flags,
            length,
            stream_id,
            session_id,
            sequence,
        }
    }

    pub fn status(stream_id: i32, session_id: i32, next_expected: u32) -> Self {
        Self {
            flags: FLAG_STATUS,
            length: 4,
            stream_id,
            session_id,
            sequence: next_expected,
        }
    }

    pub fn setup(stream_id: i32, session_id: i32, next_sequence: u32) -> Self {
        Self {
            flags: FLAG_SETUP,
            length: 0,
            stream_id,
            session_id,
            sequence: next_sequence,
        }
    }

    pub fn kind(&self) -> FrameKind {
        if self.flags & FLAG_STATUS != 0 {
            FrameKind::Status
        } else if self.flags & FLAG_SETUP != 0 {
            FrameKind::Setup
        } else {
            FrameKind::Data
        }
    }

    pub fn is_begin(&self) -> bool {
        self.flags & FLAG_BEGIN != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & FLAG_END != 0
    }

    /// Append the encoded header to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(VERSION);
        out.push(self.flags);
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.stream_id.to_be_bytes());
        out.extend_from_slice(&self.session_id.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
    }

    /// Parse a header, returning it with the payload slice
    ///
    /// Returns `None` for truncated datagrams, unknown versions, or a
    /// payload length that overruns the datagram.
    pub fn parse(datagram: &[u8]) -> Option<(FrameHeader, &[u8])> {
        if datagram.len() < HEADER_LEN || datagram[0] != VERSION {
            return None;
        }

        let be_i32 = |at: usize| {
            i32::from_be_bytes([datagram[at], datagram[at + 1], datagram[at + 2], datagram[at + 3]])
        };

        let header = FrameHeader {
            flags: datagram[1],
            length: u16::from_be_bytes([datagram[2], datagram[3]]),
            stream_id: be_i32(4),
            session_id: be_i32(8),
            sequence: be_i32(12) as u32,
        };

        let end = HEADER_LEN + header.length as usize;
        if end > datagram.len() {
            return None;
        }

        Some((header, &datagram[HEADER_LEN..end]))
    }
}

/// Encode a complete status datagram
pub fn status_datagram(
    stream_id: i32,
    session_id: i32,
    next_expected: u32,
    window: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4);
    FrameHeader::status(stream_id, session_id, next_expected).write_to(&mut out);
    out.extend_from_slice(&window.to_be_bytes());
    out
}

/// Read the receiver window from a status payload
pub fn status_window(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}
