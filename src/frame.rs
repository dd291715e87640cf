//! # Frame Codec Module
//!
//! ASCII wire frames for the mesh protocol. Three frame types share a
//! pipe-delimited layout with no escaping:
//!
//! - `H|<from>|<seq>|<seed>|<name>|<ttl>|<hops>|G <gossip>` — heartbeat with
//!   piggybacked gossip entries (`id:name:seq:hops`, `;`-separated)
//! - `D|<from>|<origin>|<dst>|<msg_id>|<ttl>|<hops>|<body>` — flooded unicast
//! - `A|<from>|<origin>|<dst>|<msg_id>|<ttl>|<hops>` — delivery acknowledgement
//!
//! The DATA body is everything after the sixth separator and may itself
//! contain `|`; it is never re-tokenized. Node ids are uppercase hex4, the
//! hop seed is hex8, all other integers are decimal.
//!
//! ## Design Considerations
//!
//! - `FrameBuf` is a fixed wire buffer with public `data`/`length` fields so
//!   the radio path can hand it to the modem without copying.
//! - Encoding goes through `core::fmt::Write`; an encoder that would exceed
//!   the frame size fails cleanly instead of truncating mid-field.
//! - A frame with a missing or unparseable required field is rejected as a
//!   whole; a malformed *gossip entry* only skips that entry.

use core::fmt::{self, Write};

/// Maximum wire frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 220;

/// Maximum node name length in bytes. Names never contain `|`, `:` or `;`.
pub const MAX_NAME_LEN: usize = 23;

/// Maximum gossip entries carried in one heartbeat (including self).
pub const MAX_GOSSIP_ENTRIES: usize = 12;

/// Packet classes used for duplicate suppression and dispatch.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum FrameKind {
    Heartbeat,
    Data,
    Ack,
}

/// Errors produced by the frame codec
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum FrameError {
    /// Encoded frame would exceed `MAX_FRAME_SIZE`
    Overflow,
    /// Not UTF-8, or not a recognized frame type
    Malformed,
    /// A required field is missing or failed to parse
    BadField,
}

/// Fixed-size wire buffer holding one encoded frame.
///
/// The `data` and `length` fields are intentionally public so the radio
/// path can transmit the bytes in place.
#[derive(Clone)]
pub struct FrameBuf {
    /// Raw frame bytes
    pub data: [u8; MAX_FRAME_SIZE],
    /// Number of valid bytes in `data`
    pub length: usize,
}

impl FrameBuf {
    pub const fn new() -> Self {
        FrameBuf {
            data: [0u8; MAX_FRAME_SIZE],
            length: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// View as `&str`. Frames built by this codec are always ASCII.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for FrameBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.length + bytes.len() > MAX_FRAME_SIZE {
            return Err(fmt::Error);
        }
        self.data[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }
}

#[cfg(feature = "std")]
impl core::fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameBuf({:?})", self.as_str())
    }
}

/// One gossip entry as read off the wire.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct WireGossipEntry<'a> {
    pub node_id: u16,
    pub name: &'a str,
    pub seq: u32,
    pub hops_away: u8,
}

/// One gossip entry staged for transmission.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct GossipRecord {
    pub node_id: u16,
    pub name: heapless::String<MAX_NAME_LEN>,
    pub seq: u32,
    pub hops_away: u8,
}

/// Iterator over the gossip section of a received heartbeat.
///
/// Entries that fail to parse are skipped rather than failing the frame.
#[derive(Clone)]
pub struct GossipIter<'a> {
    entries: core::str::Split<'a, char>,
}

impl<'a> Iterator for GossipIter<'a> {
    type Item = WireGossipEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for raw in self.entries.by_ref() {
            if raw.is_empty() {
                continue;
            }
            let mut fields = raw.split(':');
            let id = fields.next().and_then(parse_hex_u16);
            let name = fields.next();
            let seq = fields.next().and_then(parse_dec_u32);
            let hops = fields.next().and_then(parse_dec_u8);
            if fields.next().is_some() {
                continue;
            }
            if let (Some(node_id), Some(name), Some(seq), Some(hops_away)) = (id, name, seq, hops) {
                if name.len() <= MAX_NAME_LEN {
                    return Some(WireGossipEntry {
                        node_id,
                        name,
                        seq,
                        hops_away,
                    });
                }
            }
        }
        None
    }
}

/// A parsed wire frame, borrowing from the receive buffer.
pub enum Frame<'a> {
    Heartbeat {
        from: u16,
        seq: u32,
        seed: u32,
        name: &'a str,
        ttl: u8,
        hops: u8,
        gossip: GossipIter<'a>,
    },
    Data {
        from: u16,
        origin: u16,
        dst: u16,
        msg_id: u16,
        ttl: u8,
        hops: u8,
        body: &'a str,
    },
    Ack {
        from: u16,
        origin: u16,
        dst: u16,
        msg_id: u16,
        ttl: u8,
        hops: u8,
    },
}

impl<'a> Frame<'a> {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Heartbeat { .. } => FrameKind::Heartbeat,
            Frame::Data { .. } => FrameKind::Data,
            Frame::Ack { .. } => FrameKind::Ack,
        }
    }
}

pub(crate) fn parse_hex_u16(s: &str) -> Option<u16> {
    if s.is_empty() {
        return None;
    }
    u16::from_str_radix(s, 16).ok()
}

pub(crate) fn parse_hex_u32(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

pub(crate) fn parse_dec_u32(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    s.parse::<u32>().ok()
}

pub(crate) fn parse_dec_u16(s: &str) -> Option<u16> {
    if s.is_empty() {
        return None;
    }
    s.parse::<u16>().ok()
}

pub(crate) fn parse_dec_u8(s: &str) -> Option<u8> {
    if s.is_empty() {
        return None;
    }
    s.parse::<u8>().ok()
}

/// Parses one received frame.
///
/// Returns an error for anything that is not a complete, well-formed frame;
/// the caller drops such frames silently.
pub fn parse(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    let text = core::str::from_utf8(bytes).map_err(|_| FrameError::Malformed)?;
    let mut parts = text.splitn(8, '|');
    let kind = parts.next().ok_or(FrameError::Malformed)?;

    match kind {
        "H" => {
            let from = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let seq = parts.next().and_then(parse_dec_u32).ok_or(FrameError::BadField)?;
            let seed = parts.next().and_then(parse_hex_u32).ok_or(FrameError::BadField)?;
            let name = parts.next().ok_or(FrameError::BadField)?;
            let ttl = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            let hops = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            let rest = parts.next().ok_or(FrameError::BadField)?;
            let gossip = match rest.strip_prefix("G ") {
                Some(section) => section,
                None if rest == "G" => "",
                None => return Err(FrameError::BadField),
            };
            if name.len() > MAX_NAME_LEN {
                return Err(FrameError::BadField);
            }
            Ok(Frame::Heartbeat {
                from,
                seq,
                seed,
                name,
                ttl,
                hops,
                gossip: GossipIter {
                    entries: gossip.split(';'),
                },
            })
        }
        "D" => {
            let from = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let origin = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let dst = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let msg_id = parts.next().and_then(parse_dec_u16).ok_or(FrameError::BadField)?;
            let ttl = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            let hops = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            let body = parts.next().ok_or(FrameError::BadField)?;
            Ok(Frame::Data {
                from,
                origin,
                dst,
                msg_id,
                ttl,
                hops,
                body,
            })
        }
        "A" => {
            let from = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let origin = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let dst = parts.next().and_then(parse_hex_u16).ok_or(FrameError::BadField)?;
            let msg_id = parts.next().and_then(parse_dec_u16).ok_or(FrameError::BadField)?;
            let ttl = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            let hops = parts.next().and_then(parse_dec_u8).ok_or(FrameError::BadField)?;
            if parts.next().is_some() {
                return Err(FrameError::BadField);
            }
            Ok(Frame::Ack {
                from,
                origin,
                dst,
                msg_id,
                ttl,
                hops,
            })
        }
        _ => Err(FrameError::Malformed),
    }
}

/// Encodes a heartbeat frame.
///
/// Gossip records are appended freshest-first until either the entry cap or
/// the frame size limit is reached; a record that does not fit is rolled
/// back and the remainder dropped.
pub fn encode_heartbeat(from: u16, seq: u32, seed: u32, name: &str, ttl: u8, hops: u8, gossip: &[GossipRecord]) -> FrameBuf {
    let mut buf = FrameBuf::new();
    // Header cannot overflow: worst case is well under the frame size.
    let _ = write!(buf, "H|{:04X}|{}|{:08X}|{}|{}|{}|G ", from, seq, seed, name, ttl, hops);
    let mut first = true;
    for record in gossip.iter().take(MAX_GOSSIP_ENTRIES) {
        let mark = buf.length;
        let sep = if first { "" } else { ";" };
        if write!(
            buf,
            "{}{:04X}:{}:{}:{}",
            sep, record.node_id, record.name, record.seq, record.hops_away
        )
        .is_err()
        {
            buf.length = mark;
            break;
        }
        first = false;
    }
    buf
}

/// Encodes a DATA frame. Fails if the body pushes the frame past the size limit.
pub fn encode_data(from: u16, origin: u16, dst: u16, msg_id: u16, ttl: u8, hops: u8, body: &str) -> Result<FrameBuf, FrameError> {
    let mut buf = FrameBuf::new();
    write!(buf, "D|{:04X}|{:04X}|{:04X}|{}|{}|{}|{}", from, origin, dst, msg_id, ttl, hops, body).map_err(|_| FrameError::Overflow)?;
    Ok(buf)
}

/// Encodes an ACK frame.
pub fn encode_ack(from: u16, origin: u16, dst: u16, msg_id: u16, ttl: u8, hops: u8) -> Result<FrameBuf, FrameError> {
    let mut buf = FrameBuf::new();
    write!(buf, "A|{:04X}|{:04X}|{:04X}|{}|{}|{}", from, origin, dst, msg_id, ttl, hops).map_err(|_| FrameError::Overflow)?;
    Ok(buf)
}
