//! # Command Adapter Module
//!
//! Request/reply surface exposed to the external pairing layer (the
//! short-range link a phone talks to). One ASCII request line in, exactly
//! one reply line out, both pipe-delimited and bounded to one transfer.
//!
//! | Request | Reply |
//! |---|---|
//! | `WHOAMI` | `OK\|WHOAMI\|<id>\|<name>` |
//! | `STATUS` | `OK\|STATUS\|<id>\|<name>\|<leader>\|<seed>\|<seq>\|<ch>\|<freq>` |
//! | `NAME\|<newname>` | `OK\|NAME\|<sanitized>` |
//! | `SEND\|<dst>\|<text>` | `OK\|SEND\|queued` or an error |
//! | `HISTCOUNT` | `OK\|HISTCOUNT\|<n>` |
//! | `HISTGET\|<idx>` | `OK\|HIST\|…\|<body_hex>` or `ERR\|HIST\|range` |
//!
//! Anything else answers `ERR|CMD|unknown`.

use core::fmt::{self, Write};

use crate::frame::parse_hex_u16;
use crate::hop::channel_freq_mhz;
use crate::node::NodeCore;

/// Upper bound for one pairing-link transfer (request or reply).
pub const MAX_LINK_FRAME: usize = 256;

/// One pairing-link transfer: a bounded ASCII line.
#[derive(Clone)]
pub struct LinkFrame {
    pub data: [u8; MAX_LINK_FRAME],
    pub length: usize,
}

impl LinkFrame {
    pub const fn new() -> Self {
        Self {
            data: [0u8; MAX_LINK_FRAME],
            length: 0,
        }
    }

    /// Copies `bytes` in, truncating at the transfer limit.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut frame = Self::new();
        let take = bytes.len().min(MAX_LINK_FRAME);
        frame.data[..take].copy_from_slice(&bytes[..take]);
        frame.length = take;
        frame
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl Default for LinkFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for LinkFrame {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.length + bytes.len() > MAX_LINK_FRAME {
            return Err(fmt::Error);
        }
        self.data[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }
}

#[cfg(feature = "std")]
impl core::fmt::Debug for LinkFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkFrame({:?})", self.as_str())
    }
}

/// Handles one request line against the node state and returns the reply.
pub fn handle_command(core: &mut NodeCore, request: &[u8], now: u32) -> LinkFrame {
    let mut reply = LinkFrame::new();
    let Ok(text) = core::str::from_utf8(request) else {
        let _ = reply.write_str("ERR|CMD|unknown");
        return reply;
    };

    if text == "WHOAMI" {
        let identity = core.identity();
        let _ = write!(reply, "OK|WHOAMI|{:04X}|{}", identity.node_id(), identity.name());
        return reply;
    }

    if text == "STATUS" {
        let channel = core.hop().current_channel();
        let _ = write!(
            reply,
            "OK|STATUS|{:04X}|{}|{:04X}|{:08X}|{}|{}|{:.1}",
            core.identity().node_id(),
            core.identity().name(),
            core.leader_id(now),
            core.identity().hop_seed(),
            core.hop().last_applied_seq(),
            channel,
            channel_freq_mhz(channel)
        );
        return reply;
    }

    if let Some(new_name) = text.strip_prefix("NAME|") {
        core.set_name(new_name);
        let _ = write!(reply, "OK|NAME|{}", core.identity().name());
        return reply;
    }

    if let Some(rest) = text.strip_prefix("SEND|") {
        let mut parts = rest.splitn(2, '|');
        let dst = parts.next().and_then(parse_hex_u16);
        let body = parts.next().filter(|body| !body.is_empty());
        match (dst, body) {
            (Some(dst), Some(body)) => match core.queue_message(dst, body, now) {
                Ok(_) => {
                    let _ = reply.write_str("OK|SEND|queued");
                }
                Err(_) => {
                    let _ = reply.write_str("ERR|SEND|queue_full");
                }
            },
            _ => {
                let _ = reply.write_str("ERR|SEND|format");
            }
        }
        return reply;
    }

    if text == "HISTCOUNT" {
        let _ = write!(reply, "OK|HISTCOUNT|{}", core.history().len());
        return reply;
    }

    if let Some(index_text) = text.strip_prefix("HISTGET|") {
        let entry = index_text.parse::<usize>().ok().and_then(|index| core.history().get(index));
        match entry {
            Some(entry) => {
                let _ = write!(
                    reply,
                    "OK|HIST|{}|{}|{:04X}|{}|{}|{}|{}|",
                    index_text,
                    entry.direction.as_char(),
                    entry.peer,
                    entry.msg_id,
                    entry.vital as u8,
                    entry.intent.as_str(),
                    entry.urgency
                );
                for &byte in entry.body.as_bytes() {
                    let _ = write!(reply, "{:02X}", byte);
                }
            }
            None => {
                let _ = reply.write_str("ERR|HIST|range");
            }
        }
        return reply;
    }

    let _ = reply.write_str("ERR|CMD|unknown");
    reply
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn node() -> NodeCore {
        NodeCore::new(0x0001, false, 1, 0)
    }

    fn run(core: &mut NodeCore, request: &str) -> String {
        handle_command(core, request.as_bytes(), 1_000).as_str().to_string()
    }

    #[test]
    fn whoami_reports_identity() {
        let mut core = node();
        assert_eq!(run(&mut core, "WHOAMI"), "OK|WHOAMI|0001|Node-0001");
    }

    #[test]
    fn status_has_all_fields() {
        let mut core = node();
        let reply = run(&mut core, "STATUS");
        let fields: Vec<&str> = reply.split('|').collect();
        assert_eq!(fields.len(), 9);
        assert_eq!(fields[0], "OK");
        assert_eq!(fields[1], "STATUS");
        assert_eq!(fields[2], "0001");
        // Own node is leader until anyone else is heard.
        assert_eq!(fields[4], "0001");
        assert_eq!(fields[5].len(), 8);
        assert!(fields[8].contains('.'));
    }

    #[test]
    fn name_is_sanitized() {
        let mut core = node();
        assert_eq!(run(&mut core, "NAME|base|one;two:3"), "OK|NAME|base_one_two_3");
        assert_eq!(run(&mut core, "WHOAMI"), "OK|WHOAMI|0001|base_one_two_3");
    }

    #[test]
    fn send_queues_and_validates() {
        let mut core = node();
        assert_eq!(run(&mut core, "SEND|0002|hello out there"), "OK|SEND|queued");
        assert!(core.has_pending_tx());
        assert_eq!(run(&mut core, "SEND|0002"), "ERR|SEND|format");
        assert_eq!(run(&mut core, "SEND|zz|hello"), "ERR|SEND|format");
        assert_eq!(run(&mut core, "SEND|0002|"), "ERR|SEND|format");
    }

    #[test]
    fn send_reports_queue_full() {
        let mut core = node();
        let mut last = String::new();
        for _ in 0..crate::MAX_TX_QUEUE + 1 {
            last = run(&mut core, "SEND|0002|hello out there");
        }
        assert_eq!(last, "ERR|SEND|queue_full");
    }

    #[test]
    fn history_lookup_and_range() {
        let mut core = node();
        assert_eq!(run(&mut core, "HISTCOUNT"), "OK|HISTCOUNT|0");
        let _ = run(&mut core, "SEND|0002|hi");
        assert_eq!(run(&mut core, "HISTCOUNT"), "OK|HISTCOUNT|1");
        let reply = run(&mut core, "HISTGET|0");
        assert!(reply.starts_with("OK|HIST|0|S|0002|1|0|CHAT|0|"));
        // "hi" as uppercase hex
        assert!(reply.ends_with("6869"));
        assert_eq!(run(&mut core, "HISTGET|5"), "ERR|HIST|range");
        assert_eq!(run(&mut core, "HISTGET|x"), "ERR|HIST|range");
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut core = node();
        assert_eq!(run(&mut core, "REBOOT"), "ERR|CMD|unknown");
        assert_eq!(run(&mut core, ""), "ERR|CMD|unknown");
    }
}
