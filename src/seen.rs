//! Duplicate suppression for flooded frames.
//!
//! A sliding set of `(kind, origin, msg_id)` keys. Entries age out lazily on
//! lookup after `MEMBERSHIP_TIMEOUT_MS`; when the table is full the oldest
//! entry is replaced. The node also records its own transmissions here so a
//! frame echoed back by a neighbor is never processed twice.

use crate::frame::FrameKind;
use crate::MEMBERSHIP_TIMEOUT_MS;

#[derive(Clone, Copy)]
struct SeenEntry {
    kind: FrameKind,
    origin: u16,
    msg_id: u16,
    seen_at: u32,
}

pub struct SeenTable<const CAP: usize> {
    slots: [Option<SeenEntry>; CAP],
}

impl<const CAP: usize> SeenTable<CAP> {
    pub const fn new() -> Self {
        Self {
            slots: [None; CAP],
        }
    }

    /// Checks whether `(kind, origin, msg_id)` was already observed inside
    /// the suppression window, recording it if not.
    ///
    /// Returns true for a duplicate. Expired entries are dropped before the
    /// match so a key can be processed again once per window.
    pub fn see(&mut self, kind: FrameKind, origin: u16, msg_id: u16, now: u32) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot {
                if now.wrapping_sub(entry.seen_at) > MEMBERSHIP_TIMEOUT_MS {
                    *slot = None;
                    continue;
                }
                if entry.kind == kind && entry.origin == origin && entry.msg_id == msg_id {
                    return true;
                }
            }
        }

        let entry = SeenEntry {
            kind,
            origin,
            msg_id,
            seen_at: now,
        };

        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(entry);
            return false;
        }

        // Table full: replace the entry observed longest ago.
        let mut oldest_index = 0;
        let mut oldest_age = 0u32;
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(existing) = slot {
                let age = now.wrapping_sub(existing.seen_at);
                if age >= oldest_age {
                    oldest_age = age;
                    oldest_index = i;
                }
            }
        }
        self.slots[oldest_index] = Some(entry);
        false
    }

    /// Records a locally originated frame so the node ignores its own
    /// retransmissions. The duplicate verdict is irrelevant here.
    pub fn mark_local(&mut self, kind: FrameKind, origin: u16, msg_id: u16, now: u32) {
        let _ = self.see(kind, origin, msg_id, now);
    }
}

impl<const CAP: usize> Default for SeenTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn second_observation_is_duplicate() {
        let mut table: SeenTable<8> = SeenTable::new();
        assert!(!table.see(FrameKind::Data, 0x0001, 42, 1_000));
        assert!(table.see(FrameKind::Data, 0x0001, 42, 1_500));
    }

    #[test]
    fn keys_are_distinguished_by_all_three_fields() {
        let mut table: SeenTable<8> = SeenTable::new();
        assert!(!table.see(FrameKind::Data, 0x0001, 42, 0));
        assert!(!table.see(FrameKind::Ack, 0x0001, 42, 0));
        assert!(!table.see(FrameKind::Data, 0x0002, 42, 0));
        assert!(!table.see(FrameKind::Data, 0x0001, 43, 0));
    }

    #[test]
    fn entries_expire_after_window() {
        let mut table: SeenTable<8> = SeenTable::new();
        assert!(!table.see(FrameKind::Data, 0x0001, 42, 0));
        assert!(!table.see(FrameKind::Data, 0x0001, 42, MEMBERSHIP_TIMEOUT_MS + 1));
    }

    #[test]
    fn full_table_replaces_oldest() {
        let mut table: SeenTable<4> = SeenTable::new();
        for i in 0..4u16 {
            assert!(!table.see(FrameKind::Data, 0x0001, i, 100 + i as u32));
        }
        // Pushes out msg_id 0, the oldest entry.
        assert!(!table.see(FrameKind::Data, 0x0001, 99, 200));
        assert!(!table.see(FrameKind::Data, 0x0001, 0, 201));
        assert!(table.see(FrameKind::Data, 0x0001, 3, 202));
    }

    #[test]
    fn mark_local_suppresses_own_frames() {
        let mut table: SeenTable<8> = SeenTable::new();
        table.mark_local(FrameKind::Data, 0x0001, 7, 0);
        assert!(table.see(FrameKind::Data, 0x0001, 7, 10));
    }

    #[test]
    fn wrapping_clock_is_tolerated() {
        let mut table: SeenTable<4> = SeenTable::new();
        let near_wrap = u32::MAX - 100;
        assert!(!table.see(FrameKind::Data, 0x0001, 1, near_wrap));
        // Clock wrapped; entry is still inside the window.
        assert!(table.see(FrameKind::Data, 0x0001, 1, 500));
    }
}
