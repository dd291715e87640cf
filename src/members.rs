//! # Membership Table Module
//!
//! Fixed-capacity table of known mesh peers, maintained epidemically:
//! directly heard neighbors are upserted at one hop, everything further away
//! arrives as gossip piggybacked on heartbeats. Entries are never deleted
//! explicitly; a peer silently drops out of every query once it ages past
//! the membership timeout.
//!
//! A gossip entry only wins over current knowledge when it carries a newer
//! heartbeat sequence, or the same sequence over a strictly shorter path.
//! This keeps hop distances converging to graph distance while tolerating
//! duplicated and reordered floods.

use crate::frame::{GossipRecord, WireGossipEntry, MAX_GOSSIP_ENTRIES, MAX_NAME_LEN};
use crate::MEMBERSHIP_TIMEOUT_MS;

/// Fallback display name until a peer introduces itself.
const UNKNOWN_NAME: &str = "unknown";

/// One known peer.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct MemberEntry {
    pub node_id: u16,
    pub last_seen_at: u32,
    pub last_heartbeat_seq: u32,
    pub hop_seed: u32,
    /// 1 = heard directly, >=2 = learned via gossip
    pub hops_away: u8,
    /// Direct neighbor this route was learned from
    pub via_node: u16,
    pub name: heapless::String<MAX_NAME_LEN>,
}

impl MemberEntry {
    pub fn is_live(&self, now: u32) -> bool {
        now.wrapping_sub(self.last_seen_at) <= MEMBERSHIP_TIMEOUT_MS
    }
}

pub struct MemberTable<const CAP: usize> {
    slots: [Option<MemberEntry>; CAP],
}

impl<const CAP: usize> MemberTable<CAP> {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; CAP],
        }
    }

    pub fn get(&self, node_id: u16) -> Option<&MemberEntry> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .find(|entry| entry.node_id == node_id)
    }

    fn get_mut(&mut self, node_id: u16) -> Option<&mut MemberEntry> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut())
            .find(|entry| entry.node_id == node_id)
    }

    /// Claims a slot for a new entry: first free slot, else a slot whose
    /// occupant has aged out. Returns None when every slot holds a live peer.
    fn claim_slot(&mut self, now: u32) -> Option<&mut Option<MemberEntry>> {
        let mut candidate: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                None => {
                    candidate = Some(i);
                    break;
                }
                Some(entry) if !entry.is_live(now) && candidate.is_none() => {
                    candidate = Some(i);
                }
                Some(_) => {}
            }
        }
        candidate.map(move |i| &mut self.slots[i])
    }

    fn insert(&mut self, entry: MemberEntry, now: u32) {
        if let Some(slot) = self.claim_slot(now) {
            *slot = Some(entry);
        }
    }

    /// Upserts the transmitting peer of a received frame.
    ///
    /// A directly heard peer is always one hop away. Sequence, seed and name
    /// only update when actually carried by the frame (non-zero / non-empty).
    pub fn upsert_direct(&mut self, self_id: u16, from: u16, heartbeat_seq: u32, hop_seed: u32, name: &str, now: u32) {
        if from == self_id {
            return;
        }
        if let Some(entry) = self.get_mut(from) {
            entry.last_seen_at = now;
            entry.hops_away = 1;
            entry.via_node = from;
            if heartbeat_seq != 0 {
                entry.last_heartbeat_seq = heartbeat_seq;
            }
            if hop_seed != 0 {
                entry.hop_seed = hop_seed;
            }
            if !name.is_empty() {
                entry.name.clear();
                let _ = entry.name.push_str(name);
            }
            return;
        }

        let mut stored_name: heapless::String<MAX_NAME_LEN> = heapless::String::new();
        let _ = stored_name.push_str(if name.is_empty() { UNKNOWN_NAME } else { name });
        self.insert(
            MemberEntry {
                node_id: from,
                last_seen_at: now,
                last_heartbeat_seq: heartbeat_seq,
                hop_seed,
                hops_away: 1,
                via_node: from,
                name: stored_name,
            },
            now,
        );
    }

    /// Merges one gossip entry heard from `sender`.
    pub fn merge_gossip(&mut self, self_id: u16, sender: u16, gossip: &WireGossipEntry<'_>, now: u32) {
        if gossip.node_id == self_id {
            return;
        }
        let new_hops = gossip.hops_away.saturating_add(1);

        if let Some(entry) = self.get_mut(gossip.node_id) {
            let newer = entry.last_heartbeat_seq < gossip.seq;
            let shorter = entry.last_heartbeat_seq == gossip.seq && entry.hops_away > new_hops;
            if !(newer || shorter) {
                return;
            }
            entry.last_seen_at = now;
            entry.last_heartbeat_seq = gossip.seq;
            entry.hops_away = new_hops;
            entry.via_node = sender;
            if !gossip.name.is_empty() {
                entry.name.clear();
                let _ = entry.name.push_str(gossip.name);
            }
            return;
        }

        let mut stored_name: heapless::String<MAX_NAME_LEN> = heapless::String::new();
        let _ = stored_name.push_str(if gossip.name.is_empty() { UNKNOWN_NAME } else { gossip.name });
        self.insert(
            MemberEntry {
                node_id: gossip.node_id,
                last_seen_at: now,
                last_heartbeat_seq: gossip.seq,
                hop_seed: 0,
                hops_away: new_hops,
                via_node: sender,
                name: stored_name,
            },
            now,
        );
    }

    /// Refreshes the origin of a relayed DATA/ACK frame.
    ///
    /// The origin is not a direct neighbor, so an absent entry is created at
    /// the distance implied by the frame's hop counter instead of one hop.
    pub fn touch_origin(&mut self, self_id: u16, origin: u16, via: u16, frame_hops: u8, now: u32) {
        if origin == self_id {
            return;
        }
        if let Some(entry) = self.get_mut(origin) {
            entry.last_seen_at = now;
            return;
        }
        let mut stored_name: heapless::String<MAX_NAME_LEN> = heapless::String::new();
        let _ = stored_name.push_str(UNKNOWN_NAME);
        self.insert(
            MemberEntry {
                node_id: origin,
                last_seen_at: now,
                last_heartbeat_seq: 0,
                hop_seed: 0,
                hops_away: frame_hops.saturating_add(1).max(1),
                via_node: via,
                name: stored_name,
            },
            now,
        );
    }

    pub fn live_entries(&self, now: u32) -> impl Iterator<Item = &MemberEntry> {
        self.slots.iter().filter_map(|slot| slot.as_ref()).filter(move |entry| entry.is_live(now))
    }

    /// Collects live peer ids into `out`, returning the count.
    pub fn collect_active(&self, now: u32, out: &mut [u16]) -> usize {
        let mut count = 0;
        for entry in self.live_entries(now) {
            if count >= out.len() {
                break;
            }
            out[count] = entry.node_id;
            count += 1;
        }
        count
    }

    pub fn live_count(&self, now: u32) -> usize {
        self.live_entries(now).count()
    }

    /// The hop leader: lowest live node id, self included.
    pub fn leader_id(&self, self_id: u16, now: u32) -> u16 {
        let mut leader = self_id;
        for entry in self.live_entries(now) {
            if entry.node_id < leader {
                leader = entry.node_id;
            }
        }
        leader
    }

    /// Appends live members to an outbound gossip list, freshest first.
    /// The caller has already placed its own entry at the front.
    pub fn append_gossip(&self, now: u32, out: &mut heapless::Vec<GossipRecord, MAX_GOSSIP_ENTRIES>) {
        // Insertion sort of slot indices by ascending age; the table is small.
        let mut order: heapless::Vec<(u32, usize), CAP> = heapless::Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = slot {
                if entry.is_live(now) {
                    let age = now.wrapping_sub(entry.last_seen_at);
                    let pos = order.iter().position(|&(other, _)| other > age).unwrap_or(order.len());
                    let _ = order.insert(pos, (age, i));
                }
            }
        }
        for &(_, slot_index) in order.iter() {
            if out.is_full() {
                break;
            }
            if let Some(entry) = &self.slots[slot_index] {
                let _ = out.push(GossipRecord {
                    node_id: entry.node_id,
                    name: entry.name.clone(),
                    seq: entry.last_heartbeat_seq,
                    hops_away: entry.hops_away,
                });
            }
        }
    }
}

impl<const CAP: usize> Default for MemberTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
