//! # Mesh Node Core
//!
//! The protocol brain of one mesh node, free of any I/O: every table
//! (members, duplicate suppressor, transmit queue, pending deliveries,
//! history), the triage classifier hookup, the flood transport and the
//! periodic schedulers. All methods take a wrapping millisecond clock, so
//! the core can be driven by the radio runner on hardware and stepped
//! directly by multi-node tests.
//!
//! ## Control Flow
//!
//! Received frames enter through `handle_frame`; outgoing frames leave
//! through the FIFO transmit queue via `dequeue_frame`. `run_schedulers`
//! fires the periodic work (heartbeat, test traffic, membership log, hop
//! tick, delivery expiry) and is called by the runner at the quiet state
//! transitions. Channel changes decided here are picked up by the runner
//! with `take_pending_channel` and applied to the radio.

use core::fmt::Write;

use log::{log, Level};
use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;

use crate::frame::{self, Frame, FrameBuf, FrameKind, GossipRecord, MAX_GOSSIP_ENTRIES, MAX_NAME_LEN};
use crate::history::{Direction, HistoryEntry, MessageHistory, MAX_HISTORY_BODY};
use crate::hop::{channel_freq_mhz, HopSchedule};
use crate::members::MemberTable;
use crate::seen::SeenTable;
use crate::triage::{self, Intent};
use crate::{
    ACK_TIMEOUT_MS, DEFAULT_TTL, HEARTBEAT_INTERVAL_MS, HEARTBEAT_JITTER_MS, MAX_EVENT_OUTBOX, MAX_HISTORY_ENTRIES, MAX_MEMBERS, MAX_PENDING_DATA,
    MAX_SEEN_ENTRIES, MAX_TX_QUEUE, MEMBERSHIP_LOG_INTERVAL_MS, TEST_DATA_INTERVAL_MS, TEST_DATA_JITTER_MS,
};

/// Canned texts for the test-traffic generator.
const TEST_TEXTS: [&str; 6] = [
    "need a medic for 2 injured near the bridge asap",
    "we are out of clean water at camp",
    "any update near the library",
    "shots fired behind the market urgent",
    "hello team checking in all good",
    "need shelter tonight at school",
];

/// Stable identity of this node.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct NodeIdentity {
    node_id: u16,
    name: heapless::String<MAX_NAME_LEN>,
    hop_seed: u32,
}

impl NodeIdentity {
    /// Builds the identity from a hardware-derived node id. The hop seed is
    /// a fixed mix of the id so it survives reboots without persistence.
    pub fn new(node_id: u16) -> Self {
        let mut name = heapless::String::new();
        let _ = write!(name, "Node-{:04X}", node_id);
        Self {
            node_id,
            name,
            hop_seed: ((node_id as u32) << 16) ^ 0xA5B3_5713,
        }
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hop_seed(&self) -> u32 {
        self.hop_seed
    }

    /// Replaces the display name, mapping the reserved frame delimiters
    /// (`|`, `:`, `;`) to `_` and truncating to the name limit.
    pub fn set_name(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        self.name.clear();
        for ch in raw.chars() {
            let safe = if matches!(ch, '|' | ':' | ';') { '_' } else { ch };
            if self.name.push(safe).is_err() {
                break;
            }
        }
    }
}

/// Outbound frame FIFO drained by the radio state machine.
struct TxQueue {
    frames: [FrameBuf; MAX_TX_QUEUE],
    head: usize,
    size: usize,
}

impl TxQueue {
    fn new() -> Self {
        Self {
            frames: core::array::from_fn(|_| FrameBuf::new()),
            head: 0,
            size: 0,
        }
    }

    fn enqueue(&mut self, frame: FrameBuf) -> bool {
        if self.size >= MAX_TX_QUEUE {
            return false;
        }
        let tail = (self.head + self.size) % MAX_TX_QUEUE;
        self.frames[tail] = frame;
        self.size += 1;
        true
    }

    fn dequeue(&mut self) -> Option<FrameBuf> {
        if self.size == 0 {
            return None;
        }
        let frame = self.frames[self.head].clone();
        self.head = (self.head + 1) % MAX_TX_QUEUE;
        self.size -= 1;
        Some(frame)
    }

    fn len(&self) -> usize {
        self.size
    }
}

#[derive(Clone, Copy)]
struct PendingData {
    msg_id: u16,
    dst: u16,
    sent_at: u32,
}

/// Outbound DATA frames waiting for their ACK.
struct PendingTable {
    slots: [Option<PendingData>; MAX_PENDING_DATA],
}

impl PendingTable {
    fn new() -> Self {
        Self {
            slots: [None; MAX_PENDING_DATA],
        }
    }

    fn add(&mut self, msg_id: u16, dst: u16, now: u32) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(PendingData { msg_id, dst, sent_at: now });
        }
    }

    fn ack(&mut self, msg_id: u16) -> Option<u16> {
        for slot in self.slots.iter_mut() {
            if let Some(pending) = slot {
                if pending.msg_id == msg_id {
                    let dst = pending.dst;
                    *slot = None;
                    return Some(dst);
                }
            }
        }
        None
    }
}

/// Notifications surfaced to the embedding application.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum MeshEvent {
    /// A DATA frame addressed to this node arrived.
    MessageReceived {
        origin: u16,
        msg_id: u16,
        hops: u8,
        is_vital: bool,
        intent: Intent,
        urgency: u8,
        body: heapless::String<MAX_HISTORY_BODY>,
    },
    /// An outbound DATA frame was acknowledged by its destination.
    Delivered { msg_id: u16, by: u16, hops: u8 },
    /// An outbound DATA frame expired without acknowledgement.
    DeliveryTimeout { msg_id: u16, dst: u16 },
}

/// Error returned when a message cannot be queued for transmission.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendError {
    QueueFull,
}

fn is_due(now: u32, at: u32) -> bool {
    now.wrapping_sub(at) < u32::MAX / 2
}

/// The complete protocol state of one mesh node.
pub struct NodeCore {
    identity: NodeIdentity,
    heartbeat_seq: u32,
    local_msg_seq: u16,
    members: MemberTable<MAX_MEMBERS>,
    seen: SeenTable<MAX_SEEN_ENTRIES>,
    pending: PendingTable,
    history: MessageHistory<MAX_HISTORY_ENTRIES>,
    tx_queue: TxQueue,
    hop: HopSchedule,
    pending_channel: Option<u8>,
    next_heartbeat_at: u32,
    next_test_data_at: u32,
    next_membership_log_at: u32,
    test_traffic: bool,
    rng: WyRand,
    events: heapless::Deque<MeshEvent, MAX_EVENT_OUTBOX>,
}

impl NodeCore {
    pub fn new(node_id: u16, test_traffic: bool, rng_seed: u64, now: u32) -> Self {
        // Initial phases are staggered by node id so cold-booted nodes do
        // not beat in lockstep.
        Self {
            identity: NodeIdentity::new(node_id),
            heartbeat_seq: 0,
            local_msg_seq: 0,
            members: MemberTable::new(),
            seen: SeenTable::new(),
            pending: PendingTable::new(),
            history: MessageHistory::new(),
            tx_queue: TxQueue::new(),
            hop: HopSchedule::new(),
            pending_channel: None,
            next_heartbeat_at: now.wrapping_add(1_000 + (node_id % 700) as u32),
            next_test_data_at: now.wrapping_add(4_000 + (node_id % 3_000) as u32),
            next_membership_log_at: now.wrapping_add(6_000),
            test_traffic,
            rng: WyRand::seed_from_u64(rng_seed),
            events: heapless::Deque::new(),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn set_name(&mut self, raw: &str) {
        self.identity.set_name(raw);
    }

    pub fn history(&self) -> &MessageHistory<MAX_HISTORY_ENTRIES> {
        &self.history
    }

    pub fn members(&self) -> &MemberTable<MAX_MEMBERS> {
        &self.members
    }

    pub fn hop(&self) -> &HopSchedule {
        &self.hop
    }

    pub fn leader_id(&self, now: u32) -> u16 {
        self.members.leader_id(self.identity.node_id, now)
    }

    pub fn heartbeat_seq(&self) -> u32 {
        self.heartbeat_seq
    }

    /// Next frame to transmit, FIFO order.
    pub fn dequeue_frame(&mut self) -> Option<FrameBuf> {
        self.tx_queue.dequeue()
    }

    pub fn has_pending_tx(&self) -> bool {
        self.tx_queue.len() > 0
    }

    /// Channel decided by the hop scheduler, to be applied to the radio.
    pub fn take_pending_channel(&mut self) -> Option<u8> {
        self.pending_channel.take()
    }

    pub fn pop_event(&mut self) -> Option<MeshEvent> {
        self.events.pop_front()
    }

    fn push_event(&mut self, event: MeshEvent) {
        if self.events.push_back(event).is_err() {
            log!(Level::Warn, "[{:04X}] event outbox full, dropping event", self.identity.node_id);
        }
    }

    fn enqueue(&mut self, frame: FrameBuf) -> bool {
        if !self.tx_queue.enqueue(frame) {
            log!(Level::Warn, "[{:04X}] TX queue full, dropping frame", self.identity.node_id);
            return false;
        }
        true
    }

    /// Parses and processes one received frame. Malformed frames are
    /// dropped without any state change.
    pub fn handle_frame(&mut self, raw: &[u8], rssi: f32, snr: f32, now: u32) {
        match frame::parse(raw) {
            Ok(Frame::Heartbeat {
                from,
                seq,
                seed,
                name,
                ttl,
                hops,
                gossip,
            }) => {
                if from == self.identity.node_id {
                    return;
                }
                self.members.upsert_direct(self.identity.node_id, from, seq, seed, name, now);
                let mut merged = 0usize;
                for entry in gossip {
                    self.members.merge_gossip(self.identity.node_id, from, &entry, now);
                    merged += 1;
                }
                log!(
                    Level::Debug,
                    "[{:04X}] heartbeat from {:04X} ({}) seq={} seed={:08X} gossip={} RSSI={:.1} SNR={:.1}",
                    self.identity.node_id,
                    from,
                    if name.is_empty() { "unknown" } else { name },
                    seq,
                    seed,
                    merged,
                    rssi,
                    snr
                );
                self.reevaluate_hop(true, now);

                // Relay is a re-emission of our own beat carrying our gossip
                // table; the sequence-keyed dedup damps the cascade.
                if !self.seen.see(FrameKind::Heartbeat, from, seq as u16, now) && ttl > 0 {
                    self.emit_heartbeat(ttl - 1, hops.saturating_add(1), now);
                }
            }
            Ok(Frame::Data {
                from,
                origin,
                dst,
                msg_id,
                ttl,
                hops,
                body,
            }) => {
                self.members.upsert_direct(self.identity.node_id, from, 0, 0, "", now);
                self.members.touch_origin(self.identity.node_id, origin, from, hops, now);

                if self.seen.see(FrameKind::Data, origin, msg_id, now) {
                    return;
                }

                if dst == self.identity.node_id {
                    self.deliver_data(origin, msg_id, hops, body, now);
                    return;
                }
                if ttl > 0 {
                    if let Ok(relay) = frame::encode_data(self.identity.node_id, origin, dst, msg_id, ttl - 1, hops.saturating_add(1), body) {
                        self.enqueue(relay);
                    }
                }
            }
            Ok(Frame::Ack {
                from,
                origin,
                dst,
                msg_id,
                ttl,
                hops,
            }) => {
                self.members.upsert_direct(self.identity.node_id, from, 0, 0, "", now);
                self.members.touch_origin(self.identity.node_id, origin, from, hops, now);

                if self.seen.see(FrameKind::Ack, origin, msg_id, now) {
                    return;
                }

                if dst == self.identity.node_id {
                    if self.pending.ack(msg_id).is_some() {
                        log!(
                            Level::Info,
                            "[{:04X}] delivery ok msg={} confirmed by {:04X} (hops={})",
                            self.identity.node_id,
                            msg_id,
                            origin,
                            hops
                        );
                        self.push_event(MeshEvent::Delivered { msg_id, by: origin, hops });
                    }
                    return;
                }
                if ttl > 0 {
                    if let Ok(relay) = frame::encode_ack(self.identity.node_id, origin, dst, msg_id, ttl - 1, hops.saturating_add(1)) {
                        self.enqueue(relay);
                    }
                }
            }
            Err(_) => {
                // Malformed frame: silent drop.
            }
        }
    }

    fn deliver_data(&mut self, origin: u16, msg_id: u16, hops: u8, body: &str, now: u32) {
        log!(
            Level::Info,
            "[{:04X}] DATA msg={} from {:04X} hops={} body={:?}",
            self.identity.node_id,
            msg_id,
            origin,
            hops,
            body
        );

        let meta = triage::decode_payload(body);
        let mut stored_body = heapless::String::new();
        let _ = stored_body.push_str(truncate_to(body, MAX_HISTORY_BODY));
        self.history.push(HistoryEntry {
            direction: Direction::Received,
            peer: origin,
            msg_id,
            vital: meta.is_vital,
            urgency: meta.urgency,
            intent: meta.intent,
            body: stored_body.clone(),
        });
        self.push_event(MeshEvent::MessageReceived {
            origin,
            msg_id,
            hops,
            is_vital: meta.is_vital,
            intent: meta.intent,
            urgency: meta.urgency,
            body: stored_body,
        });

        // ACK floods back along the reverse path.
        self.seen.mark_local(FrameKind::Ack, self.identity.node_id, msg_id, now);
        if let Ok(ack) = frame::encode_ack(self.identity.node_id, self.identity.node_id, origin, msg_id, DEFAULT_TTL, 0) {
            self.enqueue(ack);
        }
    }

    /// Classifies `text` and queues the resulting DATA frame toward `dst`.
    ///
    /// Returns the allocated message id.
    pub fn queue_message(&mut self, dst: u16, text: &str, now: u32) -> Result<u16, SendError> {
        let msg_id = self.local_msg_seq.wrapping_add(1);
        self.local_msg_seq = msg_id;
        self.seen.mark_local(FrameKind::Data, self.identity.node_id, msg_id, now);

        let triage = triage::run_triage(text);
        let body = triage.wire_payload.as_str();
        let frame = frame::encode_data(self.identity.node_id, self.identity.node_id, dst, msg_id, DEFAULT_TTL, 0, body).map_err(|_| SendError::QueueFull)?;
        if !self.enqueue(frame) {
            return Err(SendError::QueueFull);
        }

        self.pending.add(msg_id, dst, now);
        let mut stored_body = heapless::String::new();
        let _ = stored_body.push_str(truncate_to(body, MAX_HISTORY_BODY));
        self.history.push(HistoryEntry {
            direction: Direction::Sent,
            peer: dst,
            msg_id,
            vital: triage.is_vital,
            urgency: triage.urgency,
            intent: triage.intent,
            body: stored_body,
        });
        log!(
            Level::Info,
            "[{:04X}] queued DATA msg={} -> {:04X} vital={} intent={} urgency={} body={:?}",
            self.identity.node_id,
            msg_id,
            dst,
            triage.is_vital,
            triage.intent.as_str(),
            triage.urgency,
            body
        );
        Ok(msg_id)
    }

    /// Runs every periodic task that is due. Called at the quiet state
    /// machine transitions, so its rate is bounded by the receive timeout.
    pub fn run_schedulers(&mut self, now: u32) {
        self.expire_pending(now);
        self.reevaluate_hop(false, now);

        if is_due(now, self.next_heartbeat_at) {
            self.send_heartbeat(now);
            let jitter = self.rng.next_u32() % HEARTBEAT_JITTER_MS;
            self.next_heartbeat_at = now.wrapping_add(HEARTBEAT_INTERVAL_MS + jitter);
        }
        if self.test_traffic && is_due(now, self.next_test_data_at) {
            self.send_test_data(now);
            let jitter = self.rng.next_u32() % TEST_DATA_JITTER_MS;
            self.next_test_data_at = now.wrapping_add(TEST_DATA_INTERVAL_MS + jitter);
        }
        if is_due(now, self.next_membership_log_at) {
            self.log_membership(now);
            self.next_membership_log_at = now.wrapping_add(MEMBERSHIP_LOG_INTERVAL_MS);
        }
    }

    fn send_heartbeat(&mut self, now: u32) {
        self.heartbeat_seq = self.heartbeat_seq.wrapping_add(1);
        if self.leader_id(now) == self.identity.node_id {
            // We own the hop schedule; retune before announcing the beat.
            self.reevaluate_hop(true, now);
        }
        self.emit_heartbeat(DEFAULT_TTL, 0, now);
    }

    fn emit_heartbeat(&mut self, ttl: u8, hops: u8, now: u32) {
        let mut gossip: heapless::Vec<GossipRecord, MAX_GOSSIP_ENTRIES> = heapless::Vec::new();
        let _ = gossip.push(GossipRecord {
            node_id: self.identity.node_id,
            name: self.identity.name.clone(),
            seq: self.heartbeat_seq,
            hops_away: 0,
        });
        self.members.append_gossip(now, &mut gossip);

        let frame = frame::encode_heartbeat(
            self.identity.node_id,
            self.heartbeat_seq,
            self.identity.hop_seed,
            self.identity.name(),
            ttl,
            hops,
            &gossip,
        );
        self.seen
            .mark_local(FrameKind::Heartbeat, self.identity.node_id, self.heartbeat_seq as u16, now);
        self.enqueue(frame);
    }

    fn send_test_data(&mut self, now: u32) {
        let mut peers = [0u16; MAX_MEMBERS];
        let count = self.members.collect_active(now, &mut peers);
        if count == 0 {
            return;
        }
        let dst = peers[(self.rng.next_u32() as usize) % count];
        let text = TEST_TEXTS[(self.rng.next_u32() as usize) % TEST_TEXTS.len()];
        let _ = self.queue_message(dst, text, now);
    }

    fn reevaluate_hop(&mut self, force: bool, now: u32) {
        let self_id = self.identity.node_id;
        let leader = self.members.leader_id(self_id, now);
        let (leader_seed, leader_seq) = if leader == self_id {
            (self.identity.hop_seed, self.heartbeat_seq)
        } else {
            match self.members.get(leader) {
                Some(entry) => (
                    if entry.hop_seed != 0 { entry.hop_seed } else { self.identity.hop_seed },
                    entry.last_heartbeat_seq,
                ),
                None => (self.identity.hop_seed, self.heartbeat_seq),
            }
        };

        if let Some(channel) = self.hop.evaluate(leader_seed, leader_seq, force, now) {
            log!(
                Level::Debug,
                "[{:04X}] hop leader={:04X} seed={:08X} seq={} channel={} freq={:.1}",
                self_id,
                leader,
                leader_seed,
                leader_seq,
                channel,
                channel_freq_mhz(channel)
            );
            self.pending_channel = Some(channel);
        }
    }

    fn expire_pending(&mut self, now: u32) {
        for i in 0..MAX_PENDING_DATA {
            let expired = match self.pending.slots[i] {
                Some(pending) => now.wrapping_sub(pending.sent_at) > ACK_TIMEOUT_MS,
                None => false,
            };
            if expired {
                if let Some(pending) = self.pending.slots[i].take() {
                    log!(
                        Level::Warn,
                        "[{:04X}] delivery timeout msg={} to {:04X}",
                        self.identity.node_id,
                        pending.msg_id,
                        pending.dst
                    );
                    self.push_event(MeshEvent::DeliveryTimeout {
                        msg_id: pending.msg_id,
                        dst: pending.dst,
                    });
                }
            }
        }
    }

    fn log_membership(&self, now: u32) {
        let leader = self.leader_id(now);
        let channel = self.hop.current_channel();
        log!(
            Level::Debug,
            "[{:04X}] members (leader={:04X} channel={} freq={:.1}):",
            self.identity.node_id,
            leader,
            channel,
            channel_freq_mhz(channel)
        );
        for entry in self.members.live_entries(now) {
            log!(
                Level::Debug,
                "[{:04X}]   - {:04X} ({}) age={}ms seq={} hops={} via={:04X}",
                self.identity.node_id,
                entry.node_id,
                entry.name,
                now.wrapping_sub(entry.last_seen_at),
                entry.last_heartbeat_seq,
                entry.hops_away,
                entry.via_node
            );
        }
    }
}

fn truncate_to(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn core(id: u16) -> NodeCore {
        NodeCore::new(id, false, id as u64, 0)
    }

    /// Drains every frame currently queued on `from` into `to`.
    fn shuttle(from: &mut NodeCore, to: &mut NodeCore, now: u32) -> usize {
        let mut moved = 0;
        while let Some(frame) = from.dequeue_frame() {
            to.handle_frame(frame.as_bytes(), -60.0, 9.0, now);
            moved += 1;
        }
        moved
    }

    #[test]
    fn own_heartbeat_is_ignored() {
        let mut a = core(0x0001);
        a.run_schedulers(2_000);
        let frame = a.dequeue_frame().expect("heartbeat queued");
        a.handle_frame(frame.as_bytes(), -50.0, 10.0, 2_100);
        assert_eq!(a.members().live_count(2_100), 0);
        assert!(!a.has_pending_tx());
    }

    #[test]
    fn heartbeat_exchange_builds_tables() {
        let mut a = core(0x0001);
        let mut b = core(0x0002);
        a.run_schedulers(2_000);
        shuttle(&mut a, &mut b, 2_050);
        let entry = b.members().get(0x0001).expect("A learned");
        assert_eq!(entry.hops_away, 1);
        assert_eq!(entry.name.as_str(), "Node-0001");
        assert_eq!(b.leader_id(2_050), 0x0001);
    }

    #[test]
    fn heartbeat_relay_carries_own_gossip() {
        let mut a = core(0x0001);
        let mut b = core(0x0002);
        let mut c = core(0x0003);

        a.run_schedulers(2_000);
        shuttle(&mut a, &mut b, 2_050);
        // B relays as its own beat; C learns A through B's gossip.
        shuttle(&mut b, &mut c, 2_100);
        let learned = c.members().get(0x0001).expect("gossiped entry");
        assert_eq!(learned.hops_away, 2);
        assert_eq!(learned.via_node, 0x0002);
        assert_eq!(c.members().get(0x0002).unwrap().hops_away, 1);
    }

    #[test]
    fn duplicate_heartbeat_triggers_no_second_relay() {
        let mut a = core(0x0001);
        let mut b = core(0x0002);
        a.run_schedulers(2_000);
        let frame = a.dequeue_frame().unwrap();
        b.handle_frame(frame.as_bytes(), -60.0, 9.0, 2_050);
        let first_relay = b.dequeue_frame();
        assert!(first_relay.is_some());
        b.handle_frame(frame.as_bytes(), -60.0, 9.0, 2_060);
        assert!(b.dequeue_frame().is_none());
    }

    #[test]
    fn data_to_self_is_delivered_and_acked() {
        let mut a = core(0x0001);
        let mut b = core(0x0002);
        let msg_id = a.queue_message(0x0002, "we are out of clean water at camp", 1_000).unwrap();
        shuttle(&mut a, &mut b, 1_050);

        let entry = b.history().get(0).expect("history entry");
        assert_eq!(entry.direction, Direction::Received);
        assert_eq!(entry.msg_id, msg_id);
        assert!(entry.vital);
        assert_eq!(entry.intent, Intent::Water);
        assert_eq!(entry.body.as_str(), "WATER|U1|F0|N0|Lcamp");

        match b.pop_event() {
            Some(MeshEvent::MessageReceived { origin, is_vital, .. }) => {
                assert_eq!(origin, 0x0001);
                assert!(is_vital);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // ACK flows back and clears the pending entry.
        shuttle(&mut b, &mut a, 1_100);
        match a.pop_event() {
            Some(MeshEvent::Delivered { msg_id: acked, by, .. }) => {
                assert_eq!(acked, msg_id);
                assert_eq!(by, 0x0002);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // No timeout later.
        a.run_schedulers(1_000 + ACK_TIMEOUT_MS + 1_000);
        assert!(!matches!(a.pop_event(), Some(MeshEvent::DeliveryTimeout { .. })));
    }

    #[test]
    fn duplicate_data_is_dropped_without_side_effects() {
        let mut a = core(0x0001);
        let mut b = core(0x0002);
        let _ = a.queue_message(0x0002, "hello team checking in all good", 1_000).unwrap();
        let frame = a.dequeue_frame().unwrap();
        b.handle_frame(frame.as_bytes(), -60.0, 9.0, 1_050);
        assert_eq!(b.history().len(), 1);
        let _ack = b.dequeue_frame().expect("ack queued");
        b.handle_frame(frame.as_bytes(), -60.0, 9.0, 1_060);
        assert_eq!(b.history().len(), 1);
        assert!(b.dequeue_frame().is_none());
    }

    #[test]
    fn relay_decrements_ttl_and_stops_at_zero() {
        let mut b = core(0x0002);
        // Not addressed to B: relayed with ttl-1/hops+1.
        b.handle_frame(b"D|0001|0001|0003|7|2|0|hi there", -60.0, 9.0, 500);
        let relay = b.dequeue_frame().expect("relay queued");
        match frame::parse(relay.as_bytes()).unwrap() {
            Frame::Data { from, origin, ttl, hops, body, .. } => {
                assert_eq!(from, 0x0002);
                assert_eq!(origin, 0x0001);
                assert_eq!(ttl, 1);
                assert_eq!(hops, 1);
                assert_eq!(body, "hi there");
            }
            _ => panic!("expected data relay"),
        }

        // TTL exhausted: no relay.
        b.handle_frame(b"D|0001|0001|0003|8|0|1|hi again", -60.0, 9.0, 600);
        assert!(b.dequeue_frame().is_none());
    }

    #[test]
    fn pending_data_expires_with_timeout_event() {
        let mut a = core(0x0001);
        let msg_id = a.queue_message(0x0009, "checking in", 1_000).unwrap();
        let _ = a.dequeue_frame();
        a.run_schedulers(1_000 + ACK_TIMEOUT_MS + 500);
        loop {
            match a.pop_event() {
                Some(MeshEvent::DeliveryTimeout { msg_id: expired, dst }) => {
                    assert_eq!(expired, msg_id);
                    assert_eq!(dst, 0x0009);
                    break;
                }
                Some(_) => continue,
                None => panic!("expected delivery timeout"),
            }
        }
    }

    #[test]
    fn malformed_frames_change_nothing() {
        let mut a = core(0x0001);
        a.handle_frame(b"D|0001|0001", -60.0, 9.0, 100);
        a.handle_frame(b"", -60.0, 9.0, 100);
        a.handle_frame(&[0xFF, 0xFE, 0x00], -60.0, 9.0, 100);
        assert_eq!(a.members().live_count(100), 0);
        assert!(!a.has_pending_tx());
        assert!(a.pop_event().is_none());
        assert_eq!(a.history().len(), 0);
    }

    #[test]
    fn tx_queue_overflow_fails_cleanly() {
        let mut a = core(0x0001);
        let mut last = Ok(0);
        for i in 0..MAX_TX_QUEUE + 2 {
            last = a.queue_message(0x0002, "hello there", 1_000 + i as u32);
        }
        assert_eq!(last, Err(SendError::QueueFull));
    }

    #[test]
    fn leader_falls_back_when_peer_goes_dark() {
        let mut b = core(0x0020);
        b.handle_frame(b"H|0010|3|00B35713|alpha|4|0|G 0010:alpha:3:0", -60.0, 9.0, 1_000);
        assert_eq!(b.leader_id(1_100), 0x0010);
        // Past the membership timeout the leadership returns to B.
        let later = 1_000 + crate::MEMBERSHIP_TIMEOUT_MS + 1_000;
        assert_eq!(b.leader_id(later), 0x0020);
        b.run_schedulers(later);
        assert_eq!(b.hop().last_applied_seq(), b.heartbeat_seq());
    }
}
