//! End-to-end mesh scenarios over in-process nodes.
//!
//! A small harness instantiates several protocol cores, wires them into a
//! topology and shuttles every queued frame between linked nodes until the
//! air is quiet. Time is a plain millisecond counter the harness advances.

use lifelink_mesh::{
    feature_vector, run_triage, Direction, Intent, MeshEvent, NodeCore, ACK_TIMEOUT_MS, MEMBERSHIP_TIMEOUT_MS,
};

struct Mesh {
    nodes: Vec<NodeCore>,
    links: Vec<(usize, usize)>,
}

impl Mesh {
    fn new(ids: &[u16], links: &[(usize, usize)]) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Mesh {
            nodes: ids.iter().map(|&id| NodeCore::new(id, false, id as u64, 0)).collect(),
            links: links.to_vec(),
        }
    }

    fn linked(&self, a: usize, b: usize) -> bool {
        self.links.iter().any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    fn cut_all_links_of(&mut self, index: usize) {
        self.links.retain(|&(a, b)| a != index && b != index);
    }

    /// Delivers every queued frame to all linked neighbors, repeatedly,
    /// until no node has anything left to transmit.
    fn flush(&mut self, now: u32) {
        loop {
            let mut traffic: Vec<(usize, Vec<u8>)> = Vec::new();
            for (sender, node) in self.nodes.iter_mut().enumerate() {
                while let Some(frame) = node.dequeue_frame() {
                    traffic.push((sender, frame.as_bytes().to_vec()));
                }
            }
            if traffic.is_empty() {
                return;
            }
            for (sender, bytes) in traffic {
                for receiver in 0..self.nodes.len() {
                    if receiver != sender && self.linked(sender, receiver) {
                        self.nodes[receiver].handle_frame(&bytes, -60.0, 8.0, now);
                    }
                }
            }
        }
    }

    /// One scheduler round on every node followed by a flush.
    fn step(&mut self, now: u32) {
        for node in self.nodes.iter_mut() {
            node.run_schedulers(now);
        }
        self.flush(now);
    }

    fn drain_events(&mut self, index: usize) -> Vec<MeshEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.nodes[index].pop_event() {
            events.push(event);
        }
        events
    }
}

/// Scenario: two nodes one hop apart discover each other and exchange a
/// vital message with acknowledgement.
#[test]
fn two_node_direct_delivery() {
    let mut mesh = Mesh::new(&[0x0001, 0x0002], &[(0, 1)]);
    mesh.step(2_000);

    let a_view = mesh.nodes[0].members().get(0x0002).expect("A sees B");
    let b_view = mesh.nodes[1].members().get(0x0001).expect("B sees A");
    assert_eq!(a_view.hops_away, 1);
    assert_eq!(b_view.hops_away, 1);

    let msg_id = mesh.nodes[0].queue_message(0x0002, "we are out of clean water at camp", 3_000).unwrap();
    mesh.flush(3_000);

    let received = mesh.nodes[1].history().get(0).expect("B received");
    assert_eq!(received.direction, Direction::Received);
    assert!(received.vital);
    assert_eq!(received.intent, Intent::Water);
    assert_eq!(received.body.as_str(), "WATER|U1|F0|N0|Lcamp");

    let delivered = mesh
        .drain_events(0)
        .into_iter()
        .any(|event| matches!(event, MeshEvent::Delivered { msg_id: id, by: 0x0002, .. } if id == msg_id));
    assert!(delivered, "A observed the ACK before the timeout");

    // Well past the ACK timeout: the pending entry was cleared, not expired.
    mesh.step(3_000 + ACK_TIMEOUT_MS + 1_000);
    let timed_out = mesh
        .drain_events(0)
        .into_iter()
        .any(|event| matches!(event, MeshEvent::DeliveryTimeout { .. }));
    assert!(!timed_out);
}

/// Scenario: three nodes in a line; the middle node relays DATA one way and
/// the ACK back.
#[test]
fn three_node_line_relay() {
    let mut mesh = Mesh::new(&[0x0001, 0x0002, 0x0003], &[(0, 1), (1, 2)]);
    let mut now = 2_000;
    for _ in 0..3 {
        mesh.step(now);
        now += 3_000;
    }

    let msg_id = mesh.nodes[0].queue_message(0x0003, "need a medic for 2 injured near the bridge asap", now).unwrap();
    mesh.flush(now);

    let received = mesh.nodes[2]
        .history()
        .get(mesh.nodes[2].history().len() - 1)
        .expect("C received");
    assert_eq!(received.msg_id, msg_id);
    assert_eq!(received.peer, 0x0001);
    assert!(received.vital);
    assert_eq!(received.intent, Intent::Medic);

    let delivered = mesh
        .drain_events(0)
        .into_iter()
        .any(|event| matches!(event, MeshEvent::Delivered { msg_id: id, by: 0x0003, .. } if id == msg_id));
    assert!(delivered, "ACK relayed back across the line");
}

/// Scenario: redundant triangle around the sender floods one DATA frame;
/// duplicate suppression keeps every observation single.
#[test]
fn duplicate_storm_is_suppressed() {
    // A talks to B, C, D; B, C, D form a triangle.
    let mut mesh = Mesh::new(&[0x000A, 0x000B, 0x000C, 0x000D], &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
    mesh.step(2_000);
    for index in 0..4 {
        mesh.drain_events(index);
    }

    let msg_id = mesh.nodes[0].queue_message(0x000B, "hello team checking in all good", 3_000).unwrap();
    mesh.flush(3_000);

    // B delivered exactly once despite hearing the frame from A, C and D.
    let deliveries = (0..mesh.nodes[1].history().len())
        .filter_map(|index| mesh.nodes[1].history().get(index))
        .filter(|entry| entry.direction == Direction::Received && entry.msg_id == msg_id)
        .count();
    assert_eq!(deliveries, 1);

    // A saw exactly one effective ACK.
    let confirmations = mesh
        .drain_events(0)
        .into_iter()
        .filter(|event| matches!(event, MeshEvent::Delivered { msg_id: id, .. } if *id == msg_id))
        .count();
    assert_eq!(confirmations, 1);

    // C and D never delivered a frame that was not addressed to them.
    for index in [2, 3] {
        let stray = (0..mesh.nodes[index].history().len())
            .filter_map(|i| mesh.nodes[index].history().get(i))
            .any(|entry| entry.direction == Direction::Received);
        assert!(!stray);
    }
}

/// Scenario: the leader goes dark; the survivor takes over the hop
/// schedule without getting stuck.
#[test]
fn leader_change_on_silence() {
    let mut mesh = Mesh::new(&[0x0010, 0x0020], &[(0, 1)]);
    mesh.step(2_000);
    assert_eq!(mesh.nodes[1].leader_id(2_100), 0x0010);

    // A vanishes.
    mesh.cut_all_links_of(0);
    let mut now = 2_000 + MEMBERSHIP_TIMEOUT_MS + 1_000;
    assert_eq!(mesh.nodes[1].leader_id(now), 0x0020);

    // B keeps beating and owns its own schedule.
    for _ in 0..3 {
        mesh.step(now);
        now += 3_000;
    }
    assert_eq!(mesh.nodes[1].hop().last_applied_seq(), mesh.nodes[1].heartbeat_seq());
}

/// Scenario: chat stays chat, danger classifies hot, and the bodies carried
/// over the mesh reflect it.
#[test]
fn triage_vs_chat_bodies() {
    let chat = run_triage("hello team checking in all good");
    assert!(!chat.is_vital);
    assert_eq!(chat.wire_payload.as_str(), "hello team checking in all good");

    let danger = run_triage("shots fired behind the market urgent");
    assert!(danger.is_vital);
    assert_eq!(danger.intent, Intent::Danger);
    assert!(danger.urgency >= 2);
    assert_eq!(danger.flags & 0b10, 0b10, "needs confirmation");
    assert_eq!(danger.flags & 0b01, 0, "location cue present");
    assert_eq!(danger.location, "market");

    let mut mesh = Mesh::new(&[0x0001, 0x0002], &[(0, 1)]);
    mesh.step(2_000);
    mesh.nodes[0].queue_message(0x0002, "hello team checking in all good", 3_000).unwrap();
    mesh.flush(3_000);
    let received = mesh.nodes[1].history().get(0).unwrap();
    assert!(!received.vital);
    assert_eq!(received.body.as_str(), "hello team checking in all good");
}

/// Scenario: a truncated frame is dropped without touching any table.
#[test]
fn malformed_frame_is_silently_dropped() {
    let mut node = NodeCore::new(0x0001, false, 1, 0);
    node.handle_frame(b"D|0001|0001", -60.0, 8.0, 1_000);
    assert_eq!(node.members().live_count(1_000), 0);
    assert!(!node.has_pending_tx());
    assert!(node.pop_event().is_none());
    assert_eq!(node.history().len(), 0);
}

/// Invariant: in a static lossless line, every table converges to graph
/// distance within diameter heartbeat rounds, and all nodes agree on the
/// leader.
#[test]
fn line_topology_converges_to_graph_distance() {
    let ids = [0x0001u16, 0x0002, 0x0003, 0x0004];
    let mut mesh = Mesh::new(&ids, &[(0, 1), (1, 2), (2, 3)]);
    let mut now = 2_000;
    for _ in 0..4 {
        mesh.step(now);
        now += 3_000;
    }

    let expected: [[u8; 4]; 4] = [[0, 1, 2, 3], [1, 0, 1, 2], [2, 1, 0, 1], [3, 2, 1, 0]];
    for (i, row) in expected.iter().enumerate() {
        for (j, &distance) in row.iter().enumerate() {
            if i == j {
                continue;
            }
            let entry = mesh.nodes[i]
                .members()
                .get(ids[j])
                .unwrap_or_else(|| panic!("node {} is missing {}", i, j));
            assert_eq!(entry.hops_away, distance, "distance from node {} to node {}", i, j);
        }
    }

    // Leader agreement across consistent tables.
    for node in mesh.nodes.iter() {
        assert_eq!(node.leader_id(now), 0x0001);
    }
}

/// Invariant: structural and n-gram features stay in [0, 1] and at most one
/// n-gram bin saturates, for a spread of inputs.
#[test]
fn feature_vector_bounds_hold() {
    let inputs = [
        "we are out of clean water at camp",
        "shots fired behind the market urgent",
        "NEED A MEDIC NOW!!! 12 hurt",
        "????",
        "a",
        "",
    ];
    for text in inputs {
        let x = feature_vector(text);
        for value in &x[..8] {
            assert!((0.0..=1.0).contains(value), "structural feature out of range for {:?}", text);
        }
        for value in &x[18..] {
            assert!((0.0..=1.0).contains(value), "ngram feature out of range for {:?}", text);
        }
        let saturated = x[18..].iter().filter(|value| **value >= 1.0).count();
        assert!(saturated <= 1, "more than one saturated bin for {:?}", text);
    }
}

/// Invariant: the compact payload of every vital classification matches the
/// documented shape and length bound.
#[test]
fn vital_payload_shape_holds() {
    let vital_inputs = [
        "we are out of clean water at camp",
        "shots fired behind the market urgent",
        "need a medic for 2 injured near the bridge asap",
        "need shelter tonight at school",
        "flooding near the bridge evacuate now",
    ];
    for text in vital_inputs {
        let out = run_triage(text);
        assert!(out.is_vital, "{:?} should be vital", text);
        let payload = out.wire_payload.as_str();
        assert!(payload.len() <= 48);

        let fields: Vec<&str> = payload.split('|').collect();
        assert_eq!(fields.len(), 5, "payload {:?}", payload);
        assert!(!fields[0].is_empty() && fields[0].bytes().all(|b| b.is_ascii_uppercase()));
        assert!(fields[1].starts_with('U') && fields[1][1..].parse::<u8>().unwrap() <= 3);
        assert!(fields[2].starts_with('F') && fields[2][1..].parse::<u8>().unwrap() <= 3);
        assert!(fields[3].starts_with('N') && fields[3][1..].parse::<u16>().unwrap() <= 255);
        assert!(fields[4].starts_with('L') && fields[4][1..].bytes().all(|b| b.is_ascii_lowercase() || b == b'_'));
    }
}
