//! # LifeLink Mesh Node Library
//!
//! Off-grid emergency-communications mesh node built on one half-duplex
//! long-range radio. Each node classifies typed messages on device,
//! compacts vital ones into a short wire payload and floods them hop by
//! hop to their destination, which acknowledges along the reverse flood.
//! Membership spreads epidemically via heartbeat gossip, and all live
//! nodes follow a frequency-hopping schedule owned by the lowest live id.
//!
//! The library splits into a sans-IO protocol core ([`NodeCore`]), an
//! embassy task driving the radio state machine around it, and a
//! [`MeshNode`] manager handing the embedding application a command/reply/
//! event surface over channels.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(feature = "radio-device-echo", feature = "radio-device-simulator"))]
compile_error!("Only one radio device feature can be enabled at a time");

pub mod frame;
pub mod triage;

mod command;
mod history;
mod hop;
mod members;
mod node;
mod seen;

#[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
pub mod radio_devices;

#[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
mod node_runner;

#[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
use crate::radio_devices::RadioDevice;

#[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
use embassy_executor::Spawner;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
#[cfg(feature = "embedded")]
use embassy_sync::channel::Channel;

pub use command::{handle_command, LinkFrame, MAX_LINK_FRAME};
pub use frame::{FrameBuf, FrameKind, MAX_FRAME_SIZE, MAX_NAME_LEN};
pub use history::{Direction, HistoryEntry, MAX_HISTORY_BODY};
pub use hop::{channel_freq_mhz, channel_index, HopSchedule, HOP_CHANNELS_MHZ};
pub use members::{MemberEntry, MemberTable};
pub use node::{MeshEvent, NodeCore, NodeIdentity, SendError};
pub use seen::SeenTable;
pub use triage::{decode_payload, feature_vector, run_triage, Intent, TriageOutput, FEATURE_DIM, MAX_PAYLOAD_LEN};

// Table capacities. These only affect how much a single node can track,
// not wire compatibility.
pub const MAX_MEMBERS: usize = 24;
pub const MAX_SEEN_ENTRIES: usize = 64;
pub const MAX_TX_QUEUE: usize = 12;
pub const MAX_PENDING_DATA: usize = 12;
pub const MAX_HISTORY_ENTRIES: usize = 64;
pub(crate) const MAX_EVENT_OUTBOX: usize = 8;

// Protocol timing. All nodes of a mesh must agree on these.
pub const DEFAULT_TTL: u8 = 4;
pub const MEMBERSHIP_TIMEOUT_MS: u32 = 15_000;
pub const ACK_TIMEOUT_MS: u32 = 12_000;
pub const HOP_INTERVAL_MS: u32 = 5_000;
pub(crate) const HEARTBEAT_INTERVAL_MS: u32 = 1_500;
pub(crate) const HEARTBEAT_JITTER_MS: u32 = 1_500;
pub(crate) const TEST_DATA_INTERVAL_MS: u32 = 8_000;
pub(crate) const TEST_DATA_JITTER_MS: u32 = 2_500;
pub(crate) const MEMBERSHIP_LOG_INTERVAL_MS: u32 = 10_000;

// Radio state machine ceilings.
pub(crate) const TX_TIMEOUT_MS: u64 = 3_000;
pub(crate) const RX_TIMEOUT_MS: u64 = 1_500;
pub(crate) const TX_BACKOFF_MS: u64 = 250;

#[cfg(feature = "radio-device-simulator")]
pub(crate) const MAX_NODE_COUNT: usize = 64;

#[cfg(not(feature = "radio-device-simulator"))]
#[allow(dead_code)]
pub(crate) const MAX_NODE_COUNT: usize = 1;

/// RF parameters handed to the radio device at startup.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct RadioParams {
    pub frequency_mhz: f32,
    pub bandwidth_khz: f32,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub sync_word: u8,
    pub tx_power_dbm: i8,
    pub preamble_length: u16,
}

impl Default for RadioParams {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            bandwidth_khz: 125.0,
            spreading_factor: 7,
            coding_rate: 5,
            sync_word: 0x12,
            tx_power_dbm: 14,
            preamble_length: 8,
        }
    }
}

/// Node configuration passed to [`MeshNode::initialize`].
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct MeshConfig {
    pub radio: RadioParams,
    /// Periodically classify and send one of the canned test texts to a
    /// random active peer. Field-test builds only.
    pub test_traffic: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            radio: RadioParams::default(),
            test_traffic: false,
        }
    }
}

const COMMAND_QUEUE_SIZE: usize = 4;
type CommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, LinkFrame, COMMAND_QUEUE_SIZE>;
pub(crate) type CommandQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, LinkFrame, COMMAND_QUEUE_SIZE>;
type CommandQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, LinkFrame, COMMAND_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static COMMAND_QUEUE: CommandQueue = Channel::new();

const REPLY_QUEUE_SIZE: usize = 4;
type ReplyQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, LinkFrame, REPLY_QUEUE_SIZE>;
type ReplyQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, LinkFrame, REPLY_QUEUE_SIZE>;
pub(crate) type ReplyQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, LinkFrame, REPLY_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static REPLY_QUEUE: ReplyQueue = Channel::new();

const EVENT_QUEUE_SIZE: usize = 8;
type EventQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, MeshEvent, EVENT_QUEUE_SIZE>;
type EventQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, MeshEvent, EVENT_QUEUE_SIZE>;
pub(crate) type EventQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, MeshEvent, EVENT_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static EVENT_QUEUE: EventQueue = Channel::new();

/// Error submitting a pairing-link command.
#[cfg_attr(feature = "std", derive(Debug))]
pub enum CommandError {
    NotInited,
    QueueFull,
}

/// Error receiving a reply or event.
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ReceiveError {
    NotInited,
}

enum MeshNodeState {
    Uninitialized,
    Initialized {
        command_queue_sender: CommandQueueSender,
        reply_queue_receiver: ReplyQueueReceiver,
        event_queue_receiver: EventQueueReceiver,
    },
}

/// Handle the embedding application keeps to one running mesh node.
///
/// `initialize` spawns the node runner task that owns the radio; from then
/// on the application talks to the node through bounded channels: command
/// lines in, reply lines and mesh events out.
pub struct MeshNode {
    state: MeshNodeState,
}

impl MeshNode {
    pub const fn new() -> Self {
        MeshNode {
            state: MeshNodeState::Uninitialized,
        }
    }

    #[cfg(all(feature = "embedded", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(&mut self, config: MeshConfig, spawner: Spawner, radio_device: RadioDevice, node_id: u16, rng_seed: u64) -> Result<(), ()> {
        self.initialize_common(config, spawner, radio_device, &COMMAND_QUEUE, &REPLY_QUEUE, &EVENT_QUEUE, node_id, rng_seed)
    }

    #[cfg(all(feature = "std", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(&mut self, config: MeshConfig, spawner: Spawner, radio_device: RadioDevice, node_id: u16, rng_seed: u64) -> Result<(), ()> {
        let command_queue: &'static CommandQueue = Box::leak(Box::new(embassy_sync::channel::Channel::new()));
        let reply_queue: &'static ReplyQueue = Box::leak(Box::new(embassy_sync::channel::Channel::new()));
        let event_queue: &'static EventQueue = Box::leak(Box::new(embassy_sync::channel::Channel::new()));
        self.initialize_common(config, spawner, radio_device, command_queue, reply_queue, event_queue, node_id, rng_seed)
    }

    #[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
    #[allow(clippy::too_many_arguments)]
    fn initialize_common(
        &mut self,
        config: MeshConfig,
        spawner: Spawner,
        radio_device: RadioDevice,
        command_queue: &'static CommandQueue,
        reply_queue: &'static ReplyQueue,
        event_queue: &'static EventQueue,
        node_id: u16,
        rng_seed: u64,
    ) -> Result<(), ()> {
        let spawn_result = spawner.spawn(node_runner::node_runner_task(
            radio_device,
            command_queue.receiver(),
            reply_queue.sender(),
            event_queue.sender(),
            config,
            node_id,
            rng_seed,
        ));
        if spawn_result.is_err() {
            return Err(());
        }
        log::log!(log::Level::Info, "[{:04X}] node runner task spawned", node_id);

        self.state = MeshNodeState::Initialized {
            command_queue_sender: command_queue.sender(),
            reply_queue_receiver: reply_queue.receiver(),
            event_queue_receiver: event_queue.receiver(),
        };
        Ok(())
    }

    /// Hands one ASCII request line to the node. The reply arrives on
    /// [`MeshNode::next_reply`].
    pub fn submit_command(&self, request: &[u8]) -> Result<(), CommandError> {
        let command_queue_sender = match &self.state {
            MeshNodeState::Uninitialized => return Err(CommandError::NotInited),
            MeshNodeState::Initialized { command_queue_sender, .. } => command_queue_sender,
        };
        command_queue_sender
            .try_send(LinkFrame::from_bytes(request))
            .map_err(|_| CommandError::QueueFull)
    }

    /// Next command reply, in request order.
    pub async fn next_reply(&self) -> Result<LinkFrame, ReceiveError> {
        let reply_queue_receiver = match &self.state {
            MeshNodeState::Uninitialized => return Err(ReceiveError::NotInited),
            MeshNodeState::Initialized { reply_queue_receiver, .. } => reply_queue_receiver,
        };
        Ok(reply_queue_receiver.receive().await)
    }

    /// Next mesh event (message received, delivery confirmed or timed out).
    pub async fn next_event(&self) -> Result<MeshEvent, ReceiveError> {
        let event_queue_receiver = match &self.state {
            MeshNodeState::Uninitialized => return Err(ReceiveError::NotInited),
            MeshNodeState::Initialized { event_queue_receiver, .. } => event_queue_receiver,
        };
        Ok(event_queue_receiver.receive().await)
    }
}

impl Default for MeshNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn mesh_config_constructs() {
        let config = MeshConfig::default();
        assert_eq!(config.radio.spreading_factor, 7);
        assert_eq!(config.radio.sync_word, 0x12);
        assert!(!config.test_traffic);
    }

    #[test]
    fn manager_submit_command_not_inited() {
        let node = MeshNode::new();
        match node.submit_command(b"WHOAMI") {
            Err(CommandError::NotInited) => {}
            other => panic!("expected NotInited, got: {:?}", other),
        }
    }

    #[test]
    fn manager_next_reply_not_inited() {
        let node = MeshNode::new();
        let result = block_on(async { node.next_reply().await });
        match result {
            Err(ReceiveError::NotInited) => {}
            other => panic!("expected NotInited, got: {:?}", other),
        }
    }

    #[test]
    fn identity_derivation_is_stable() {
        let identity = NodeIdentity::new(0x0001);
        assert_eq!(identity.node_id(), 0x0001);
        assert_eq!(identity.name(), "Node-0001");
        assert_eq!(identity.hop_seed(), (1u32 << 16) ^ 0xA5B3_5713);
        let again = NodeIdentity::new(0x0001);
        assert_eq!(identity.hop_seed(), again.hop_seed());
    }
}
