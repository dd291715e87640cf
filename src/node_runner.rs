//! # Node Runner Task
//!
//! The embassy task that owns the radio device and drives the node state
//! machine tick by tick:
//!
//! ```text
//! Idle -> (schedulers) -> Tx | Rx
//! Tx   -> TxDone | TxTimeout          (3 s ceiling)
//! Rx   -> RxDone | RxTimeout | RxError (1.5 s ceiling)
//! ```
//!
//! Scheduler work (heartbeats, pending-data expiry, hop tick, command
//! drain, event flush) runs only at the three quiet transitions - `Idle`,
//! `RxDone` and `RxTimeout` - so its rate is bounded by the receive
//! timeout. A deadline expiry leaves the radio in an undefined state and is
//! recovered with `standby()`; there is no cancellation of an in-flight
//! operation.
//!
//! Radio init failure at startup is fatal: the task logs and parks forever.

use embassy_time::{with_timeout, Duration, Instant, Timer};
use log::{log, Level};

use crate::command;
use crate::frame::MAX_FRAME_SIZE;
use crate::hop::channel_freq_mhz;
use crate::node::NodeCore;
use crate::radio_devices::RadioDevice;
use crate::{
    CommandQueueReceiver, EventQueueSender, MeshConfig, ReplyQueueSender, MAX_NODE_COUNT, RX_TIMEOUT_MS, TX_BACKOFF_MS, TX_TIMEOUT_MS,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum RadioState {
    Idle,
    Tx,
    Rx,
    TxDone,
    RxDone,
    TxTimeout,
    RxTimeout,
    RxError,
}

fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

/// Runs all deferred work belonging to a quiet state transition: pairing
/// commands, periodic schedulers, frequency-hop application, event flush.
async fn run_quiet_point(
    core: &mut NodeCore,
    radio_device: &mut RadioDevice,
    command_queue_receiver: &CommandQueueReceiver,
    reply_queue_sender: &ReplyQueueSender,
    event_queue_sender: &EventQueueSender,
) {
    let now = now_ms();

    while let Ok(request) = command_queue_receiver.try_receive() {
        let reply = command::handle_command(core, request.as_bytes(), now);
        if reply_queue_sender.try_send(reply).is_err() {
            log!(Level::Warn, "[{:04X}] reply queue full, dropping reply", core.identity().node_id());
        }
    }

    core.run_schedulers(now);

    if let Some(channel) = core.take_pending_channel() {
        let freq_mhz = channel_freq_mhz(channel);
        if radio_device.set_frequency(freq_mhz).is_err() {
            log!(Level::Warn, "[{:04X}] set_frequency({:.1}) failed", core.identity().node_id(), freq_mhz);
        }
    }

    while let Some(event) = core.pop_event() {
        if event_queue_sender.try_send(event).is_err() {
            log!(Level::Warn, "[{:04X}] event queue full, dropping event", core.identity().node_id());
        }
    }
}

#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub(crate) async fn node_runner_task(
    mut radio_device: RadioDevice,
    command_queue_receiver: CommandQueueReceiver,
    reply_queue_sender: ReplyQueueSender,
    event_queue_sender: EventQueueSender,
    config: MeshConfig,
    node_id: u16,
    rng_seed: u64,
) -> ! {
    let mut core = NodeCore::new(node_id, config.test_traffic, rng_seed, now_ms());
    log!(
        Level::Info,
        "[{:04X}] node starting: name={} seed={:08X} freq={:.1} MHz sf={} power={} dBm",
        node_id,
        core.identity().name(),
        core.identity().hop_seed(),
        config.radio.frequency_mhz,
        config.radio.spreading_factor,
        config.radio.tx_power_dbm
    );

    if radio_device.begin(&config.radio).is_err() {
        log!(Level::Error, "[{:04X}] radio init failed, node halted", node_id);
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }
    radio_device.set_crc(true);

    let mut state = RadioState::Rx;
    let mut rx_buffer = [0u8; MAX_FRAME_SIZE];
    let mut tx_count: u32 = 0;
    let mut rx_count: u32 = 0;
    let mut error_count: u32 = 0;

    log!(Level::Info, "[{:04X}] radio initialized, entering mesh mode", node_id);

    loop {
        state = match state {
            RadioState::Idle => {
                Timer::after(Duration::from_millis(100)).await;
                run_quiet_point(&mut core, &mut radio_device, &command_queue_receiver, &reply_queue_sender, &event_queue_sender).await;
                if core.has_pending_tx() {
                    RadioState::Tx
                } else {
                    RadioState::Rx
                }
            }

            RadioState::Tx => match core.dequeue_frame() {
                None => RadioState::Rx,
                Some(frame) => {
                    tx_count += 1;
                    log!(Level::Trace, "[{:04X}] TX #{} {:?}", node_id, tx_count, frame.as_str());
                    match radio_device.start_transmit(frame.as_bytes()) {
                        Err(_) => {
                            error_count += 1;
                            log!(Level::Warn, "[{:04X}] failed to start TX (errors={})", node_id, error_count);
                            RadioState::Idle
                        }
                        Ok(()) => match with_timeout(Duration::from_millis(TX_TIMEOUT_MS), radio_device.wait_operation_done()).await {
                            Ok(()) => RadioState::TxDone,
                            Err(_) => RadioState::TxTimeout,
                        },
                    }
                }
            },

            RadioState::TxDone => {
                radio_device.finish_transmit();
                if core.has_pending_tx() {
                    RadioState::Tx
                } else {
                    RadioState::Rx
                }
            }

            RadioState::TxTimeout => {
                error_count += 1;
                log!(Level::Warn, "[{:04X}] TX timeout (errors={})", node_id, error_count);
                radio_device.standby();
                Timer::after(Duration::from_millis(TX_BACKOFF_MS)).await;
                RadioState::Rx
            }

            RadioState::Rx => match radio_device.start_receive() {
                Err(_) => {
                    error_count += 1;
                    log!(Level::Warn, "[{:04X}] failed to start RX (errors={})", node_id, error_count);
                    RadioState::Idle
                }
                Ok(()) => match with_timeout(Duration::from_millis(RX_TIMEOUT_MS), radio_device.wait_operation_done()).await {
                    Err(_) => RadioState::RxTimeout,
                    Ok(()) => {
                        let length = radio_device.get_packet_length().min(MAX_FRAME_SIZE);
                        match radio_device.read(&mut rx_buffer[..length]) {
                            Err(_) => RadioState::RxError,
                            Ok(read_length) => {
                                rx_count += 1;
                                let rssi = radio_device.get_rssi();
                                let snr = radio_device.get_snr();
                                log!(Level::Trace, "[{:04X}] RX {} bytes (rx_count={})", node_id, read_length, rx_count);
                                core.handle_frame(&rx_buffer[..read_length], rssi, snr, now_ms());
                                RadioState::RxDone
                            }
                        }
                    }
                },
            },

            RadioState::RxDone => {
                radio_device.standby();
                run_quiet_point(&mut core, &mut radio_device, &command_queue_receiver, &reply_queue_sender, &event_queue_sender).await;
                if core.has_pending_tx() {
                    RadioState::Tx
                } else {
                    RadioState::Rx
                }
            }

            RadioState::RxTimeout => {
                radio_device.standby();
                run_quiet_point(&mut core, &mut radio_device, &command_queue_receiver, &reply_queue_sender, &event_queue_sender).await;
                if core.has_pending_tx() {
                    RadioState::Tx
                } else {
                    RadioState::Rx
                }
            }

            RadioState::RxError => {
                error_count += 1;
                log!(Level::Warn, "[{:04X}] RX error (errors={})", node_id, error_count);
                radio_device.standby();
                RadioState::Rx
            }
        };
    }
}
