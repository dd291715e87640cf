//! Radio device implementations
//!
//! This module contains the radio device backends selectable by cargo
//! feature, all exposing the same half-duplex surface consumed by the node
//! state machine: `begin`, `set_frequency`, `set_crc`, `start_receive`,
//! `start_transmit`, `wait_operation_done`, `finish_transmit`, `standby`,
//! `read`, `get_packet_length`, `get_rssi`, `get_snr`.
//!
//! - `echo`: loopback device that replays transmitted frames back to the
//!   receiver, for single-node smoke testing
//! - `simulator`: channel-connected device driven by an external network
//!   simulator, for multi-node scenarios without hardware
//!
//! A hardware LoRa backend plugs in the same way; the modem driver itself
//! is outside this crate.

#[cfg(feature = "radio-device-echo")]
pub mod echo;

#[cfg(feature = "radio-device-simulator")]
pub mod simulator;

#[cfg(feature = "radio-device-echo")]
pub use echo::RadioDevice;

#[cfg(feature = "radio-device-simulator")]
pub use simulator::RadioDevice;

/// Radio device operation errors
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum RadioError {
    /// The driver rejected starting the requested operation
    StartFailed,
    /// No packet data was available to read
    ReadFailed,
}
