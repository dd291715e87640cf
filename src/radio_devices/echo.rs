//! # Radio Device Echo - Loopback Device for Testing
//!
//! The simplest possible radio backend: every transmitted frame is queued
//! internally and handed back on the next receive cycle, with a fixed,
//! perfect signal quality. No timing simulation, no network, single node
//! only.
//!
//! ## Use Cases
//!
//! - Smoke testing the state machine and frame codec without hardware
//! - Verifying that the node ignores its own transmissions
//! - Development on a workstation
//!
//! ## Behavior
//!
//! - `start_transmit` copies the frame into a small loopback queue
//!   (oldest frame dropped on overflow) and completes immediately
//! - a receive completes as soon as a loopbacked frame is available, and
//!   otherwise pends until the state machine's receive deadline fires

use log::{log, Level};

use crate::frame::MAX_FRAME_SIZE;
use crate::radio_devices::RadioError;
use crate::RadioParams;

/// Frames buffered between transmit and the next receive.
const ECHO_QUEUE_SIZE: usize = 4;

/// Signal quality reported for echoed frames.
const ECHO_RSSI_DBM: f32 = -42.0;
const ECHO_SNR_DB: f32 = 9.5;

#[derive(Clone)]
struct EchoFrame {
    data: [u8; MAX_FRAME_SIZE],
    length: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    None,
    Transmit,
    Receive,
}

/// Loopback radio device.
pub struct RadioDevice {
    loopback: heapless::Deque<EchoFrame, ECHO_QUEUE_SIZE>,
    current_rx: Option<EchoFrame>,
    op: PendingOp,
}

impl RadioDevice {
    pub const fn new() -> Self {
        RadioDevice {
            loopback: heapless::Deque::new(),
            current_rx: None,
            op: PendingOp::None,
        }
    }

    pub fn begin(&mut self, params: &RadioParams) -> Result<(), RadioError> {
        log!(
            Level::Info,
            "echo radio ready (freq={:.1} MHz sf={} bw={:.0} kHz)",
            params.frequency_mhz,
            params.spreading_factor,
            params.bandwidth_khz
        );
        Ok(())
    }

    pub fn set_crc(&mut self, _enabled: bool) {}

    pub fn set_frequency(&mut self, _freq_mhz: f32) -> Result<(), RadioError> {
        Ok(())
    }

    pub fn start_receive(&mut self) -> Result<(), RadioError> {
        self.current_rx = None;
        self.op = PendingOp::Receive;
        Ok(())
    }

    pub fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(RadioError::StartFailed);
        }
        let mut frame = EchoFrame {
            data: [0u8; MAX_FRAME_SIZE],
            length: bytes.len(),
        };
        frame.data[..bytes.len()].copy_from_slice(bytes);
        if self.loopback.is_full() {
            let _ = self.loopback.pop_front();
        }
        let _ = self.loopback.push_back(frame);
        self.op = PendingOp::Transmit;
        Ok(())
    }

    /// Completes immediately for a transmit; for a receive, completes when a
    /// loopbacked frame is pending and otherwise never (the caller's
    /// deadline recovers).
    pub async fn wait_operation_done(&mut self) {
        match self.op {
            PendingOp::Transmit => {}
            PendingOp::Receive => {
                if let Some(frame) = self.loopback.pop_front() {
                    self.current_rx = Some(frame);
                } else {
                    core::future::pending::<()>().await;
                }
            }
            PendingOp::None => {
                core::future::pending::<()>().await;
            }
        }
    }

    pub fn finish_transmit(&mut self) {
        self.op = PendingOp::None;
    }

    pub fn standby(&mut self) {
        self.op = PendingOp::None;
    }

    pub fn get_packet_length(&self) -> usize {
        self.current_rx.as_ref().map_or(0, |frame| frame.length)
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize, RadioError> {
        match &self.current_rx {
            Some(frame) => {
                let take = frame.length.min(buffer.len());
                buffer[..take].copy_from_slice(&frame.data[..take]);
                Ok(take)
            }
            None => Err(RadioError::ReadFailed),
        }
    }

    pub fn get_rssi(&self) -> f32 {
        ECHO_RSSI_DBM
    }

    pub fn get_snr(&self) -> f32 {
        ECHO_SNR_DB
    }
}

impl Default for RadioDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn transmit_then_receive_loops_back() {
        let mut radio = RadioDevice::new();
        assert!(radio.begin(&RadioParams::default()).is_ok());

        radio.start_transmit(b"H|0001|1|00010000|n|4|0|G ").unwrap();
        block_on(radio.wait_operation_done());
        radio.finish_transmit();

        radio.start_receive().unwrap();
        block_on(radio.wait_operation_done());
        assert_eq!(radio.get_packet_length(), 26);
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let length = radio.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..length], b"H|0001|1|00010000|n|4|0|G ");
    }

    #[test]
    fn read_without_packet_fails() {
        let mut radio = RadioDevice::new();
        let mut buffer = [0u8; 8];
        assert!(radio.read(&mut buffer).is_err());
    }
}
