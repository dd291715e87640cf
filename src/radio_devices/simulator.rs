//! # Radio Device Simulator - Multi-Node Testing Mock
//!
//! A radio backend wired to an external network simulator through a pair of
//! channels, so whole meshes can run in one process without hardware.
//!
//! ## Architecture
//!
//! - **Output queue**: frames this node transmits, plus frequency changes,
//!   delivered to the simulator which owns topology and channel modelling
//! - **Input queue**: frames the simulator decides this node hears,
//!   stamped with the simulated signal quality
//!
//! The simulator decides who hears what: topology, loss, collisions and
//! channel mismatch all live on the other side of the queues, which keeps
//! this device a thin adapter with the same surface as a hardware backend.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{log, Level};

use crate::frame::MAX_FRAME_SIZE;
use crate::radio_devices::RadioError;
use crate::RadioParams;

/// Queue depth between the device and the network simulator.
pub const SIM_QUEUE_SIZE: usize = 8;

/// One frame on the simulated air, with its received signal quality.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct AirFrame {
    pub data: [u8; MAX_FRAME_SIZE],
    pub length: usize,
    pub rssi: f32,
    pub snr: f32,
}

impl AirFrame {
    pub fn from_bytes(bytes: &[u8], rssi: f32, snr: f32) -> Self {
        let mut frame = AirFrame {
            data: [0u8; MAX_FRAME_SIZE],
            length: bytes.len().min(MAX_FRAME_SIZE),
            rssi,
            snr,
        };
        frame.data[..frame.length].copy_from_slice(&bytes[..frame.length]);
        frame
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }
}

/// Messages sent from the radio device to the network simulator.
#[cfg_attr(feature = "std", derive(Debug))]
pub enum RadioOutputMessage {
    /// This node put a frame on the air.
    TransmitFrame(AirFrame),
    /// This node retuned to a new frequency.
    SetFrequency(f32),
}

pub type RadioOutputQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, RadioOutputMessage, SIM_QUEUE_SIZE>;
pub type RadioOutputQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RadioOutputMessage, SIM_QUEUE_SIZE>;
pub type RadioOutputQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RadioOutputMessage, SIM_QUEUE_SIZE>;

pub type RadioInputQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, AirFrame, SIM_QUEUE_SIZE>;
pub type RadioInputQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, AirFrame, SIM_QUEUE_SIZE>;
pub type RadioInputQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, AirFrame, SIM_QUEUE_SIZE>;

/// Simulated radio device.
pub struct RadioDevice {
    output_queue_sender: RadioOutputQueueSender,
    input_queue_receiver: RadioInputQueueReceiver,
    current_rx: Option<AirFrame>,
    transmitting: bool,
}

impl RadioDevice {
    /// Builds a device from the queue endpoints shared with the simulator.
    pub const fn with(output_queue_sender: RadioOutputQueueSender, input_queue_receiver: RadioInputQueueReceiver) -> Self {
        RadioDevice {
            output_queue_sender,
            input_queue_receiver,
            current_rx: None,
            transmitting: false,
        }
    }

    pub fn begin(&mut self, params: &RadioParams) -> Result<(), RadioError> {
        log!(Level::Info, "simulated radio ready (freq={:.1} MHz)", params.frequency_mhz);
        Ok(())
    }

    pub fn set_crc(&mut self, _enabled: bool) {}

    pub fn set_frequency(&mut self, freq_mhz: f32) -> Result<(), RadioError> {
        if self.output_queue_sender.try_send(RadioOutputMessage::SetFrequency(freq_mhz)).is_err() {
            log!(Level::Warn, "simulator queue full, dropping frequency change");
        }
        Ok(())
    }

    pub fn start_receive(&mut self) -> Result<(), RadioError> {
        self.current_rx = None;
        self.transmitting = false;
        Ok(())
    }

    pub fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(RadioError::StartFailed);
        }
        let frame = AirFrame::from_bytes(bytes, 0.0, 0.0);
        if self.output_queue_sender.try_send(RadioOutputMessage::TransmitFrame(frame)).is_err() {
            return Err(RadioError::StartFailed);
        }
        self.transmitting = true;
        Ok(())
    }

    /// Transmits complete as soon as the simulator has taken the frame;
    /// receives complete when the simulator delivers one.
    pub async fn wait_operation_done(&mut self) {
        if self.transmitting {
            return;
        }
        let frame = self.input_queue_receiver.receive().await;
        self.current_rx = Some(frame);
    }

    pub fn finish_transmit(&mut self) {
        self.transmitting = false;
    }

    pub fn standby(&mut self) {
        self.transmitting = false;
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
        self.current_rx.as_ref().map_or(0.0, |frame| frame.rssi)
    }

    pub fn get_snr(&self) -> f32 {
        self.current_rx.as_ref().map_or(0.0, |frame| frame.snr)
    }
}
