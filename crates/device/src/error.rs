//! Device stack error types

use protocol::ProtocolError;
use thiserror::Error;

/// Errors reported by drivers and by device construction
///
/// None of these are fatal to a running device: the control state machine
/// turns them into a protocol stall for the current transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsbError {
    /// Buffer too small for a packet or descriptor
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Endpoint 0 max packet size is not 8, 16, 32 or 64
    #[error("Invalid endpoint 0 packet size: {0}")]
    InvalidPacketSize(u16),

    /// Endpoint number the hardware does not have
    #[error("Invalid endpoint address: {0:#04x}")]
    InvalidEndpoint(u8),

    /// Read or write on an endpoint that was never configured
    #[error("Endpoint {0:#04x} is not configured")]
    EndpointNotConfigured(u8),

    /// Packet memory cannot hold the requested endpoint buffer
    #[error("Packet memory exhausted configuring endpoint {ep:#04x} ({requested} bytes)")]
    PacketMemoryExhausted { ep: u8, requested: u16 },

    /// Descriptor or SETUP encoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Type alias for device stack results
pub type Result<T> = std::result::Result<T, UsbError>;
