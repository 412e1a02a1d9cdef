//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding USB chapter 9 structures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A SETUP packet was not exactly 8 bytes long
    #[error("Invalid SETUP packet length: expected {expected} bytes, got {actual}")]
    InvalidSetupLength { expected: usize, actual: usize },

    /// Buffer too small for operation
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// String does not fit in a single string descriptor
    #[error("String too long for a descriptor: {len} UTF-16 units (max: {max})")]
    StringTooLong { len: usize, max: usize },

    /// Descriptor tree exceeds what wTotalLength can express
    #[error("Descriptor too large: {size} bytes (max: {max})")]
    DescriptorTooLarge { size: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
