//! SETUP packet and string encoding
//!
//! All multi-byte USB fields are little-endian. SETUP packets are exactly
//! [`SETUP_PACKET_SIZE`] bytes; anything else is rejected so the device core
//! can answer with a protocol stall.

use crate::error::{ProtocolError, Result};
use crate::setup::SetupPacket;
use crate::types::SETUP_PACKET_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Maximum UTF-16 code units in one string descriptor (bLength is a u8)
pub const MAX_STRING_UNITS: usize = (u8::MAX as usize - 2) / 2;

/// Decode a SETUP packet
///
/// # Example
/// ```
/// use protocol::decode_setup;
///
/// let setup = decode_setup(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]).unwrap();
/// assert_eq!(setup.value, 0x0100);
/// assert_eq!(setup.length, 18);
/// ```
pub fn decode_setup(bytes: &[u8]) -> Result<SetupPacket> {
    if bytes.len() != SETUP_PACKET_SIZE {
        return Err(ProtocolError::InvalidSetupLength {
            expected: SETUP_PACKET_SIZE,
            actual: bytes.len(),
        });
    }

    Ok(SetupPacket {
        request_type: bytes[0],
        request: bytes[1],
        value: LittleEndian::read_u16(&bytes[2..4]),
        index: LittleEndian::read_u16(&bytes[4..6]),
        length: LittleEndian::read_u16(&bytes[6..8]),
    })
}

/// Encode a SETUP packet into its 8-byte wire form
pub fn encode_setup(setup: &SetupPacket) -> [u8; SETUP_PACKET_SIZE] {
    let mut bytes = [0u8; SETUP_PACKET_SIZE];
    bytes[0] = setup.request_type;
    bytes[1] = setup.request;
    LittleEndian::write_u16(&mut bytes[2..4], setup.value);
    LittleEndian::write_u16(&mut bytes[4..6], setup.index);
    LittleEndian::write_u16(&mut bytes[6..8], setup.length);
    bytes
}

/// Write a string as UTF-16LE code units into `buf`
///
/// Returns the number of bytes written.
pub fn encode_utf16(text: &str, buf: &mut [u8]) -> Result<usize> {
    let units = text.encode_utf16().count();
    if units > MAX_STRING_UNITS {
        return Err(ProtocolError::StringTooLong {
            len: units,
            max: MAX_STRING_UNITS,
        });
    }

    let needed = units * 2;
    if buf.len() < needed {
        return Err(ProtocolError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }

    for (chunk, unit) in buf.chunks_exact_mut(2).zip(text.encode_utf16()) {
        LittleEndian::write_u16(chunk, unit);
    }
    Ok(needed)
}
