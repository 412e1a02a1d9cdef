//! Serial number string generated from a chip's unique hardware ID
//!
//! Drivers implement the internal serial number string
//! ([`crate::INTERNAL_SERIAL_INDEX`]) by folding the unique-ID registers with
//! 32-bit FNV-1a and rendering the hash as eight upper-case hex digits.
//!
//! ```
//! use protocol::serial::{fnv1a32, serial_descriptor, SERIAL_DESCRIPTOR_LENGTH};
//!
//! let hash = fnv1a32(&[0x0032_0041, 0x3235_5102, 0x2036_3331]);
//! let mut buf = [0u8; 32];
//! let len = serial_descriptor(hash, &mut buf).unwrap();
//! assert_eq!(len, SERIAL_DESCRIPTOR_LENGTH);
//! ```

use crate::error::{ProtocolError, Result};
use crate::types::descriptor_type;
use byteorder::{ByteOrder, LittleEndian};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// bLength of the generated descriptor: header plus 8 UTF-16 digits
pub const SERIAL_DESCRIPTOR_LENGTH: usize = 2 + 8 * 2;

/// FNV-1a over 32-bit words, least significant byte of each word first
pub fn fnv1a32(words: &[u32]) -> u32 {
    words.iter().fold(FNV_OFFSET_BASIS, |hash, &word| {
        word.to_le_bytes()
            .iter()
            .fold(hash, |h, &b| (h ^ b as u32).wrapping_mul(FNV_PRIME))
    })
}

/// Write the serial number string descriptor for `hash` into `buf`
pub fn serial_descriptor(hash: u32, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < SERIAL_DESCRIPTOR_LENGTH {
        return Err(ProtocolError::BufferTooSmall {
            needed: SERIAL_DESCRIPTOR_LENGTH,
            available: buf.len(),
        });
    }

    buf[0] = SERIAL_DESCRIPTOR_LENGTH as u8;
    buf[1] = descriptor_type::STRING;
    for (i, chunk) in buf[2..SERIAL_DESCRIPTOR_LENGTH].chunks_exact_mut(2).enumerate() {
        let nibble = (hash >> (28 - i * 4)) & 0x0F;
        let digit = match nibble {
            0..=9 => b'0' + nibble as u8,
            _ => b'A' + (nibble - 10) as u8,
        };
        LittleEndian::write_u16(chunk, digit as u16);
    }
    Ok(SERIAL_DESCRIPTOR_LENGTH)
}
