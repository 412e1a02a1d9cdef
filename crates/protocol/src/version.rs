//! Binary-coded-decimal version numbers
//!
//! Used by `bcdUSB` and `bcdDevice`: major in the high byte, minor and
//! revision in one nibble each.

use serde::{Deserialize, Serialize};

/// Version encoded as 0xJJMN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BcdVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

/// USB 2.0
pub const USB_2_0: BcdVersion = BcdVersion::new(2, 0, 0);

/// USB 1.1
pub const USB_1_1: BcdVersion = BcdVersion::new(1, 1, 0);

impl BcdVersion {
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Encode to the descriptor field; minor and revision keep their low nibble
    pub const fn to_bcd(self) -> u16 {
        ((self.major as u16) << 8) | (((self.minor & 0x0F) as u16) << 4) | (self.revision & 0x0F) as u16
    }

    pub const fn from_bcd(bcd: u16) -> Self {
        Self {
            major: (bcd >> 8) as u8,
            minor: ((bcd >> 4) & 0x0F) as u8,
            revision: (bcd & 0x0F) as u8,
        }
    }
}

impl From<BcdVersion> for u16 {
    fn from(version: BcdVersion) -> Self {
        version.to_bcd()
    }
}
