//! USB chapter 9 type definitions
//!
//! This module defines the vocabulary shared by the device core and the
//! application descriptor tables: request type fields, standard request
//! codes, descriptor types, endpoint addressing and class codes.

use serde::{Deserialize, Serialize};

/// Size of the SETUP packet that opens every control transfer
pub const SETUP_PACKET_SIZE: usize = 8;

/// Number of endpoint slots (0-7) addressable by a full-speed device
pub const MAX_ENDPOINTS: usize = 8;

/// String index meaning "no string descriptor"
pub const NO_DESCRIPTOR: u8 = 0x00;

/// String index reserved for the serial number generated by the driver
/// from the chip's unique hardware ID
pub const INTERNAL_SERIAL_INDEX: u8 = 0xFE;

/// Data stage direction (bmRequestType bit 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// OUT - host to device
    HostToDevice,
    /// IN - device to host
    DeviceToHost,
}

/// Request type (bmRequestType bits 6..5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Request recipient (bmRequestType bits 4..0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// bmRequestType bit masks
pub mod request_type {
    pub const DIRECTION_MASK: u8 = 0x80;
    pub const DEVICE_TO_HOST: u8 = 0x80;
    pub const HOST_TO_DEVICE: u8 = 0x00;

    pub const TYPE_MASK: u8 = 0x60;
    pub const STANDARD: u8 = 0x00;
    pub const CLASS: u8 = 0x20;
    pub const VENDOR: u8 = 0x40;

    pub const RECIPIENT_MASK: u8 = 0x1F;
    pub const DEVICE: u8 = 0x00;
    pub const INTERFACE: u8 = 0x01;
    pub const ENDPOINT: u8 = 0x02;
    pub const OTHER: u8 = 0x03;
}

/// Standard request codes (bRequest)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

impl StandardRequest {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::GetStatus),
            0x01 => Some(Self::ClearFeature),
            0x03 => Some(Self::SetFeature),
            0x05 => Some(Self::SetAddress),
            0x06 => Some(Self::GetDescriptor),
            0x07 => Some(Self::SetDescriptor),
            0x08 => Some(Self::GetConfiguration),
            0x09 => Some(Self::SetConfiguration),
            0x0A => Some(Self::GetInterface),
            0x0B => Some(Self::SetInterface),
            0x0C => Some(Self::SynchFrame),
            _ => None,
        }
    }
}

/// Feature selectors for SET_FEATURE / CLEAR_FEATURE
pub mod feature {
    pub const ENDPOINT_HALT: u16 = 0x00;
    pub const DEVICE_REMOTE_WAKEUP: u16 = 0x01;
    pub const TEST_MODE: u16 = 0x02;
}

/// Standard descriptor type codes
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const QUALIFIER: u8 = 0x06;
    pub const OTHER: u8 = 0x07;
    pub const INTERFACE_POWER: u8 = 0x08;
    pub const OTG: u8 = 0x09;
    pub const DEBUG: u8 = 0x0A;
    pub const INTERFACE_ASSOCIATION: u8 = 0x0B;
    pub const CS_INTERFACE: u8 = 0x24;
    pub const CS_ENDPOINT: u8 = 0x25;
}

/// Device and interface class codes
pub mod class {
    pub const PER_INTERFACE: u8 = 0x00;
    pub const AUDIO: u8 = 0x01;
    pub const CDC: u8 = 0x02;
    pub const HID: u8 = 0x03;
    pub const PHYSICAL: u8 = 0x05;
    pub const STILL_IMAGE: u8 = 0x06;
    pub const PRINTER: u8 = 0x07;
    pub const MASS_STORAGE: u8 = 0x08;
    pub const HUB: u8 = 0x09;
    pub const CDC_DATA: u8 = 0x0A;
    pub const SMART_CARD: u8 = 0x0B;
    pub const CONTENT_SECURITY: u8 = 0x0D;
    pub const VIDEO: u8 = 0x0E;
    pub const HEALTHCARE: u8 = 0x0F;
    pub const AUDIO_VIDEO: u8 = 0x10;
    pub const BILLBOARD: u8 = 0x11;
    pub const TYPE_C_BRIDGE: u8 = 0x12;
    pub const DIAGNOSTIC: u8 = 0xDC;
    pub const WIRELESS: u8 = 0xE0;
    pub const MISC: u8 = 0xEF;
    pub const APPLICATION_SPECIFIC: u8 = 0xFE;
    pub const VENDOR: u8 = 0xFF;

    pub const SUBCLASS_NONE: u8 = 0x00;
    pub const SUBCLASS_VENDOR: u8 = 0xFF;
    pub const PROTOCOL_NONE: u8 = 0x00;
    pub const PROTOCOL_VENDOR: u8 = 0xFF;
}

/// Configuration descriptor bmAttributes bits
pub mod config_attributes {
    /// Must always be set
    pub const RESERVED: u8 = 0x80;
    pub const SELF_POWERED: u8 = 0x40;
    pub const REMOTE_WAKEUP: u8 = 0x20;
}

/// Endpoint transfer type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointType {
    Control = 0x00,
    Isochronous = 0x01,
    Bulk = 0x02,
    Interrupt = 0x03,
}

impl EndpointType {
    /// Transfer type bits of an endpoint descriptor's bmAttributes
    pub fn attributes(self) -> u8 {
        self as u8
    }
}

/// Endpoint address: number in bits 3..0, direction in bit 7
///
/// The IN and OUT halves of one endpoint number share a callback slot,
/// so 0x01 and 0x81 have the same [`EndpointAddress::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress(pub u8);

impl EndpointAddress {
    /// Direction bit
    pub const IN: u8 = 0x80;

    /// Control endpoint, OUT half
    pub const EP0_OUT: EndpointAddress = EndpointAddress(0x00);
    /// Control endpoint, IN half
    pub const EP0_IN: EndpointAddress = EndpointAddress(0x80);

    pub const fn in_ep(number: u8) -> Self {
        Self((number & 0x0F) | Self::IN)
    }

    pub const fn out_ep(number: u8) -> Self {
        Self(number & 0x0F)
    }

    /// Endpoint number without the direction bit
    pub const fn number(self) -> u8 {
        self.0 & 0x0F
    }

    /// Callback table slot (number masked to 0-7)
    pub const fn index(self) -> usize {
        (self.0 & 0x07) as usize
    }

    pub const fn is_in(self) -> bool {
        self.0 & Self::IN != 0
    }

    /// Same endpoint number, IN direction
    pub const fn in_dir(self) -> Self {
        Self(self.0 | Self::IN)
    }

    /// Same endpoint number, OUT direction
    pub const fn out_dir(self) -> Self {
        Self(self.0 & !Self::IN)
    }
}

impl From<u8> for EndpointAddress {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<EndpointAddress> for u8 {
    fn from(value: EndpointAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Common USB language identifiers for string descriptor zero
pub mod langid {
    pub const ENGLISH_US: u16 = 0x0409;
    pub const ENGLISH_UK: u16 = 0x0809;
    pub const GERMAN: u16 = 0x0407;
    pub const FRENCH: u16 = 0x040C;
    pub const SPANISH_MODERN: u16 = 0x0C0A;
    pub const ITALIAN: u16 = 0x0410;
    pub const PORTUGUESE_BRAZIL: u16 = 0x0416;
    pub const RUSSIAN: u16 = 0x0419;
    pub const UKRAINIAN: u16 = 0x0422;
    pub const POLISH: u16 = 0x0415;
    pub const DUTCH: u16 = 0x0413;
    pub const SWEDISH: u16 = 0x041D;
    pub const JAPANESE: u16 = 0x0411;
    pub const KOREAN: u16 = 0x0412;
    pub const CHINESE_PRC: u16 = 0x0804;
    pub const CHINESE_TAIWAN: u16 = 0x0404;
}
