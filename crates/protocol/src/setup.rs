//! SETUP packet definition
//!
//! Every control transfer starts with an 8-byte SETUP packet. The packet is
//! immutable for the lifetime of the transfer; the optional data stage is
//! held separately by the device core.

use crate::types::{
    Direction, EndpointAddress, Recipient, RequestKind, StandardRequest, descriptor_type,
    request_type,
};
use serde::{Deserialize, Serialize};

/// Decoded SETUP packet
///
/// ```text
/// offset  field          size
/// 0       bmRequestType  1
/// 1       bRequest       1
/// 2       wValue         2 (LE)
/// 4       wIndex         2 (LE)
/// 6       wLength        2 (LE)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetupPacket {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

impl SetupPacket {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Standard GET_DESCRIPTOR request addressed to the device
    pub fn get_descriptor(kind: u8, descriptor_index: u8, language: u16, length: u16) -> Self {
        Self::new(
            request_type::DEVICE_TO_HOST | request_type::STANDARD | request_type::DEVICE,
            StandardRequest::GetDescriptor as u8,
            ((kind as u16) << 8) | descriptor_index as u16,
            language,
            length,
        )
    }

    /// Standard SET_ADDRESS request
    pub fn set_address(address: u8) -> Self {
        Self::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::DEVICE,
            StandardRequest::SetAddress as u8,
            address as u16,
            0,
            0,
        )
    }

    /// Standard SET_CONFIGURATION request
    pub fn set_configuration(configuration: u8) -> Self {
        Self::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::DEVICE,
            StandardRequest::SetConfiguration as u8,
            configuration as u16,
            0,
            0,
        )
    }

    /// Standard GET_STATUS request for the given recipient
    pub fn get_status(recipient: u8, index: u16) -> Self {
        Self::new(
            request_type::DEVICE_TO_HOST | request_type::STANDARD | recipient,
            StandardRequest::GetStatus as u8,
            0,
            index,
            2,
        )
    }

    /// Standard SET_FEATURE(ENDPOINT_HALT) / CLEAR_FEATURE(ENDPOINT_HALT)
    pub fn endpoint_halt(endpoint: EndpointAddress, halt: bool) -> Self {
        let request = if halt {
            StandardRequest::SetFeature
        } else {
            StandardRequest::ClearFeature
        };
        Self::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::ENDPOINT,
            request as u8,
            crate::types::feature::ENDPOINT_HALT,
            endpoint.0 as u16,
            0,
        )
    }

    /// Data stage direction
    pub fn direction(&self) -> Direction {
        if self.request_type & request_type::DIRECTION_MASK != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }

    pub fn is_device_to_host(&self) -> bool {
        self.direction() == Direction::DeviceToHost
    }

    pub fn kind(&self) -> RequestKind {
        match self.request_type & request_type::TYPE_MASK {
            request_type::STANDARD => RequestKind::Standard,
            request_type::CLASS => RequestKind::Class,
            request_type::VENDOR => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & request_type::RECIPIENT_MASK {
            request_type::DEVICE => Recipient::Device,
            request_type::INTERFACE => Recipient::Interface,
            request_type::ENDPOINT => Recipient::Endpoint,
            request_type::OTHER => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    /// bRequest as a standard request code, if it is one
    pub fn standard_request(&self) -> Option<StandardRequest> {
        if self.kind() == RequestKind::Standard {
            StandardRequest::from_u8(self.request)
        } else {
            None
        }
    }

    /// Descriptor type of a GET_DESCRIPTOR request (high byte of wValue)
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Descriptor index of a GET_DESCRIPTOR request (low byte of wValue)
    pub fn descriptor_index(&self) -> u8 {
        (self.value & 0xFF) as u8
    }

    /// True for GET_DESCRIPTOR(STRING, index)
    pub fn is_string_request(&self, index: u8) -> bool {
        self.descriptor_type() == descriptor_type::STRING && self.descriptor_index() == index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_fields() {
        let setup = SetupPacket::new(0xA1, 0x21, 0, 0, 7);

        assert_eq!(setup.direction(), Direction::DeviceToHost);
        assert_eq!(setup.kind(), RequestKind::Class);
        assert_eq!(setup.recipient(), Recipient::Interface);
        assert_eq!(setup.standard_request(), None);
    }

    #[test]
    fn test_get_descriptor_builder() {
        let setup = SetupPacket::get_descriptor(descriptor_type::DEVICE, 0, 0, 18);

        assert_eq!(setup.request_type, 0x80);
        assert_eq!(setup.request, 6);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.length, 18);
        assert_eq!(setup.descriptor_type(), descriptor_type::DEVICE);
        assert_eq!(setup.descriptor_index(), 0);
    }

    #[test]
    fn test_serial_string_request() {
        let setup = SetupPacket::get_descriptor(
            descriptor_type::STRING,
            crate::INTERNAL_SERIAL_INDEX,
            0x0409,
            255,
        );
        assert!(setup.is_string_request(0xFE));
        assert!(!setup.is_string_request(1));
    }

    #[test]
    fn test_endpoint_halt_builder() {
        let set = SetupPacket::endpoint_halt(EndpointAddress(0x81), true);
        let clear = SetupPacket::endpoint_halt(EndpointAddress(0x81), false);

        assert_eq!(set.request_type, 0x02);
        assert_eq!(set.standard_request(), Some(StandardRequest::SetFeature));
        assert_eq!(clear.standard_request(), Some(StandardRequest::ClearFeature));
        assert_eq!(set.index, 0x81);
        assert_eq!(set.recipient(), Recipient::Endpoint);
    }
}
