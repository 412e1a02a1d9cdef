//! Standard descriptor builders
//!
//! The device core never interprets descriptors; it only forwards the bytes
//! an application's descriptor callback returns. These helpers produce the
//! byte layouts defined in USB 2.0 chapter 9 so descriptor tables don't have
//! to be written out by hand.
//!
//! # Example
//!
//! ```
//! use protocol::descriptor::{ConfigurationBuilder, EndpointDescriptor, InterfaceDescriptor};
//! use protocol::{EndpointAddress, EndpointType, class, config_attributes};
//!
//! let config = ConfigurationBuilder::new(1, config_attributes::RESERVED, 100)
//!     .interface(InterfaceDescriptor::new(0, 2, class::CDC_DATA, 0, 0))
//!     .endpoint(EndpointDescriptor::new(EndpointAddress::out_ep(1), EndpointType::Bulk, 64, 0))
//!     .endpoint(EndpointDescriptor::new(EndpointAddress::in_ep(1), EndpointType::Bulk, 64, 0))
//!     .build()
//!     .unwrap();
//!
//! // 9 (configuration) + 9 (interface) + 2 * 7 (endpoints)
//! assert_eq!(config.len(), 32);
//! assert_eq!(u16::from_le_bytes([config[2], config[3]]), 32);
//! ```

use crate::codec::{MAX_STRING_UNITS, encode_utf16};
use crate::error::{ProtocolError, Result};
use crate::types::{EndpointAddress, EndpointType, descriptor_type};
use crate::version::BcdVersion;
use bytes::BufMut;

/// Convert milliamps to the bMaxPower unit (2 mA), saturating at 510 mA
pub const fn max_power_ma(milliamps: u16) -> u8 {
    let units = milliamps >> 1;
    if units > u8::MAX as u16 {
        u8::MAX
    } else {
        units as u8
    }
}

/// Device descriptor (18 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub usb_version: BcdVersion,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: BcdVersion,
    pub manufacturer: u8,
    pub product: u8,
    pub serial_number: u8,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    pub const LENGTH: u8 = 18;

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::DEVICE);
        buf.put_u16_le(self.usb_version.to_bcd());
        buf.put_u8(self.class);
        buf.put_u8(self.subclass);
        buf.put_u8(self.protocol);
        buf.put_u8(self.max_packet_size0);
        buf.put_u16_le(self.vendor_id);
        buf.put_u16_le(self.product_id);
        buf.put_u16_le(self.device_version.to_bcd());
        buf.put_u8(self.manufacturer);
        buf.put_u8(self.product);
        buf.put_u8(self.serial_number);
        buf.put_u8(self.num_configurations);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LENGTH as usize);
        self.write_to(&mut buf);
        buf
    }
}

/// Device qualifier descriptor (10 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifierDescriptor {
    pub usb_version: BcdVersion,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub max_packet_size0: u8,
    pub num_configurations: u8,
}

impl QualifierDescriptor {
    pub const LENGTH: u8 = 10;

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::QUALIFIER);
        buf.put_u16_le(self.usb_version.to_bcd());
        buf.put_u8(self.class);
        buf.put_u8(self.subclass);
        buf.put_u8(self.protocol);
        buf.put_u8(self.max_packet_size0);
        buf.put_u8(self.num_configurations);
        buf.put_u8(0);
    }
}

/// Configuration descriptor header (9 bytes)
///
/// `total_length` and `num_interfaces` are normally filled in by
/// [`ConfigurationBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_string: u8,
    pub attributes: u8,
    pub max_power: u8,
}

impl ConfigurationDescriptor {
    pub const LENGTH: u8 = 9;

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::CONFIGURATION);
        buf.put_u16_le(self.total_length);
        buf.put_u8(self.num_interfaces);
        buf.put_u8(self.configuration_value);
        buf.put_u8(self.configuration_string);
        buf.put_u8(self.attributes);
        buf.put_u8(self.max_power);
    }
}

/// Interface descriptor (9 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub interface_string: u8,
}

impl InterfaceDescriptor {
    pub const LENGTH: u8 = 9;

    pub fn new(interface_number: u8, num_endpoints: u8, class: u8, subclass: u8, protocol: u8) -> Self {
        Self {
            interface_number,
            alternate_setting: 0,
            num_endpoints,
            class,
            subclass,
            protocol,
            interface_string: crate::types::NO_DESCRIPTOR,
        }
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::INTERFACE);
        buf.put_u8(self.interface_number);
        buf.put_u8(self.alternate_setting);
        buf.put_u8(self.num_endpoints);
        buf.put_u8(self.class);
        buf.put_u8(self.subclass);
        buf.put_u8(self.protocol);
        buf.put_u8(self.interface_string);
    }
}

/// Interface association descriptor (8 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAssociationDescriptor {
    pub first_interface: u8,
    pub interface_count: u8,
    pub function_class: u8,
    pub function_subclass: u8,
    pub function_protocol: u8,
    pub function_string: u8,
}

impl InterfaceAssociationDescriptor {
    pub const LENGTH: u8 = 8;

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::INTERFACE_ASSOCIATION);
        buf.put_u8(self.first_interface);
        buf.put_u8(self.interface_count);
        buf.put_u8(self.function_class);
        buf.put_u8(self.function_subclass);
        buf.put_u8(self.function_protocol);
        buf.put_u8(self.function_string);
    }
}

/// Endpoint descriptor (7 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: EndpointAddress,
    /// Transfer type plus synchronisation/usage bits
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub const LENGTH: u8 = 7;

    pub fn new(address: EndpointAddress, kind: EndpointType, max_packet_size: u16, interval: u8) -> Self {
        Self {
            address,
            attributes: kind.attributes(),
            max_packet_size,
            interval,
        }
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::ENDPOINT);
        buf.put_u8(self.address.0);
        buf.put_u8(self.attributes);
        buf.put_u16_le(self.max_packet_size);
        buf.put_u8(self.interval);
    }
}

/// Debug descriptor (4 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugDescriptor {
    pub debug_in_endpoint: u8,
    pub debug_out_endpoint: u8,
}

impl DebugDescriptor {
    pub const LENGTH: u8 = 4;

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(Self::LENGTH);
        buf.put_u8(descriptor_type::DEBUG);
        buf.put_u8(self.debug_in_endpoint);
        buf.put_u8(self.debug_out_endpoint);
    }
}

/// Build a string descriptor from UTF-8 text
pub fn string_descriptor(text: &str) -> Result<Vec<u8>> {
    let units = text.encode_utf16().count();
    if units > MAX_STRING_UNITS {
        return Err(ProtocolError::StringTooLong {
            len: units,
            max: MAX_STRING_UNITS,
        });
    }

    let mut buf = vec![0u8; 2 + units * 2];
    buf[0] = buf.len() as u8;
    buf[1] = descriptor_type::STRING;
    encode_utf16(text, &mut buf[2..])?;
    Ok(buf)
}

/// Build string descriptor zero listing the supported LANGIDs
pub fn language_descriptor(languages: &[u16]) -> Result<Vec<u8>> {
    if languages.len() > MAX_STRING_UNITS {
        return Err(ProtocolError::StringTooLong {
            len: languages.len(),
            max: MAX_STRING_UNITS,
        });
    }

    let mut buf = Vec::with_capacity(2 + languages.len() * 2);
    buf.put_u8((2 + languages.len() * 2) as u8);
    buf.put_u8(descriptor_type::STRING);
    for &language in languages {
        buf.put_u16_le(language);
    }
    Ok(buf)
}

/// Assembles a configuration descriptor with its interface, endpoint and
/// class-specific descriptors, patching wTotalLength and bNumInterfaces
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    header: ConfigurationDescriptor,
    body: Vec<u8>,
}

impl ConfigurationBuilder {
    pub fn new(configuration_value: u8, attributes: u8, max_power_milliamps: u16) -> Self {
        Self {
            header: ConfigurationDescriptor {
                total_length: 0,
                num_interfaces: 0,
                configuration_value,
                configuration_string: crate::types::NO_DESCRIPTOR,
                attributes,
                max_power: max_power_ma(max_power_milliamps),
            },
            body: Vec::new(),
        }
    }

    pub fn configuration_string(mut self, index: u8) -> Self {
        self.header.configuration_string = index;
        self
    }

    /// Append an interface; only alternate setting 0 counts towards bNumInterfaces
    pub fn interface(mut self, interface: InterfaceDescriptor) -> Self {
        if interface.alternate_setting == 0 {
            self.header.num_interfaces = self.header.num_interfaces.saturating_add(1);
        }
        interface.write_to(&mut self.body);
        self
    }

    pub fn association(mut self, association: InterfaceAssociationDescriptor) -> Self {
        association.write_to(&mut self.body);
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        endpoint.write_to(&mut self.body);
        self
    }

    /// Append a pre-encoded class-specific descriptor
    pub fn raw(mut self, descriptor: &[u8]) -> Self {
        self.body.put_slice(descriptor);
        self
    }

    pub fn build(mut self) -> Result<Vec<u8>> {
        let size = ConfigurationDescriptor::LENGTH as usize + self.body.len();
        if size > u16::MAX as usize {
            return Err(ProtocolError::DescriptorTooLarge {
                size,
                max: u16::MAX as usize,
            });
        }
        self.header.total_length = size as u16;

        let mut buf = Vec::with_capacity(size);
        self.header.write_to(&mut buf);
        buf.put_slice(&self.body);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{class, config_attributes, langid};
    use crate::version::USB_2_0;

    fn test_device_descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            usb_version: USB_2_0,
            class: class::CDC,
            subclass: 0,
            protocol: 0,
            max_packet_size0: 8,
            vendor_id: 0x0483,
            product_id: 0x5740,
            device_version: BcdVersion::new(1, 0, 0),
            manufacturer: 1,
            product: 2,
            serial_number: crate::types::INTERNAL_SERIAL_INDEX,
            num_configurations: 1,
        }
    }

    #[test]
    fn test_device_descriptor_layout() {
        let bytes = test_device_descriptor().to_bytes();

        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[0], 18);
        assert_eq!(bytes[1], descriptor_type::DEVICE);
        assert_eq!(&bytes[2..4], &[0x00, 0x02]);
        assert_eq!(bytes[7], 8);
        assert_eq!(&bytes[8..10], &[0x83, 0x04]);
        assert_eq!(&bytes[10..12], &[0x40, 0x57]);
        assert_eq!(bytes[16], 0xFE);
        assert_eq!(bytes[17], 1);
    }

    #[test]
    fn test_qualifier_layout() {
        let mut bytes = Vec::new();
        QualifierDescriptor {
            usb_version: USB_2_0,
            class: 0,
            subclass: 0,
            protocol: 0,
            max_packet_size0: 64,
            num_configurations: 1,
        }
        .write_to(&mut bytes);

        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[1], descriptor_type::QUALIFIER);
        assert_eq!(bytes[9], 0);
    }

    #[test]
    fn test_string_descriptor() {
        let desc = string_descriptor("USB").unwrap();
        assert_eq!(desc, vec![8, 3, b'U', 0, b'S', 0, b'B', 0]);
    }

    #[test]
    fn test_string_descriptor_non_ascii() {
        // U+00E9 is one UTF-16 unit
        let desc = string_descriptor("é").unwrap();
        assert_eq!(desc, vec![4, 3, 0xE9, 0x00]);
    }

    #[test]
    fn test_string_descriptor_limit() {
        assert!(string_descriptor(&"a".repeat(126)).is_ok());
        assert!(matches!(
            string_descriptor(&"a".repeat(127)),
            Err(ProtocolError::StringTooLong { len: 127, max: 126 })
        ));
    }

    #[test]
    fn test_language_descriptor() {
        let desc = language_descriptor(&[langid::ENGLISH_US]).unwrap();
        assert_eq!(desc, vec![4, 3, 0x09, 0x04]);
    }

    #[test]
    fn test_max_power() {
        assert_eq!(max_power_ma(100), 50);
        assert_eq!(max_power_ma(500), 250);
        assert_eq!(max_power_ma(2000), 255);
    }

    #[test]
    fn test_configuration_builder_counts_interfaces() {
        let mut alt = InterfaceDescriptor::new(0, 0, class::AUDIO, 2, 0);
        alt.alternate_setting = 1;

        let config = ConfigurationBuilder::new(1, config_attributes::RESERVED, 100)
            .association(InterfaceAssociationDescriptor {
                first_interface: 0,
                interface_count: 2,
                function_class: class::CDC,
                function_subclass: 2,
                function_protocol: 1,
                function_string: 0,
            })
            .interface(InterfaceDescriptor::new(0, 1, class::CDC, 2, 1))
            .raw(&[5, descriptor_type::CS_INTERFACE, 0x00, 0x10, 0x01])
            .endpoint(EndpointDescriptor::new(
                EndpointAddress::in_ep(2),
                EndpointType::Interrupt,
                8,
                0xFF,
            ))
            .interface(InterfaceDescriptor::new(1, 0, class::CDC_DATA, 0, 0))
            .interface(alt)
            .build()
            .unwrap();

        let expected_len = 9 + 8 + 9 + 5 + 7 + 9 + 9;
        assert_eq!(config.len(), expected_len);
        assert_eq!(u16::from_le_bytes([config[2], config[3]]) as usize, expected_len);
        assert_eq!(config[4], 2, "alternate settings must not be counted");
        assert_eq!(config[5], 1);
        assert_eq!(config[8], 50);
    }

    #[test]
    fn test_endpoint_descriptor_layout() {
        let mut bytes = Vec::new();
        EndpointDescriptor::new(EndpointAddress(0x81), EndpointType::Bulk, 512, 0).write_to(&mut bytes);
        assert_eq!(bytes, vec![7, 5, 0x81, 0x02, 0x00, 0x02, 0]);
    }

    #[test]
    fn test_debug_descriptor_layout() {
        let mut bytes = Vec::new();
        DebugDescriptor {
            debug_in_endpoint: 0x82,
            debug_out_endpoint: 0x02,
        }
        .write_to(&mut bytes);
        assert_eq!(bytes, vec![4, descriptor_type::DEBUG, 0x82, 0x02]);
    }
}
