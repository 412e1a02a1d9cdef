//! USB 2.0 chapter 9 protocol library
//!
//! This crate defines the wire vocabulary used by the device stack: the
//! SETUP packet and its codec, request type fields, standard request and
//! descriptor codes, and builders for the standard descriptors an
//! application hands to the device core.
//!
//! # Example
//!
//! ```
//! use protocol::{SetupPacket, Direction, Recipient, decode_setup, encode_setup};
//!
//! // GET_DESCRIPTOR(DEVICE), 18 bytes
//! let setup = SetupPacket::get_descriptor(protocol::descriptor_type::DEVICE, 0, 0, 18);
//! let bytes = encode_setup(&setup);
//!
//! let decoded = decode_setup(&bytes).unwrap();
//! assert_eq!(decoded.direction(), Direction::DeviceToHost);
//! assert_eq!(decoded.recipient(), Recipient::Device);
//! ```

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod serial;
pub mod setup;
pub mod types;
pub mod version;

pub use codec::{MAX_STRING_UNITS, decode_setup, encode_setup, encode_utf16};
pub use descriptor::{language_descriptor, max_power_ma, string_descriptor};
pub use error::{ProtocolError, Result};
pub use setup::SetupPacket;
pub use types::{
    Direction, EndpointAddress, EndpointType, INTERNAL_SERIAL_INDEX, MAX_ENDPOINTS,
    NO_DESCRIPTOR, Recipient, RequestKind, SETUP_PACKET_SIZE, StandardRequest, class,
    config_attributes, descriptor_type, feature, langid, request_type,
};
pub use version::{BcdVersion, USB_1_1, USB_2_0};
