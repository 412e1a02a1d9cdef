//! USB 2.0 full-speed device core
//!
//! This crate implements the device side of USB enumeration and control
//! transfers on top of a small [`Driver`] contract:
//!
//! - [`control`]: the endpoint 0 control transfer state machine
//! - [`Device`]: the device object, callback registration and event dispatch
//! - [`request`]: the types class drivers use to answer control requests
//! - [`test_utils`]: an in-memory driver and host-side transfer helpers
//!
//! # Example
//!
//! ```
//! use device::{Device, Response};
//! use device::test_utils::{MockDriver, bus_reset, run_control_in};
//! use protocol::{SetupPacket, request_type};
//!
//! static VERSION: &[u8] = &[1, 4];
//!
//! let mut dev = Device::new(MockDriver::new(), 64, 8 + 64).unwrap();
//! dev.register_control(|ctx| {
//!     if ctx.setup().request_type == request_type::DEVICE_TO_HOST | request_type::VENDOR {
//!         return ctx.reply_static(VERSION);
//!     }
//!     Response::Fail
//! });
//! bus_reset(&mut dev);
//!
//! let setup = SetupPacket::new(request_type::DEVICE_TO_HOST | request_type::VENDOR, 1, 0, 0, 2);
//! assert_eq!(run_control_in(&mut dev, setup).data(), Some(VERSION));
//! ```

pub mod control;
pub mod device;
pub mod driver;
pub mod error;
pub mod request;
mod router;
pub mod test_utils;

pub use control::{ControlState, ControlStatus};
pub use device::{Command, Device, DeviceState};
pub use driver::{Driver, DriverInfo, Event, Speed};
pub use error::{Result, UsbError};
pub use request::{CompletionHandler, ControlContext, Response};
