//! Common utilities for the USB device stack
//!
//! This crate provides the ambient pieces shared by the device core and the
//! firmware built on it: error handling, tracing setup and the device
//! configuration format.

pub mod config;
pub mod error;
pub mod logging;

pub use config::DeviceConfig;
pub use error::{Error, Result};
pub use logging::{init_test_logging, setup_logging};
