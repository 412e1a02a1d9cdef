//! Device configuration
//!
//! ```toml
//! ep0_size = 64
//! buffer_size = 264
//! log_level = "debug"
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Size of the SETUP header at the front of the control buffer
const SETUP_HEADER_SIZE: usize = 8;

/// Max packet sizes a full-speed control endpoint may use
pub const VALID_EP0_SIZES: [u8; 4] = [8, 16, 32, 64];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Endpoint 0 max packet size (bMaxPacketSize0)
    #[serde(default = "DeviceConfig::default_ep0_size")]
    pub ep0_size: u8,
    /// Total control buffer size, SETUP header included
    #[serde(default = "DeviceConfig::default_buffer_size")]
    pub buffer_size: usize,
    /// Default tracing filter, passed to [`crate::setup_logging`]
    #[serde(default = "DeviceConfig::default_log_level")]
    pub log_level: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ep0_size: Self::default_ep0_size(),
            buffer_size: Self::default_buffer_size(),
            log_level: Self::default_log_level(),
        }
    }
}

impl DeviceConfig {
    fn default_ep0_size() -> u8 {
        64
    }

    fn default_buffer_size() -> usize {
        SETUP_HEADER_SIZE + 256
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DeviceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_EP0_SIZES.contains(&self.ep0_size) {
            return Err(Error::Config(format!(
                "ep0_size must be one of {:?}, got {}",
                VALID_EP0_SIZES, self.ep0_size
            )));
        }

        let max = SETUP_HEADER_SIZE + u16::MAX as usize;
        if self.buffer_size <= SETUP_HEADER_SIZE || self.buffer_size > max {
            return Err(Error::Config(format!(
                "buffer_size must be in {}..={}, got {}",
                SETUP_HEADER_SIZE + 1,
                max,
                self.buffer_size
            )));
        }
        Ok(())
    }

    /// Bytes available for the data stage
    pub fn data_capacity(&self) -> usize {
        self.buffer_size.saturating_sub(SETUP_HEADER_SIZE)
    }
}
