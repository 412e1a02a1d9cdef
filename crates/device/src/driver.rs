//! Hardware driver contract
//!
//! A [`Driver`] owns one USB peripheral. The device core never touches
//! registers itself: it calls these operations and consumes the events the
//! driver reports from [`Driver::poll`].

use crate::error::Result;
use protocol::{EndpointAddress, EndpointType};

/// Bus and endpoint events reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Bus reset
    Reset,
    /// Start of frame
    Sof,
    /// Bus suspended
    Suspend,
    /// Bus resumed
    Wakeup,
    /// IN packet delivered to the host
    Tx,
    /// OUT packet received
    Rx,
    /// SETUP packet received
    Setup,
    /// Bus error
    Error,
    /// Expected SOF not seen
    MissedSof,
}

impl Event {
    pub const COUNT: usize = 9;

    pub const ALL: [Event; Self::COUNT] = [
        Event::Reset,
        Event::Sof,
        Event::Suspend,
        Event::Wakeup,
        Event::Tx,
        Event::Rx,
        Event::Setup,
        Event::Error,
        Event::MissedSof,
    ];

    /// Slot of this event in the per-event callback table
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Events that carry a meaningful endpoint address
    pub const fn is_endpoint_event(self) -> bool {
        matches!(self, Event::Tx | Event::Rx | Event::Setup)
    }
}

/// Bus speed reported by [`Driver::info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low,
    Full,
    High,
}

/// Peripheral capabilities and current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    pub enabled: bool,
    pub connected: bool,
    pub speed: Speed,
    /// Battery charging detection supported
    pub battery_charging: bool,
}

/// Operations the device core needs from a USB peripheral
///
/// Endpoint operations take a full [`EndpointAddress`]: bit 7 selects the IN
/// half of the endpoint, the low bits its number.
pub trait Driver {
    /// Power the peripheral up or down
    fn enable(&mut self, enable: bool);

    /// Reset the peripheral to its post-enable state
    fn reset(&mut self);

    /// Attach or detach the pull-up
    fn connect(&mut self, connect: bool);

    /// Program the bus address the peripheral answers to
    fn set_address(&mut self, address: u8);

    /// Allocate packet memory and enable an endpoint
    ///
    /// Configuring a control endpoint enables both directions.
    fn configure_endpoint(
        &mut self,
        ep: EndpointAddress,
        kind: EndpointType,
        max_packet_size: u16,
    ) -> Result<()>;

    /// Disable both directions of endpoint number `ep.number()`
    ///
    /// The direction bit of `ep` is ignored, so `out_ep(1)` also releases
    /// `in_ep(1)`.
    fn deconfigure_endpoint(&mut self, ep: EndpointAddress);

    /// Read the pending OUT or SETUP packet into `buf`
    ///
    /// Returns the byte count. A packet longer than `buf` is an error and is
    /// discarded.
    fn read_endpoint(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Result<u16>;

    /// Queue one IN packet; an empty slice queues a zero-length packet
    fn write_endpoint(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<u16>;

    fn set_stall(&mut self, ep: EndpointAddress, stall: bool);

    fn is_stalled(&self, ep: EndpointAddress) -> bool;

    /// Next pending event, if any
    fn poll(&mut self) -> Option<(Event, EndpointAddress)>;

    /// Current frame number from the last SOF
    fn frame_number(&self) -> u16;

    /// Write the internal serial number string descriptor into `buf`
    ///
    /// Returns the descriptor length, or 0 when `buf` cannot hold it.
    fn serial_descriptor(&self, buf: &mut [u8]) -> u16;

    fn info(&self) -> DriverInfo;
}
