//! The USB device object
//!
//! [`Device`] ties a [`Driver`] to the endpoint 0 state machine and to the
//! application's callbacks. All protocol progress happens inside
//! [`Device::poll`] (or [`Device::dispatch`] for drivers that push events).

use crate::control::{self, ControlState, ControlStatus};
use crate::driver::{Driver, DriverInfo, Event};
use crate::error::{Result, UsbError};
use crate::request::{Completion, ControlContext, Response};
use common::DeviceConfig;
use common::config::VALID_EP0_SIZES;
use protocol::{EndpointAddress, EndpointType, MAX_ENDPOINTS, SETUP_PACKET_SIZE, SetupPacket};
use std::mem;
use tracing::{debug, error, info, trace, warn};

pub(crate) type EventHandler<D> = Box<dyn FnMut(&mut Device<D>, Event, EndpointAddress)>;
pub(crate) type ControlHandler<D> = Box<dyn FnMut(&mut ControlContext<'_, D>) -> Response>;
pub(crate) type ConfigHandler<D> = Box<dyn FnMut(&mut Device<D>, u8) -> Result<()>>;
pub(crate) type DescriptorHandler = Box<dyn FnMut(&SetupPacket) -> Option<&'static [u8]>>;

/// USB device state as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disabled,
    Disconnected,
    /// Reset seen, answering on address 0
    Default,
    Addressed,
    Configured,
}

/// Commands forwarded to the driver by [`Device::control`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    Connect,
    Disconnect,
    Reset,
}

/// Callback storage that survives the callback (un)registering itself
pub(crate) enum Slot<T> {
    Vacant,
    /// Taken out for the duration of a call
    Running,
    Occupied(T),
}

impl<T> Slot<T> {
    pub fn set(&mut self, value: Option<T>) {
        *self = match value {
            Some(value) => Slot::Occupied(value),
            None => Slot::Vacant,
        };
    }

    pub fn take(&mut self) -> Option<T> {
        match mem::replace(self, Slot::Running) {
            Slot::Occupied(value) => Some(value),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Put a taken value back unless the slot was rewritten meanwhile
    pub fn restore(&mut self, value: T) {
        if matches!(self, Slot::Running) {
            *self = Slot::Occupied(value);
        }
    }

    pub fn is_occupied(&self) -> bool {
        !matches!(self, Slot::Vacant)
    }
}

pub(crate) enum EndpointRoute<D> {
    /// Endpoint 0, owned by the control state machine
    Control,
    Handler(EventHandler<D>),
}

pub(crate) struct Handlers<D> {
    pub control: Option<ControlHandler<D>>,
    pub config: Slot<ConfigHandler<D>>,
    pub descriptor: Option<DescriptorHandler>,
    pub events: [Slot<EventHandler<D>>; Event::COUNT],
    pub endpoints: [Slot<EndpointRoute<D>>; MAX_ENDPOINTS],
}

impl<D> Handlers<D> {
    fn new() -> Self {
        Self {
            control: None,
            config: Slot::Vacant,
            descriptor: None,
            events: std::array::from_fn(|_| Slot::Vacant),
            endpoints: std::array::from_fn(|_| Slot::Vacant),
        }
    }
}

/// A USB device: one driver, its control endpoint and the application callbacks
///
/// ```
/// use device::{Device, Event};
/// use device::test_utils::MockDriver;
///
/// let mut dev = Device::new(MockDriver::new(), 64, 8 + 256).unwrap();
/// dev.register_event(Event::Reset, |dev, _, _| {
///     assert_eq!(dev.configuration(), 0);
/// });
/// dev.driver_mut().push_event(Event::Reset, protocol::EndpointAddress::EP0_OUT);
/// assert!(dev.poll());
/// assert!(!dev.poll());
/// ```
pub struct Device<D> {
    pub(crate) driver: D,
    pub(crate) status: ControlStatus,
    /// Most recent SETUP packet
    pub(crate) setup: SetupPacket,
    /// SETUP header followed by the data stage payload
    pub(crate) buffer: Box<[u8]>,
    pub(crate) handlers: Handlers<D>,
    pub(crate) completion: Option<Completion<D>>,
}

impl<D: Driver> Device<D> {
    /// Create a device with a control buffer of `buffer_size` bytes
    ///
    /// The first 8 bytes hold the SETUP packet; the rest bounds every data
    /// stage. The driver is not touched until a command or event arrives.
    pub fn new(driver: D, ep0_size: u8, buffer_size: usize) -> Result<Self> {
        if !VALID_EP0_SIZES.contains(&ep0_size) {
            return Err(UsbError::InvalidPacketSize(ep0_size as u16));
        }
        if buffer_size < SETUP_PACKET_SIZE {
            return Err(UsbError::BufferTooSmall {
                needed: SETUP_PACKET_SIZE,
                available: buffer_size,
            });
        }

        let capacity = (buffer_size - SETUP_PACKET_SIZE).min(u16::MAX as usize) as u16;
        Ok(Self {
            driver,
            status: ControlStatus::new(ep0_size, capacity),
            setup: SetupPacket::default(),
            buffer: vec![0u8; SETUP_PACKET_SIZE + capacity as usize].into_boxed_slice(),
            handlers: Handlers::new(),
            completion: None,
        })
    }

    pub fn from_config(driver: D, config: &DeviceConfig) -> Result<Self> {
        Self::new(driver, config.ep0_size, config.buffer_size)
    }

    /// Class/vendor request handler, offered every control request first
    pub fn register_control<F>(&mut self, handler: F)
    where
        F: FnMut(&mut ControlContext<'_, D>) -> Response + 'static,
    {
        self.handlers.control = Some(Box::new(handler));
    }

    pub fn unregister_control(&mut self) {
        self.handlers.control = None;
    }

    /// SET_CONFIGURATION handler; configuration 0 means deconfigure
    pub fn register_config<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Device<D>, u8) -> Result<()> + 'static,
    {
        self.handlers.config.set(Some(Box::new(handler)));
    }

    pub fn unregister_config(&mut self) {
        self.handlers.config.set(None);
    }

    /// GET_DESCRIPTOR handler returning the descriptor bytes, or `None` to stall
    ///
    /// Descriptors built at runtime are answered from the control handler
    /// instead: it sees GET_DESCRIPTOR first and can copy the bytes into the
    /// control buffer with [`ControlContext::reply`].
    pub fn register_descriptor<F>(&mut self, handler: F)
    where
        F: FnMut(&SetupPacket) -> Option<&'static [u8]> + 'static,
    {
        self.handlers.descriptor = Some(Box::new(handler));
    }

    pub fn unregister_descriptor(&mut self) {
        self.handlers.descriptor = None;
    }

    pub fn register_event<F>(&mut self, event: Event, handler: F)
    where
        F: FnMut(&mut Device<D>, Event, EndpointAddress) + 'static,
    {
        self.handlers.events[event.index()].set(Some(Box::new(handler)));
    }

    pub fn unregister_event(&mut self, event: Event) {
        self.handlers.events[event.index()].set(None);
    }

    /// Receive TX/RX/SETUP events for endpoint `ep`, either direction
    pub fn register_endpoint<F>(&mut self, ep: EndpointAddress, handler: F)
    where
        F: FnMut(&mut Device<D>, Event, EndpointAddress) + 'static,
    {
        if ep.index() == 0 {
            warn!("Ignoring handler for endpoint {}: endpoint 0 is reserved", ep);
            return;
        }
        self.handlers.endpoints[ep.index()].set(Some(EndpointRoute::Handler(Box::new(handler))));
    }

    pub fn unregister_endpoint(&mut self, ep: EndpointAddress) {
        if ep.index() == 0 {
            warn!("Ignoring unregister for endpoint {}: endpoint 0 is reserved", ep);
            return;
        }
        self.handlers.endpoints[ep.index()].set(None);
    }

    pub fn has_endpoint_handler(&self, ep: EndpointAddress) -> bool {
        self.handlers.endpoints[ep.index()].is_occupied()
    }

    /// Forward a command to the driver
    pub fn control(&mut self, command: Command) {
        debug!("Device command {:?}", command);
        match command {
            Command::Enable => {
                self.driver.enable(true);
                self.status.device_state = DeviceState::Disconnected;
            }
            Command::Disable => {
                self.driver.enable(false);
                self.status.device_state = DeviceState::Disabled;
            }
            Command::Connect => self.driver.connect(true),
            Command::Disconnect => {
                self.driver.connect(false);
                self.status.device_state = DeviceState::Disconnected;
            }
            Command::Reset => self.driver.reset(),
        }
    }

    /// Handle the next pending driver event; false when there was none
    pub fn poll(&mut self) -> bool {
        match self.driver.poll() {
            Some((event, ep)) => {
                self.dispatch(event, ep);
                true
            }
            None => false,
        }
    }

    /// Process one bus or endpoint event
    pub fn dispatch(&mut self, event: Event, ep: EndpointAddress) {
        trace!("Event {:?} on {}", event, ep);
        if event == Event::Reset {
            self.process_reset();
        }
        if event.is_endpoint_event() {
            self.route_endpoint(event, ep);
        }
        self.notify(event, ep);
    }

    fn process_reset(&mut self) {
        self.status.device_state = DeviceState::Default;
        self.status.control_state = ControlState::Idle;
        self.status.configuration = 0;
        self.status.deferred = false;
        self.completion = None;

        let ep0_size = self.status.ep0_size as u16;
        if let Err(e) =
            self.driver
                .configure_endpoint(EndpointAddress::EP0_OUT, EndpointType::Control, ep0_size)
        {
            error!("Failed to configure endpoint 0 on reset: {}", e);
        }
        self.handlers.endpoints[0].set(Some(EndpointRoute::Control));
        self.driver.set_address(0);
        info!("Bus reset");
    }

    fn route_endpoint(&mut self, event: Event, ep: EndpointAddress) {
        let index = ep.index();
        let Some(mut route) = self.handlers.endpoints[index].take() else {
            trace!("No handler for {:?} on {}", event, ep);
            return;
        };
        match &mut route {
            EndpointRoute::Control => control::handle_event(self, event, ep),
            EndpointRoute::Handler(handler) => handler(self, event, ep),
        }
        self.handlers.endpoints[index].restore(route);
    }

    fn notify(&mut self, event: Event, ep: EndpointAddress) {
        let index = event.index();
        let Some(mut handler) = self.handlers.events[index].take() else {
            return;
        };
        handler(self, event, ep);
        self.handlers.events[index].restore(handler);
    }

    pub(crate) fn call_config_handler(&mut self, configuration: u8) -> Option<Result<()>> {
        let mut handler = self.handlers.config.take()?;
        let result = handler(self, configuration);
        self.handlers.config.restore(handler);
        Some(result)
    }

    /// Finish a request whose handler answered [`Response::Nak`]
    ///
    /// `accept` sends the status ZLP; otherwise endpoint 0 is stalled.
    /// Returns false when no deferred request is pending.
    pub fn resolve_deferred(&mut self, accept: bool) -> bool {
        if !self.status.deferred || self.status.control_state != ControlState::StatusIn {
            return false;
        }
        self.status.deferred = false;
        let accepted = accept
            && match self.driver.write_endpoint(EndpointAddress::EP0_IN, &[]) {
                Ok(_) => true,
                Err(e) => {
                    debug!("Status ZLP write failed: {}", e);
                    false
                }
            };
        if !accepted {
            let next = control::stall(self, EndpointAddress::EP0_OUT);
            self.status.control_state = next;
        }
        true
    }

    pub fn configure_endpoint(
        &mut self,
        ep: EndpointAddress,
        kind: EndpointType,
        max_packet_size: u16,
    ) -> Result<()> {
        debug!(
            "Configuring endpoint {} as {:?}, max packet {}",
            ep, kind, max_packet_size
        );
        self.driver.configure_endpoint(ep, kind, max_packet_size)
    }

    /// Disable both directions of `ep`'s endpoint number
    pub fn deconfigure_endpoint(&mut self, ep: EndpointAddress) {
        self.driver.deconfigure_endpoint(ep);
    }

    pub fn read_endpoint(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Result<u16> {
        self.driver.read_endpoint(ep, buf)
    }

    pub fn write_endpoint(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<u16> {
        self.driver.write_endpoint(ep, data)
    }

    pub fn set_stall(&mut self, ep: EndpointAddress, stall: bool) {
        self.driver.set_stall(ep, stall);
    }

    pub fn is_stalled(&self, ep: EndpointAddress) -> bool {
        self.driver.is_stalled(ep)
    }

    pub fn frame_number(&self) -> u16 {
        self.driver.frame_number()
    }

    pub fn driver_info(&self) -> DriverInfo {
        self.driver.info()
    }

    pub fn status(&self) -> &ControlStatus {
        &self.status
    }

    pub fn device_state(&self) -> DeviceState {
        self.status.device_state
    }

    pub fn configuration(&self) -> u8 {
        self.status.configuration
    }

    pub fn control_state(&self) -> ControlState {
        self.status.control_state
    }

    /// Last SETUP packet received
    pub fn setup(&self) -> &SetupPacket {
        &self.setup
    }

    /// OUT payload of the last control request
    ///
    /// Valid in completion callbacks until the next SETUP arrives.
    pub fn control_data(&self) -> &[u8] {
        let payload = &self.buffer[SETUP_PACKET_SIZE..];
        let len = (self.setup.length as usize).min(payload.len());
        &payload[..len]
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
