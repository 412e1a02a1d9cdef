//! Endpoint 0 control transfer state machine
//!
//! Every control transfer walks SETUP → optional DATA stage → STATUS stage.
//! Each handler below consumes one endpoint 0 event and returns the next
//! [`ControlState`]; any event the current state does not expect ends the
//! transfer with a protocol stall on both halves of endpoint 0.

use crate::device::{Device, DeviceState};
use crate::driver::{Driver, Event};
use crate::request::{Completion, DataCursor, Response};
use crate::router;
use protocol::{EndpointAddress, SETUP_PACKET_SIZE, decode_setup};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Waiting for a SETUP packet
    Idle,
    /// Receiving the OUT data stage
    RxData,
    /// Sending an IN data stage that fills `wLength`
    TxData,
    /// Sending a short IN data stage that may need a trailing ZLP
    ZtxData,
    /// Last IN packet queued
    LastData,
    /// Waiting for the host to collect the IN status packet
    StatusIn,
    /// Waiting for the host's OUT status packet
    StatusOut,
}

/// Control endpoint bookkeeping owned by the state machine
#[derive(Debug, Clone)]
pub struct ControlStatus {
    pub(crate) control_state: ControlState,
    pub(crate) cursor: DataCursor,
    pub(crate) capacity: u16,
    pub(crate) ep0_size: u8,
    pub(crate) device_state: DeviceState,
    pub(crate) configuration: u8,
    /// A handler answered NAK and the status stage is still open
    pub(crate) deferred: bool,
}

impl ControlStatus {
    pub(crate) fn new(ep0_size: u8, capacity: u16) -> Self {
        Self {
            control_state: ControlState::Idle,
            cursor: DataCursor::buffer(0),
            capacity,
            ep0_size,
            device_state: DeviceState::Disabled,
            configuration: 0,
            deferred: false,
        }
    }

    pub fn control_state(&self) -> ControlState {
        self.control_state
    }

    pub fn device_state(&self) -> DeviceState {
        self.device_state
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn ep0_size(&self) -> u8 {
        self.ep0_size
    }

    /// Bytes the control buffer holds after the SETUP header
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Bytes still to move in the current data stage
    pub fn remaining(&self) -> u16 {
        self.cursor.remaining
    }

    /// True while a NAKed request waits for [`Device::resolve_deferred`]
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }
}

/// Feed one endpoint 0 event through the state machine
pub(crate) fn handle_event<D: Driver>(dev: &mut Device<D>, event: Event, ep: EndpointAddress) {
    let previous = dev.status.control_state;
    let next = match event {
        Event::Setup => {
            if dev.status.control_state != ControlState::Idle {
                debug!(
                    "SETUP aborts control transfer in {:?}",
                    dev.status.control_state
                );
            }
            dev.status.control_state = ControlState::Idle;
            dev.status.deferred = false;
            dev.completion = None;
            on_rx(dev, ep)
        }
        Event::Rx => on_rx(dev, ep),
        Event::Tx => on_tx(dev, ep),
        _ => return,
    };
    trace!("Control state {:?} -> {:?}", previous, next);
    dev.status.control_state = next;
}

fn on_rx<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    match dev.status.control_state {
        ControlState::Idle => receive_setup(dev, ep),
        ControlState::RxData => receive_data(dev, ep),
        ControlState::StatusOut => finish_status_out(dev, ep),
        state => {
            warn!("Unexpected RX on {} in control state {:?}", ep, state);
            stall(dev, ep)
        }
    }
}

fn on_tx<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    match dev.status.control_state {
        state @ (ControlState::TxData | ControlState::ZtxData) => transmit(dev, ep, state),
        ControlState::LastData => ControlState::StatusOut,
        ControlState::StatusIn => {
            dev.status.control_state = ControlState::Idle;
            complete(dev);
            ControlState::Idle
        }
        state => {
            warn!("Unexpected TX on {} in control state {:?}", ep, state);
            stall(dev, ep)
        }
    }
}

fn receive_setup<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    let received = match dev.driver.read_endpoint(ep.out_dir(), &mut dev.buffer[..]) {
        Ok(n) => n as usize,
        Err(e) => {
            debug!("Stall: SETUP read failed: {}", e);
            return stall(dev, ep);
        }
    };
    if received != SETUP_PACKET_SIZE {
        debug!("Stall: SETUP packet of {} bytes", received);
        return stall(dev, ep);
    }

    let setup = match decode_setup(&dev.buffer[..SETUP_PACKET_SIZE]) {
        Ok(setup) => setup,
        Err(e) => {
            debug!("Stall: {}", e);
            return stall(dev, ep);
        }
    };
    debug!(
        "SETUP: request_type={:#04x}, request={:#04x}, value={:#06x}, index={:#06x}, length={}",
        setup.request_type, setup.request, setup.value, setup.index, setup.length
    );
    dev.setup = setup;
    dev.status.cursor = DataCursor::buffer(setup.length);

    if setup.is_device_to_host() || setup.length == 0 {
        return dispatch_request(dev, ep);
    }
    if setup.length > dev.status.capacity {
        debug!(
            "Stall: OUT data stage of {} bytes exceeds buffer capacity {}",
            setup.length, dev.status.capacity
        );
        return stall(dev, ep);
    }
    ControlState::RxData
}

fn receive_data<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    let cursor = dev.status.cursor;
    let start = SETUP_PACKET_SIZE + cursor.offset as usize;
    let end = start + cursor.remaining as usize;
    let Some(window) = dev.buffer.get_mut(start..end) else {
        debug!("Stall: data stage cursor outside control buffer");
        return stall(dev, ep);
    };

    let received = match dev.driver.read_endpoint(ep.out_dir(), window) {
        Ok(n) => n,
        Err(e) => {
            debug!("Stall: DATA OUT read failed: {}", e);
            return stall(dev, ep);
        }
    };
    if received > cursor.remaining {
        debug!(
            "Stall: DATA OUT packet of {} bytes with {} remaining",
            received, cursor.remaining
        );
        return stall(dev, ep);
    }

    trace!("DATA OUT: {} bytes, {} remaining", received, cursor.remaining - received);
    if received < cursor.remaining {
        dev.status.cursor.advance(received);
        return ControlState::RxData;
    }
    dispatch_request(dev, ep)
}

fn dispatch_request<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    let setup = dev.setup;
    dev.status.cursor = DataCursor::buffer(setup.length);

    match router::process_request(dev) {
        Response::Ack if setup.is_device_to_host() => {
            let capacity = dev.status.capacity;
            let cursor = &mut dev.status.cursor;
            cursor.clamp(capacity);
            let state = if cursor.remaining >= setup.length {
                cursor.remaining = setup.length;
                ControlState::TxData
            } else {
                ControlState::ZtxData
            };
            transmit(dev, ep, state)
        }
        Response::Ack => {
            if let Err(e) = dev.driver.write_endpoint(ep.in_dir(), &[]) {
                debug!("Stall: status ZLP write failed: {}", e);
                return stall(dev, ep);
            }
            ControlState::StatusIn
        }
        Response::Nak => {
            debug!("Request {:#04x} deferred", setup.request);
            dev.status.deferred = true;
            ControlState::StatusIn
        }
        Response::Fail => {
            debug!(
                "Stall: request {:#04x} (type {:#04x}) not handled",
                setup.request, setup.request_type
            );
            stall(dev, ep)
        }
    }
}

/// Queue the next IN packet of the data stage
fn transmit<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress, state: ControlState) -> ControlState {
    let ep0_size = dev.status.ep0_size as u16;
    let cursor = dev.status.cursor;
    let len = cursor.remaining.min(ep0_size);

    let Some(chunk) = cursor.chunk(&dev.buffer[SETUP_PACKET_SIZE..], len) else {
        debug!("Stall: reply cursor outside its source");
        return stall(dev, ep);
    };
    if let Err(e) = dev.driver.write_endpoint(ep.in_dir(), chunk) {
        debug!("Stall: DATA IN write failed: {}", e);
        return stall(dev, ep);
    }

    dev.status.cursor.advance(len);
    trace!("DATA IN: {} bytes, {} remaining", len, dev.status.cursor.remaining);
    if dev.status.cursor.remaining != 0 {
        return state;
    }
    if state == ControlState::TxData || len != ep0_size {
        ControlState::LastData
    } else {
        // full final packet of a short reply; a ZLP follows
        state
    }
}

fn finish_status_out<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    if let Err(e) = dev.driver.read_endpoint(ep.out_dir(), &mut dev.buffer[SETUP_PACKET_SIZE..]) {
        debug!("Status OUT read failed: {}", e);
    }
    dev.status.control_state = ControlState::Idle;
    complete(dev);
    ControlState::Idle
}

/// Take and run the pending completion callback
fn complete<D: Driver>(dev: &mut Device<D>) {
    let setup = dev.setup;
    match dev.completion.take() {
        Some(Completion::SetAddress) => router::apply_address(dev, &setup),
        Some(Completion::Callback(callback)) => callback(dev, &setup),
        None => {}
    }
}

/// Stall both halves of endpoint 0 and drop the transfer
pub(crate) fn stall<D: Driver>(dev: &mut Device<D>, ep: EndpointAddress) -> ControlState {
    dev.driver.set_stall(ep.out_dir(), true);
    dev.driver.set_stall(ep.in_dir(), true);
    dev.status.deferred = false;
    dev.completion = None;
    ControlState::Idle
}
