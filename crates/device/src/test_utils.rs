//! Test utilities for the device stack
//!
//! [`MockDriver`] is an in-memory USB peripheral: the test plays the host by
//! queueing SETUP/OUT packets and collecting the IN packets the device
//! writes. [`run_control_in`] and [`run_control_out`] drive a whole control
//! transfer the way a host controller would.
//!
//! # Example
//!
//! ```
//! use device::Device;
//! use device::test_utils::{MockDriver, TransferOutcome, bus_reset, run_control_in};
//! use protocol::{SetupPacket, request_type};
//!
//! let mut dev = Device::new(MockDriver::new(), 64, 8 + 64).unwrap();
//! bus_reset(&mut dev);
//!
//! let outcome = run_control_in(&mut dev, SetupPacket::get_status(request_type::DEVICE, 0));
//! assert_eq!(outcome.data(), Some(&[0u8, 0][..]));
//! ```

use crate::device::Device;
use crate::driver::{Driver, DriverInfo, Event, Speed};
use crate::error::{Result, UsbError};
use protocol::serial::{fnv1a32, serial_descriptor};
use protocol::{EndpointAddress, EndpointType, MAX_ENDPOINTS, SetupPacket, encode_setup};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default packet memory of the mock peripheral, in bytes
pub const DEFAULT_PACKET_MEMORY: usize = 512;

/// Driver operation recorded by [`MockDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Enable(bool),
    Reset,
    Connect(bool),
    SetAddress(u8),
    Configure {
        ep: EndpointAddress,
        kind: EndpointType,
        size: u16,
    },
    Deconfigure(EndpointAddress),
    Write {
        ep: EndpointAddress,
        data: Vec<u8>,
    },
    Stall {
        ep: EndpointAddress,
        stall: bool,
    },
}

/// In-memory driver for tests and benches
#[derive(Debug)]
pub struct MockDriver {
    /// Every state-changing driver call, in order
    pub calls: Vec<DriverCall>,
    events: VecDeque<(Event, EndpointAddress)>,
    rx: [VecDeque<Vec<u8>>; MAX_ENDPOINTS],
    tx: [VecDeque<Vec<u8>>; MAX_ENDPOINTS],
    stalled: HashSet<u8>,
    /// Packet memory per configured endpoint address
    allocations: HashMap<u8, u16>,
    packet_memory: usize,
    enabled: bool,
    connected: bool,
    address: u8,
    frame: u16,
    unique_id: [u32; 3],
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_packet_memory(DEFAULT_PACKET_MEMORY)
    }

    /// Driver whose endpoint buffers must fit in `bytes` of packet memory
    pub fn with_packet_memory(bytes: usize) -> Self {
        Self {
            calls: Vec::new(),
            events: VecDeque::new(),
            rx: std::array::from_fn(|_| VecDeque::new()),
            tx: std::array::from_fn(|_| VecDeque::new()),
            stalled: HashSet::new(),
            allocations: HashMap::new(),
            packet_memory: bytes,
            enabled: false,
            connected: false,
            address: 0,
            frame: 0,
            unique_id: [0x0032_0041, 0x3235_5102, 0x2036_3331],
        }
    }

    pub fn with_unique_id(mut self, unique_id: [u32; 3]) -> Self {
        self.unique_id = unique_id;
        self
    }

    pub fn push_event(&mut self, event: Event, ep: EndpointAddress) {
        self.events.push_back((event, ep));
    }

    /// Host sends a SETUP packet
    ///
    /// Like real peripherals, a SETUP clears an endpoint 0 stall and flushes
    /// IN data of the transfer it supersedes.
    pub fn push_setup(&mut self, setup: &SetupPacket) {
        self.push_raw_setup(&encode_setup(setup));
    }

    pub fn push_raw_setup(&mut self, bytes: &[u8]) {
        self.stalled.remove(&EndpointAddress::EP0_OUT.0);
        self.stalled.remove(&EndpointAddress::EP0_IN.0);
        self.tx[0].clear();
        self.rx[0].push_back(bytes.to_vec());
        self.push_event(Event::Setup, EndpointAddress::EP0_OUT);
    }

    /// Host sends an OUT packet to `ep`
    pub fn push_out(&mut self, ep: EndpointAddress, data: &[u8]) {
        self.rx[ep.index()].push_back(data.to_vec());
        self.push_event(Event::Rx, ep.out_dir());
    }

    /// Host collects the oldest IN packet queued on `ep`
    ///
    /// Signals the matching TX event, as the peripheral would.
    pub fn collect_in(&mut self, ep: EndpointAddress) -> Option<Vec<u8>> {
        let packet = self.tx[ep.index()].pop_front()?;
        self.push_event(Event::Tx, ep.in_dir());
        Some(packet)
    }

    /// IN packets written but not yet collected
    pub fn pending_in(&self, ep: EndpointAddress) -> usize {
        self.tx[ep.index()].len()
    }

    /// Every packet written to `ep` since the calls log was last cleared
    pub fn writes_to(&self, ep: EndpointAddress) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Write { ep: written, data } if *written == ep => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_address_calls(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::SetAddress(address) => Some(*address),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn is_configured(&self, ep: EndpointAddress) -> bool {
        self.allocations.contains_key(&ep.0)
    }

    pub fn packet_memory_used(&self) -> usize {
        self.allocations.values().map(|&size| size as usize).sum()
    }

    fn release(&mut self, ep: EndpointAddress) {
        self.allocations.remove(&ep.0);
        self.stalled.remove(&ep.0);
    }
}

impl Driver for MockDriver {
    fn enable(&mut self, enable: bool) {
        self.enabled = enable;
        self.calls.push(DriverCall::Enable(enable));
    }

    fn reset(&mut self) {
        self.allocations.clear();
        self.stalled.clear();
        self.address = 0;
        self.calls.push(DriverCall::Reset);
    }

    fn connect(&mut self, connect: bool) {
        self.connected = connect;
        self.calls.push(DriverCall::Connect(connect));
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
        self.calls.push(DriverCall::SetAddress(address));
    }

    fn configure_endpoint(
        &mut self,
        ep: EndpointAddress,
        kind: EndpointType,
        max_packet_size: u16,
    ) -> Result<()> {
        if ep.number() as usize >= MAX_ENDPOINTS {
            return Err(UsbError::InvalidEndpoint(ep.0));
        }
        self.calls.push(DriverCall::Configure {
            ep,
            kind,
            size: max_packet_size,
        });

        let addresses = if kind == EndpointType::Control {
            vec![ep.out_dir(), ep.in_dir()]
        } else {
            vec![ep]
        };
        let current: usize = addresses
            .iter()
            .filter_map(|a| self.allocations.get(&a.0))
            .map(|&size| size as usize)
            .sum();
        let needed = max_packet_size as usize * addresses.len();
        if self.packet_memory_used() - current + needed > self.packet_memory {
            return Err(UsbError::PacketMemoryExhausted {
                ep: ep.0,
                requested: max_packet_size,
            });
        }

        for address in &addresses {
            self.allocations.insert(address.0, max_packet_size);
        }
        Ok(())
    }

    fn deconfigure_endpoint(&mut self, ep: EndpointAddress) {
        self.calls.push(DriverCall::Deconfigure(ep));
        self.release(ep.out_dir());
        self.release(ep.in_dir());
    }

    fn read_endpoint(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Result<u16> {
        let Some(packet) = self.rx[ep.index()].pop_front() else {
            return Ok(0);
        };
        if packet.len() > buf.len() {
            return Err(UsbError::BufferTooSmall {
                needed: packet.len(),
                available: buf.len(),
            });
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len() as u16)
    }

    fn write_endpoint(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<u16> {
        if !self.allocations.contains_key(&ep.in_dir().0) {
            return Err(UsbError::EndpointNotConfigured(ep.0));
        }
        self.calls.push(DriverCall::Write {
            ep,
            data: data.to_vec(),
        });
        self.tx[ep.index()].push_back(data.to_vec());
        Ok(data.len() as u16)
    }

    fn set_stall(&mut self, ep: EndpointAddress, stall: bool) {
        self.calls.push(DriverCall::Stall { ep, stall });
        if stall {
            self.stalled.insert(ep.0);
        } else {
            self.stalled.remove(&ep.0);
        }
    }

    fn is_stalled(&self, ep: EndpointAddress) -> bool {
        self.stalled.contains(&ep.0)
    }

    fn poll(&mut self) -> Option<(Event, EndpointAddress)> {
        let (event, ep) = self.events.pop_front()?;
        if event == Event::Sof {
            self.frame = (self.frame + 1) & 0x07FF;
        }
        Some((event, ep))
    }

    fn frame_number(&self) -> u16 {
        self.frame
    }

    fn serial_descriptor(&self, buf: &mut [u8]) -> u16 {
        serial_descriptor(fnv1a32(&self.unique_id), buf)
            .map(|len| len as u16)
            .unwrap_or(0)
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            enabled: self.enabled,
            connected: self.connected,
            speed: Speed::Full,
            battery_charging: false,
        }
    }
}

/// Result of a control transfer driven from the host side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Status stage done; IN data and the size of each IN data packet
    Completed { data: Vec<u8>, packets: Vec<usize> },
    /// Endpoint 0 stalled
    Stalled,
    /// The device never answered the status stage
    Pending,
}

impl TransferOutcome {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            TransferOutcome::Completed { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, TransferOutcome::Stalled)
    }
}

/// Dispatch every queued event; returns how many were handled
pub fn poll_all(dev: &mut Device<MockDriver>) -> usize {
    let mut handled = 0;
    while dev.poll() {
        handled += 1;
    }
    handled
}

/// Signal a bus reset and process it
pub fn bus_reset(dev: &mut Device<MockDriver>) {
    dev.driver_mut().push_event(Event::Reset, EndpointAddress::EP0_OUT);
    poll_all(dev);
}

fn ep0_stalled(dev: &Device<MockDriver>) -> bool {
    dev.is_stalled(EndpointAddress::EP0_IN) || dev.is_stalled(EndpointAddress::EP0_OUT)
}

/// Run a device-to-host control transfer
///
/// The host keeps reading until a short packet or `wLength` bytes, then
/// sends the empty OUT status packet.
pub fn run_control_in(dev: &mut Device<MockDriver>, setup: SetupPacket) -> TransferOutcome {
    let ep0_size = dev.status().ep0_size() as usize;
    dev.driver_mut().push_setup(&setup);
    poll_all(dev);

    let mut data = Vec::new();
    let mut packets = Vec::new();
    loop {
        if ep0_stalled(dev) {
            return TransferOutcome::Stalled;
        }
        let Some(packet) = dev.driver_mut().collect_in(EndpointAddress::EP0_IN) else {
            return TransferOutcome::Pending;
        };
        packets.push(packet.len());
        data.extend_from_slice(&packet);
        poll_all(dev);
        if packet.len() < ep0_size || data.len() >= setup.length as usize {
            break;
        }
    }

    dev.driver_mut().push_out(EndpointAddress::EP0_OUT, &[]);
    poll_all(dev);
    if ep0_stalled(dev) {
        return TransferOutcome::Stalled;
    }
    TransferOutcome::Completed { data, packets }
}

/// Run a host-to-device control transfer carrying `data`
pub fn run_control_out(
    dev: &mut Device<MockDriver>,
    setup: SetupPacket,
    data: &[u8],
) -> TransferOutcome {
    let ep0_size = dev.status().ep0_size() as usize;
    dev.driver_mut().push_setup(&setup);
    poll_all(dev);

    for chunk in data.chunks(ep0_size) {
        if ep0_stalled(dev) {
            return TransferOutcome::Stalled;
        }
        dev.driver_mut().push_out(EndpointAddress::EP0_OUT, chunk);
        poll_all(dev);
    }
    if ep0_stalled(dev) {
        return TransferOutcome::Stalled;
    }

    match dev.driver_mut().collect_in(EndpointAddress::EP0_IN) {
        Some(packet) if packet.is_empty() => {
            poll_all(dev);
            TransferOutcome::Completed {
                data: Vec::new(),
                packets: Vec::new(),
            }
        }
        Some(_) => TransferOutcome::Stalled,
        None => TransferOutcome::Pending,
    }
}
