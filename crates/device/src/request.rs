//! Control request handling types
//!
//! Class drivers see each control request through a [`ControlContext`]: the
//! decoded SETUP packet, the received OUT payload and a way to stage the IN
//! reply. They answer with a [`Response`].

use crate::device::{Device, DeviceState};
use crate::driver::Driver;
use protocol::SetupPacket;
use tracing::debug;

/// Outcome of processing a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Reject the request; endpoint 0 is stalled
    Fail,
    /// Accept the request and run the data/status stages
    Ack,
    /// Accept the request but leave the status stage open
    ///
    /// The application finishes it later with
    /// [`Device::resolve_deferred`].
    Nak,
}

/// Callback run once the status stage of a request has completed
pub type CompletionHandler<D> = Box<dyn FnOnce(&mut Device<D>, &SetupPacket)>;

pub(crate) enum Completion<D> {
    /// Apply the address from a SET_ADDRESS request
    SetAddress,
    Callback(CompletionHandler<D>),
}

/// Where the IN data stage reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataSource {
    /// The device control buffer, after the SETUP header
    Buffer,
    Static(&'static [u8]),
}

/// Position within the current data stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataCursor {
    pub source: DataSource,
    pub offset: u16,
    pub remaining: u16,
}

impl DataCursor {
    pub fn buffer(len: u16) -> Self {
        Self {
            source: DataSource::Buffer,
            offset: 0,
            remaining: len,
        }
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            source: DataSource::Static(data),
            offset: 0,
            remaining: data.len().min(u16::MAX as usize) as u16,
        }
    }

    /// Keep a buffer-sourced reply within the buffer
    pub fn clamp(&mut self, capacity: u16) {
        if self.source == DataSource::Buffer {
            let available = capacity.saturating_sub(self.offset);
            self.remaining = self.remaining.min(available);
        }
    }

    pub fn advance(&mut self, len: u16) {
        self.offset = self.offset.saturating_add(len);
        self.remaining = self.remaining.saturating_sub(len);
    }

    /// Next `len` bytes of the reply
    pub fn chunk<'a>(&self, payload: &'a [u8], len: u16) -> Option<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + len as usize;
        match self.source {
            DataSource::Buffer => payload.get(start..end),
            DataSource::Static(data) => data.get(start..end),
        }
    }
}

/// Copy `bytes` into the payload area and point the cursor at it
pub(crate) fn stage_reply(payload: &mut [u8], cursor: &mut DataCursor, bytes: &[u8]) {
    let len = bytes.len().min(payload.len()).min(u16::MAX as usize);
    if len < bytes.len() {
        debug!(
            "Reply of {} bytes truncated to control buffer size {}",
            bytes.len(),
            len
        );
    }
    payload[..len].copy_from_slice(&bytes[..len]);
    *cursor = DataCursor::buffer(len as u16);
}

/// View of the device handed to the class control callback
pub struct ControlContext<'a, D> {
    driver: &'a mut D,
    setup: &'a SetupPacket,
    payload: &'a mut [u8],
    cursor: &'a mut DataCursor,
    completion: &'a mut Option<Completion<D>>,
    device_state: DeviceState,
    configuration: u8,
}

impl<'a, D: Driver> ControlContext<'a, D> {
    pub(crate) fn new(
        driver: &'a mut D,
        setup: &'a SetupPacket,
        payload: &'a mut [u8],
        cursor: &'a mut DataCursor,
        completion: &'a mut Option<Completion<D>>,
        device_state: DeviceState,
        configuration: u8,
    ) -> Self {
        Self {
            driver,
            setup,
            payload,
            cursor,
            completion,
            device_state,
            configuration,
        }
    }

    pub fn setup(&self) -> &SetupPacket {
        self.setup
    }

    /// Payload received in the OUT data stage
    pub fn data(&self) -> &[u8] {
        let len = (self.setup.length as usize).min(self.payload.len());
        &self.payload[..len]
    }

    /// The whole payload area, for building a reply in place
    ///
    /// Follow with [`ControlContext::set_reply_len`].
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.payload
    }

    /// Buffer capacity for a reply or an OUT data stage
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    /// Reply with a copy of `bytes`; longer replies are truncated to the buffer
    pub fn reply(&mut self, bytes: &[u8]) -> Response {
        stage_reply(self.payload, self.cursor, bytes);
        Response::Ack
    }

    /// Reply straight from static memory without copying
    pub fn reply_static(&mut self, bytes: &'static [u8]) -> Response {
        *self.cursor = DataCursor::from_static(bytes);
        Response::Ack
    }

    /// Reply with the first `len` bytes written through [`ControlContext::buffer_mut`]
    pub fn set_reply_len(&mut self, len: usize) {
        let len = len.min(self.payload.len()).min(u16::MAX as usize);
        *self.cursor = DataCursor::buffer(len as u16);
    }

    /// Run `callback` after the status stage completes
    ///
    /// Replaces any callback registered earlier for this request.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut Device<D>, &SetupPacket) + 'static,
    {
        *self.completion = Some(Completion::Callback(Box::new(callback)));
    }

    pub fn driver(&mut self) -> &mut D {
        &mut *self.driver
    }

    pub fn device_state(&self) -> DeviceState {
        self.device_state
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }
}
