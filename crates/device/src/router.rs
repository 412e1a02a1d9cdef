//! Control request routing
//!
//! The class control callback sees every request first. Whatever it rejects
//! falls through to the chapter 9 standard requests below.

use crate::device::{Device, DeviceState};
use crate::driver::Driver;
use crate::request::{Completion, ControlContext, DataCursor, Response, stage_reply};
use protocol::{
    EndpointAddress, INTERNAL_SERIAL_INDEX, MAX_ENDPOINTS, Recipient, RequestKind,
    SETUP_PACKET_SIZE, SetupPacket, StandardRequest,
};
use tracing::{debug, info, warn};

pub(crate) fn process_request<D: Driver>(dev: &mut Device<D>) -> Response {
    let response = offer_to_class(dev);
    if response != Response::Fail {
        return response;
    }

    let setup = dev.setup;
    match (setup.kind(), setup.recipient()) {
        (RequestKind::Standard, Recipient::Device) => device_request(dev, &setup),
        (RequestKind::Standard, Recipient::Interface) => interface_request(dev, &setup),
        (RequestKind::Standard, Recipient::Endpoint) => endpoint_request(dev, &setup),
        _ => Response::Fail,
    }
}

fn offer_to_class<D: Driver>(dev: &mut Device<D>) -> Response {
    let Device {
        driver,
        status,
        setup,
        buffer,
        handlers,
        completion,
    } = dev;
    let Some(handler) = handlers.control.as_mut() else {
        return Response::Fail;
    };

    let mut ctx = ControlContext::new(
        driver,
        setup,
        &mut buffer[SETUP_PACKET_SIZE..],
        &mut status.cursor,
        completion,
        status.device_state,
        status.configuration,
    );
    handler(&mut ctx)
}

fn device_request<D: Driver>(dev: &mut Device<D>, setup: &SetupPacket) -> Response {
    match setup.standard_request() {
        Some(StandardRequest::GetConfiguration) => {
            let configuration = dev.status.configuration;
            reply(dev, &[configuration])
        }
        Some(StandardRequest::GetDescriptor) => get_descriptor(dev, setup),
        Some(StandardRequest::GetStatus) => reply(dev, &[0, 0]),
        Some(StandardRequest::SetAddress) => {
            dev.completion = Some(Completion::SetAddress);
            Response::Ack
        }
        Some(StandardRequest::SetConfiguration) => set_configuration(dev, setup.value as u8),
        _ => Response::Fail,
    }
}

fn interface_request<D: Driver>(dev: &mut Device<D>, setup: &SetupPacket) -> Response {
    match setup.standard_request() {
        Some(StandardRequest::GetStatus) => reply(dev, &[0, 0]),
        _ => Response::Fail,
    }
}

/// Unknown endpoint requests are accepted without effect
fn endpoint_request<D: Driver>(dev: &mut Device<D>, setup: &SetupPacket) -> Response {
    let ep = EndpointAddress(setup.index as u8);
    match setup.standard_request() {
        Some(StandardRequest::SetFeature) => {
            debug!("Halting endpoint {}", ep);
            dev.driver.set_stall(ep, true);
            Response::Ack
        }
        Some(StandardRequest::ClearFeature) => {
            debug!("Clearing halt on endpoint {}", ep);
            dev.driver.set_stall(ep, false);
            Response::Ack
        }
        Some(StandardRequest::GetStatus) => {
            let halted = dev.driver.is_stalled(ep);
            reply(dev, &[halted as u8, 0])
        }
        _ => Response::Ack,
    }
}

fn get_descriptor<D: Driver>(dev: &mut Device<D>, setup: &SetupPacket) -> Response {
    if setup.is_string_request(INTERNAL_SERIAL_INDEX) {
        let len = dev
            .driver
            .serial_descriptor(&mut dev.buffer[SETUP_PACKET_SIZE..]);
        dev.status.cursor = DataCursor::buffer(len);
        return Response::Ack;
    }

    let Some(handler) = dev.handlers.descriptor.as_mut() else {
        debug!("No descriptor handler for {:#06x}", setup.value);
        return Response::Fail;
    };
    match handler(setup) {
        Some(descriptor) => {
            dev.status.cursor = DataCursor::from_static(descriptor);
            Response::Ack
        }
        None => Response::Fail,
    }
}

fn set_configuration<D: Driver>(dev: &mut Device<D>, configuration: u8) -> Response {
    if configuration == 0 {
        for number in 1..MAX_ENDPOINTS as u8 {
            dev.driver.deconfigure_endpoint(EndpointAddress::out_ep(number));
        }
        if let Some(Err(e)) = dev.call_config_handler(0) {
            debug!("Configuration handler failed deconfiguring: {}", e);
        }
        dev.status.configuration = 0;
        dev.status.device_state = DeviceState::Addressed;
        info!("Device deconfigured");
        return Response::Ack;
    }

    match dev.call_config_handler(configuration) {
        Some(Ok(())) => {
            dev.status.configuration = configuration;
            dev.status.device_state = DeviceState::Configured;
            info!("Device configured with configuration {}", configuration);
            Response::Ack
        }
        Some(Err(e)) => {
            warn!("Failed to set configuration {}: {}", configuration, e);
            Response::Fail
        }
        None => {
            debug!("No configuration handler for configuration {}", configuration);
            Response::Fail
        }
    }
}

/// Completion of SET_ADDRESS, run after its status stage
pub(crate) fn apply_address<D: Driver>(dev: &mut Device<D>, setup: &SetupPacket) {
    let address = (setup.value & 0x7F) as u8;
    dev.driver.set_address(address);
    dev.status.device_state = if address == 0 {
        DeviceState::Default
    } else {
        DeviceState::Addressed
    };
    info!("Device address set to {}", address);
}

fn reply<D: Driver>(dev: &mut Device<D>, bytes: &[u8]) -> Response {
    stage_reply(
        &mut dev.buffer[SETUP_PACKET_SIZE..],
        &mut dev.status.cursor,
        bytes,
    );
    Response::Ack
}
