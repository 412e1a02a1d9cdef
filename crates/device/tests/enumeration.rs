//! Integration tests for standard request handling and event dispatch

use device::test_utils::{
    DriverCall, MockDriver, TransferOutcome, bus_reset, poll_all, run_control_in, run_control_out,
};
use device::{Command, ControlState, Device, DeviceState, Event, Response, UsbError};
use protocol::descriptor::{
    ConfigurationBuilder, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
};
use protocol::serial::{SERIAL_DESCRIPTOR_LENGTH, fnv1a32, serial_descriptor};
use protocol::{
    EndpointAddress, EndpointType, INTERNAL_SERIAL_INDEX, SetupPacket, StandardRequest, USB_2_0,
    class, config_attributes, descriptor_type, request_type,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::OnceLock;

const BULK_OUT: EndpointAddress = EndpointAddress::out_ep(1);
const BULK_IN: EndpointAddress = EndpointAddress::in_ep(1);

fn device_descriptor() -> &'static [u8] {
    static BYTES: OnceLock<Vec<u8>> = OnceLock::new();
    BYTES.get_or_init(|| {
        DeviceDescriptor {
            usb_version: USB_2_0,
            class: class::VENDOR,
            subclass: class::SUBCLASS_NONE,
            protocol: class::PROTOCOL_NONE,
            max_packet_size0: 64,
            vendor_id: 0x0483,
            product_id: 0x5740,
            device_version: protocol::BcdVersion::new(1, 0, 0),
            manufacturer: 1,
            product: 2,
            serial_number: INTERNAL_SERIAL_INDEX,
            num_configurations: 1,
        }
        .to_bytes()
    })
}

fn config_descriptor() -> &'static [u8] {
    static BYTES: OnceLock<Vec<u8>> = OnceLock::new();
    BYTES.get_or_init(|| {
        ConfigurationBuilder::new(1, config_attributes::RESERVED, 100)
            .interface(InterfaceDescriptor::new(0, 2, class::VENDOR, 0, 0))
            .endpoint(EndpointDescriptor::new(BULK_OUT, EndpointType::Bulk, 64, 0))
            .endpoint(EndpointDescriptor::new(BULK_IN, EndpointType::Bulk, 64, 0))
            .build()
            .unwrap()
    })
}

fn descriptors(setup: &SetupPacket) -> Option<&'static [u8]> {
    match setup.descriptor_type() {
        descriptor_type::DEVICE => Some(device_descriptor()),
        descriptor_type::CONFIGURATION => Some(config_descriptor()),
        _ => None,
    }
}

/// Bulk loopback: configuration 1 enables one bulk endpoint pair
fn loopback_config(dev: &mut Device<MockDriver>, configuration: u8) -> device::Result<()> {
    match configuration {
        0 => {
            dev.unregister_endpoint(BULK_OUT);
            Ok(())
        }
        1 => {
            dev.configure_endpoint(BULK_OUT, EndpointType::Bulk, 64)?;
            dev.configure_endpoint(BULK_IN, EndpointType::Bulk, 64)?;
            dev.register_endpoint(BULK_OUT, |dev, event, ep| {
                if event != Event::Rx {
                    return;
                }
                let mut buf = [0u8; 64];
                if let Ok(len) = dev.read_endpoint(ep, &mut buf) {
                    let _ = dev.write_endpoint(BULK_IN, &buf[..len as usize]);
                }
            });
            Ok(())
        }
        _ => Err(UsbError::InvalidEndpoint(configuration)),
    }
}

fn make_device() -> Device<MockDriver> {
    common::init_test_logging();
    let mut dev = Device::new(MockDriver::new(), 64, 8 + 256).unwrap();
    dev.register_descriptor(descriptors);
    dev.register_config(loopback_config);
    dev.control(Command::Enable);
    dev.control(Command::Connect);
    bus_reset(&mut dev);
    dev
}

fn set_configuration(dev: &mut Device<MockDriver>, configuration: u8) -> TransferOutcome {
    run_control_out(dev, SetupPacket::set_configuration(configuration), &[])
}

mod device_requests {
    use super::*;

    #[test]
    fn test_get_device_descriptor() {
        let mut dev = make_device();
        let outcome = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::DEVICE, 0, 0, 18),
        );
        assert_eq!(outcome.data(), Some(device_descriptor()));
    }

    #[test]
    fn test_get_configuration_descriptor_header_then_full() {
        let mut dev = make_device();
        let header = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::CONFIGURATION, 0, 0, 9),
        );
        let header = header.data().unwrap().to_vec();
        let total = u16::from_le_bytes([header[2], header[3]]);
        assert_eq!(total, 9 + 9 + 7 + 7);

        let full = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::CONFIGURATION, 0, 0, total),
        );
        assert_eq!(full.data(), Some(config_descriptor()));
    }

    #[test]
    fn test_unknown_descriptor_stalls() {
        let mut dev = make_device();
        let outcome = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::QUALIFIER, 0, 0, 10),
        );
        assert_eq!(outcome, TransferOutcome::Stalled);
    }

    #[test]
    fn test_no_descriptor_handler_stalls() {
        let mut dev = make_device();
        dev.unregister_descriptor();
        let outcome = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::DEVICE, 0, 0, 18),
        );
        assert!(outcome.is_stalled());
    }

    #[test]
    fn test_runtime_descriptor_from_control_handler() {
        let mut dev = make_device();
        let product = protocol::string_descriptor("Loopback #7").unwrap();
        let expected = product.clone();
        dev.register_control(move |ctx| {
            let setup = *ctx.setup();
            if setup.standard_request() == Some(StandardRequest::GetDescriptor)
                && setup.is_string_request(2)
            {
                return ctx.reply(&product);
            }
            Response::Fail
        });

        let outcome = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::STRING, 2, 0x0409, 255),
        );
        assert_eq!(outcome.data(), Some(&expected[..]));

        let device = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::DEVICE, 0, 0, 18),
        );
        assert_eq!(device.data(), Some(device_descriptor()));
    }

    #[test]
    fn test_internal_serial_number() {
        let mut dev = make_device();
        dev.unregister_descriptor();
        let outcome = run_control_in(
            &mut dev,
            SetupPacket::get_descriptor(descriptor_type::STRING, INTERNAL_SERIAL_INDEX, 0x0409, 255),
        );

        let mut expected = [0u8; SERIAL_DESCRIPTOR_LENGTH];
        serial_descriptor(
            fnv1a32(&[0x0032_0041, 0x3235_5102, 0x2036_3331]),
            &mut expected,
        )
        .unwrap();
        assert_eq!(outcome.data(), Some(&expected[..]));
    }

    #[test]
    fn test_get_status_is_two_zero_bytes() {
        let mut dev = make_device();
        let outcome = run_control_in(&mut dev, SetupPacket::get_status(request_type::DEVICE, 0));
        assert_eq!(
            outcome,
            TransferOutcome::Completed {
                data: vec![0, 0],
                packets: vec![2],
            }
        );
    }

    #[test]
    fn test_device_features_unsupported() {
        let mut dev = make_device();
        let set_feature = SetupPacket::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::DEVICE,
            StandardRequest::SetFeature as u8,
            protocol::feature::DEVICE_REMOTE_WAKEUP,
            0,
            0,
        );
        assert!(run_control_out(&mut dev, set_feature, &[]).is_stalled());
    }
}

mod set_address {
    use super::*;

    #[test]
    fn test_address_applied_after_status_stage() {
        let mut dev = make_device();
        dev.driver_mut().clear_calls();

        dev.driver_mut().push_setup(&SetupPacket::set_address(0x12));
        poll_all(&mut dev);
        assert!(dev.driver().set_address_calls().is_empty());
        assert_eq!(dev.device_state(), DeviceState::Default);

        assert_eq!(
            dev.driver_mut().collect_in(EndpointAddress::EP0_IN),
            Some(Vec::new())
        );
        assert!(dev.driver().set_address_calls().is_empty());
        poll_all(&mut dev);

        assert_eq!(dev.driver().set_address_calls(), vec![0x12]);
        assert_eq!(dev.driver().address(), 0x12);
        assert_eq!(dev.device_state(), DeviceState::Addressed);
    }

    #[test]
    fn test_address_zero_returns_to_default() {
        let mut dev = make_device();
        run_control_out(&mut dev, SetupPacket::set_address(3), &[]);
        assert_eq!(dev.device_state(), DeviceState::Addressed);

        run_control_out(&mut dev, SetupPacket::set_address(0), &[]);
        assert_eq!(dev.device_state(), DeviceState::Default);
        assert_eq!(dev.driver().address(), 0);
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_set_configuration_enables_bulk_pair() {
        let mut dev = make_device();
        run_control_out(&mut dev, SetupPacket::set_address(7), &[]);

        let outcome = set_configuration(&mut dev, 1);
        assert!(matches!(outcome, TransferOutcome::Completed { .. }));
        assert_eq!(dev.device_state(), DeviceState::Configured);
        assert_eq!(dev.configuration(), 1);
        assert!(dev.driver().is_configured(BULK_OUT));
        assert!(dev.driver().is_configured(BULK_IN));

        let outcome = run_control_in(
            &mut dev,
            SetupPacket::new(
                request_type::DEVICE_TO_HOST | request_type::STANDARD | request_type::DEVICE,
                StandardRequest::GetConfiguration as u8,
                0,
                0,
                1,
            ),
        );
        assert_eq!(outcome.data(), Some(&[1u8][..]));
    }

    #[test]
    fn test_bulk_loopback_after_configuration() {
        let mut dev = make_device();
        set_configuration(&mut dev, 1);

        dev.driver_mut().push_out(BULK_OUT, b"ping");
        poll_all(&mut dev);
        assert_eq!(dev.driver_mut().collect_in(BULK_IN), Some(b"ping".to_vec()));
    }

    #[test]
    fn test_failed_configuration_stalls_and_keeps_state() {
        let mut dev = make_device();
        run_control_out(&mut dev, SetupPacket::set_address(7), &[]);

        assert!(set_configuration(&mut dev, 2).is_stalled());
        assert_eq!(dev.device_state(), DeviceState::Addressed);
        assert_eq!(dev.configuration(), 0);
    }

    #[test]
    fn test_packet_memory_exhaustion_rejects_configuration() {
        let mut dev = Device::new(MockDriver::with_packet_memory(160), 64, 8 + 64).unwrap();
        dev.register_config(loopback_config);
        bus_reset(&mut dev);

        assert!(set_configuration(&mut dev, 1).is_stalled());
        assert_eq!(dev.device_state(), DeviceState::Default);
    }

    #[test]
    fn test_missing_config_handler_stalls() {
        let mut dev = make_device();
        dev.unregister_config();
        assert!(set_configuration(&mut dev, 1).is_stalled());
    }

    #[test]
    fn test_configuration_zero_deconfigures() {
        let mut dev = make_device();
        set_configuration(&mut dev, 1);
        assert!(dev.driver().is_configured(BULK_IN));
        dev.driver_mut().clear_calls();

        let outcome = set_configuration(&mut dev, 0);
        assert!(matches!(outcome, TransferOutcome::Completed { .. }));
        assert_eq!(dev.device_state(), DeviceState::Addressed);
        assert_eq!(dev.configuration(), 0);
        assert!(!dev.driver().is_configured(BULK_OUT));
        assert!(!dev.driver().is_configured(BULK_IN));
        assert!(!dev.has_endpoint_handler(BULK_OUT));

        let deconfigured: Vec<_> = dev
            .driver()
            .calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Deconfigure(ep) => Some(ep.number()),
                _ => None,
            })
            .collect();
        assert_eq!(deconfigured, (1..8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_configuration_zero_ignores_handler_error() {
        let mut dev = make_device();
        dev.register_config(|_, _| Err(UsbError::InvalidEndpoint(0)));
        assert!(matches!(
            set_configuration(&mut dev, 0),
            TransferOutcome::Completed { .. }
        ));
        assert_eq!(dev.device_state(), DeviceState::Addressed);
    }
}

mod interface_requests {
    use super::*;

    #[test]
    fn test_interface_get_status() {
        let mut dev = make_device();
        let outcome = run_control_in(&mut dev, SetupPacket::get_status(request_type::INTERFACE, 0));
        assert_eq!(outcome.data(), Some(&[0u8, 0][..]));
    }

    #[test]
    fn test_interface_set_interface_stalls() {
        let mut dev = make_device();
        let setup = SetupPacket::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::INTERFACE,
            StandardRequest::SetInterface as u8,
            1,
            0,
            0,
        );
        assert!(run_control_out(&mut dev, setup, &[]).is_stalled());
    }

    #[test]
    fn test_class_handler_sees_interface_requests_first() {
        let mut dev = make_device();
        dev.register_control(|ctx| {
            if ctx.setup().recipient() == protocol::Recipient::Interface {
                return ctx.reply(&[0xAA, 0xBB]);
            }
            Response::Fail
        });
        let outcome = run_control_in(&mut dev, SetupPacket::get_status(request_type::INTERFACE, 0));
        assert_eq!(outcome.data(), Some(&[0xAAu8, 0xBB][..]));
    }
}

mod endpoint_requests {
    use super::*;

    fn endpoint_status(dev: &mut Device<MockDriver>, ep: EndpointAddress) -> Vec<u8> {
        let outcome = run_control_in(dev, SetupPacket::get_status(request_type::ENDPOINT, ep.0 as u16));
        outcome.data().unwrap().to_vec()
    }

    #[test]
    fn test_halt_round_trip() {
        let mut dev = make_device();
        set_configuration(&mut dev, 1);
        assert_eq!(endpoint_status(&mut dev, BULK_IN), vec![0, 0]);

        run_control_out(&mut dev, SetupPacket::endpoint_halt(BULK_IN, true), &[]);
        assert!(dev.is_stalled(BULK_IN));
        assert_eq!(endpoint_status(&mut dev, BULK_IN), vec![1, 0]);

        run_control_out(&mut dev, SetupPacket::endpoint_halt(BULK_IN, false), &[]);
        assert!(!dev.is_stalled(BULK_IN));
        assert_eq!(endpoint_status(&mut dev, BULK_IN), vec![0, 0]);
    }

    #[test]
    fn test_unknown_endpoint_request_acks() {
        let mut dev = make_device();
        let setup = SetupPacket::new(
            request_type::HOST_TO_DEVICE | request_type::STANDARD | request_type::ENDPOINT,
            StandardRequest::SynchFrame as u8,
            0,
            BULK_IN.0 as u16,
            0,
        );
        assert!(matches!(
            run_control_out(&mut dev, setup, &[]),
            TransferOutcome::Completed { .. }
        ));
    }
}

mod dispatch {
    use super::*;

    #[test]
    fn test_reset_reinitialises_device() {
        let mut dev = make_device();
        run_control_out(&mut dev, SetupPacket::set_address(9), &[]);
        set_configuration(&mut dev, 1);
        assert_eq!(dev.device_state(), DeviceState::Configured);

        dev.driver_mut().clear_calls();
        bus_reset(&mut dev);

        assert_eq!(dev.device_state(), DeviceState::Default);
        assert_eq!(dev.configuration(), 0);
        assert_eq!(dev.control_state(), ControlState::Idle);
        assert_eq!(
            dev.driver().calls,
            vec![
                DriverCall::Configure {
                    ep: EndpointAddress::EP0_OUT,
                    kind: EndpointType::Control,
                    size: 64,
                },
                DriverCall::SetAddress(0),
            ]
        );
    }

    #[test]
    fn test_reset_drops_pending_set_address() {
        let mut dev = make_device();
        dev.driver_mut().push_setup(&SetupPacket::set_address(4));
        poll_all(&mut dev);
        bus_reset(&mut dev);
        dev.driver_mut().push_event(Event::Tx, EndpointAddress::EP0_IN);
        poll_all(&mut dev);

        assert_eq!(dev.driver().address(), 0);
    }

    #[test]
    fn test_event_handlers_follow_endpoint_routing() {
        let mut dev = make_device();
        set_configuration(&mut dev, 1);

        let order = Rc::new(RefCell::new(Vec::new()));
        let log = order.clone();
        dev.register_endpoint(BULK_OUT, move |_, event, ep| {
            log.borrow_mut().push(format!("endpoint {:?} {}", event, ep));
        });
        let log = order.clone();
        dev.register_event(Event::Rx, move |_, event, ep| {
            log.borrow_mut().push(format!("event {:?} {}", event, ep));
        });

        dev.driver_mut().push_out(BULK_OUT, &[1]);
        poll_all(&mut dev);
        assert_eq!(
            *order.borrow(),
            vec!["endpoint Rx 0x01".to_string(), "event Rx 0x01".to_string()]
        );
    }

    #[test]
    fn test_endpoint_routing_ignores_direction() {
        let mut dev = make_device();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        dev.register_endpoint(BULK_OUT, move |_, event, ep| log.borrow_mut().push((event, ep)));

        dev.dispatch(Event::Tx, BULK_IN);
        dev.dispatch(Event::Rx, BULK_OUT);
        assert_eq!(*seen.borrow(), vec![(Event::Tx, BULK_IN), (Event::Rx, BULK_OUT)]);
    }

    #[test]
    fn test_bus_events_reach_event_handlers() {
        let mut dev = make_device();
        let count = Rc::new(Cell::new(0));
        for event in [Event::Sof, Event::Suspend, Event::Wakeup, Event::Error, Event::MissedSof] {
            let count = count.clone();
            dev.register_event(event, move |_, _, _| count.set(count.get() + 1));
        }
        for event in [Event::Sof, Event::Suspend, Event::Wakeup, Event::Error, Event::MissedSof] {
            dev.driver_mut().push_event(event, EndpointAddress::EP0_OUT);
        }
        assert_eq!(poll_all(&mut dev), 5);
        assert_eq!(count.get(), 5);
        assert_eq!(dev.frame_number(), 1);
    }

    #[test]
    fn test_reset_handler_runs_after_reinitialisation() {
        let mut dev = make_device();
        set_configuration(&mut dev, 1);
        let seen = Rc::new(Cell::new(None));
        let state = seen.clone();
        dev.register_event(Event::Reset, move |dev, _, _| {
            state.set(Some((dev.device_state(), dev.configuration())));
        });

        bus_reset(&mut dev);
        assert_eq!(seen.get(), Some((DeviceState::Default, 0)));
    }

    #[test]
    fn test_events_without_reset_are_ignored() {
        let mut dev = Device::new(MockDriver::new(), 64, 72).unwrap();
        dev.driver_mut().push_setup(&SetupPacket::get_status(request_type::DEVICE, 0));
        assert_eq!(poll_all(&mut dev), 1);
        assert_eq!(dev.driver().pending_in(EndpointAddress::EP0_IN), 0);
    }

    #[test]
    fn test_driver_info_reports_state() {
        let dev = make_device();
        let info = dev.driver_info();
        assert!(info.enabled);
        assert!(info.connected);
        assert_eq!(info.speed, device::Speed::Full);
    }
}
