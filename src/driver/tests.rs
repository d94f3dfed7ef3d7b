use super::{
    cmd::{
        frame::{self, DeviceAddress, FastFrame},
        QueuedCommand, ReturnValue,
    },
    config::BusConfig,
    map,
    queue::QueuePhase,
    status::Status,
    transport::Transport,
    version, Bus, BusError,
};
use simplemotion_test::Interface;
use std::io::{self, Read, Write};

impl Transport for Interface {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(self.pending_read() as u32)
    }
}

// hands out a single byte per read, like a slow device
struct Trickle(Interface);

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(1);
        self.0.read(&mut buf[..n])
    }
}

impl Write for Trickle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Transport for Trickle {
    fn bytes_to_read(&self) -> io::Result<u32> {
        self.0.bytes_to_read()
    }
}

const DEV: DeviceAddress = DeviceAddress::Single(1);

fn bus(interface: &Interface) -> Bus {
    Bus::with_transport("mock", interface.clone(), BusConfig::new())
}

fn request(sent: &[QueuedCommand]) -> Vec<u8> {
    frame::encode_request(map::BATCH_CMD, DEV, sent).unwrap()
}

fn reply(values: &[ReturnValue]) -> Vec<u8> {
    frame::encode_reply(map::BATCH_CMD_RET, DEV, values).unwrap()
}

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

#[test]
fn execute_get_params() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::GetParam { id: 5 },
        QueuedCommand::GetParam { id: 7 },
    ];
    interface.add_exchange(
        &request(&sent),
        &reply(&[ReturnValue::GetParam(500), ReturnValue::GetParam(-7)]),
    );

    bus.append_get_param(5).unwrap();
    bus.append_get_param(7).unwrap();
    assert_eq!(bus.queue().phase(), QueuePhase::Accumulating);
    bus.execute(1).unwrap();

    assert!(interface.is_empty());
    assert_eq!(bus.queue().phase(), QueuePhase::ResultsReady);
    assert!(bus.queue().is_empty());
    assert_eq!(bus.return_value(0).unwrap(), ReturnValue::GetParam(500));
    assert_eq!(bus.return_value(1).unwrap().value(), -7);
    assert_eq!(bus.cumulative_status(), Status::OK);
}

#[test]
fn execute_mixed_commands() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::Raw {
            opcode: 0x20,
            param: 0x1234,
        },
        QueuedCommand::protocol(0, -100).unwrap(),
        QueuedCommand::SetParam { id: 9, value: 42 },
    ];
    interface.add_exchange(
        &request(&sent),
        &reply(&[
            ReturnValue::Raw(0xbeef),
            ReturnValue::Protocol(0),
            ReturnValue::SetParam(1),
        ]),
    );

    bus.append_command(0x20, 0x1234).unwrap();
    bus.append_sm_command(0, -100).unwrap();
    bus.append_set_param(9, 42).unwrap();
    bus.execute(1).unwrap();

    assert!(interface.is_empty());
    assert_eq!(bus.return_value(0).unwrap().raw(), Some(0xbeef));
    assert_eq!(bus.return_value(2).unwrap(), ReturnValue::SetParam(1));
}

#[test]
fn next_return_value() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::GetParam { id: 1 },
        QueuedCommand::GetParam { id: 2 },
    ];
    interface.add_exchange(
        &request(&sent),
        &reply(&[ReturnValue::GetParam(10), ReturnValue::GetParam(20)]),
    );

    bus.append_get_param(1).unwrap();
    bus.append_get_param(2).unwrap();
    bus.execute(1).unwrap();

    assert_eq!(bus.next_return_value().unwrap().value(), 10);
    assert_eq!(bus.next_return_value().unwrap().value(), 20);
    assert!(matches!(
        bus.next_return_value(),
        Err(BusError::IndexOutOfRange { index: 2, len: 2 })
    ));
    assert!(bus.cumulative_status().contains(Status::PARAMETER));
}

#[test]
fn execute_timeout_drops_results() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let first = [QueuedCommand::GetParam { id: 5 }];
    interface.add_exchange(&request(&first), &reply(&[ReturnValue::GetParam(1)]));
    bus.append_get_param(5).unwrap();
    bus.execute(1).unwrap();

    // nobody answers this time
    interface.add_write(&request(&first));
    bus.append_get_param(5).unwrap();
    let r = bus.execute(1);

    assert!(matches!(r, Err(BusError::Timeout)));
    assert!(interface.is_empty());
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
    assert!(matches!(bus.return_value(0), Err(BusError::NoResults)));
    assert_eq!(
        bus.cumulative_status(),
        Status::OK | Status::COMMUNICATION | Status::PARAMETER
    );
}

#[test]
fn execute_corrupt_crc_keeps_results() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [QueuedCommand::GetParam { id: 5 }];
    interface.add_exchange(&request(&sent), &reply(&[ReturnValue::GetParam(1)]));
    bus.append_get_param(5).unwrap();
    bus.execute(1).unwrap();

    let mut broken = reply(&[ReturnValue::GetParam(2)]);
    *broken.last_mut().unwrap() ^= 0xff;
    interface.add_exchange(&request(&sent), &broken);
    bus.append_get_param(5).unwrap();
    let r = bus.execute(1);

    assert!(matches!(r, Err(BusError::CrcMismatch { .. })));
    assert!(interface.is_empty());
    assert!(bus.queue().is_empty());
    assert_eq!(bus.return_value(0).unwrap(), ReturnValue::GetParam(1));
    assert!(bus.cumulative_status().contains(Status::COMMUNICATION));
}

#[test]
fn execute_count_mismatch() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::GetParam { id: 5 },
        QueuedCommand::GetParam { id: 6 },
    ];
    interface.add_exchange(&request(&sent), &reply(&[ReturnValue::GetParam(1)]));

    bus.append_get_param(5).unwrap();
    bus.append_get_param(6).unwrap();
    let r = bus.execute(1);

    assert!(matches!(
        r,
        Err(BusError::CountMismatch {
            expected: 2,
            actual: 1
        })
    ));
    assert!(bus.cumulative_status().contains(Status::LENGTH));
}

#[test]
fn execute_other_device_replies() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [QueuedCommand::GetParam { id: 5 }];
    interface.add_exchange(
        &request(&sent),
        &frame::encode_reply(
            map::BATCH_CMD_RET,
            DeviceAddress::Single(2),
            &[ReturnValue::GetParam(1)],
        )
        .unwrap(),
    );

    bus.append_get_param(5).unwrap();
    let r = bus.execute(1);

    assert!(matches!(
        r,
        Err(BusError::UnexpectedResponse(DeviceAddress::Single(2)))
    ));
}

#[test]
fn execute_broadcast() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [QueuedCommand::SetParam { id: 3, value: 1 }];
    interface.add_write(
        &frame::encode_request(map::BATCH_CMD, DeviceAddress::Broadcast, &sent).unwrap(),
    );

    bus.append_set_param(3, 1).unwrap();
    bus.execute(0).unwrap();

    assert!(interface.is_empty());
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
    assert_eq!(bus.cumulative_status(), Status::OK);
}

#[test]
fn append_invalid_is_local() {
    let interface = Interface::new();
    let mut bus = bus(&interface);

    assert!(matches!(
        bus.append_get_param(0x4000),
        Err(BusError::InvalidParameterId(0x4000))
    ));
    assert!(matches!(
        bus.append_sm_command(1, 1 << 21),
        Err(BusError::InvalidArgument)
    ));
    assert!(matches!(
        bus.append_sm_command(7, 0),
        Err(BusError::InvalidArgument)
    ));

    assert_eq!(bus.cumulative_status(), Status::NONE);
    assert_eq!(interface.write_count(), 0);
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
}

#[test]
fn append_too_long() {
    let interface = Interface::new();
    let mut bus = bus(&interface);
    // 51 replies of 5 bytes fill a frame exactly
    for id in 0..51 {
        bus.append_get_param(id).unwrap();
    }

    assert!(matches!(
        bus.append_get_param(51),
        Err(BusError::FrameTooLong(260))
    ));
    assert_eq!(bus.queue().len(), 51);
    assert_eq!(bus.cumulative_status(), Status::OK);
}

#[test]
fn clear_queue() {
    let interface = Interface::new();
    let mut bus = bus(&interface);
    bus.append_get_param(1).unwrap();
    bus.clear_queue();

    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
    assert_eq!(interface.write_count(), 0);
}

//

#[test]
fn read_parameters() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::GetParam { id: 5 },
        QueuedCommand::GetParam { id: 7 },
        QueuedCommand::GetParam { id: 9 },
    ];
    interface.add_exchange(
        &request(&sent),
        &reply(&[
            ReturnValue::GetParam(50),
            ReturnValue::GetParam(70),
            ReturnValue::GetParam(90),
        ]),
    );

    let r = bus.read_parameters(1, [5, 7, 9]).unwrap();

    assert_eq!(r, [50, 70, 90]);
    assert!(interface.is_empty());
    assert_eq!(bus.cumulative_status(), Status::OK);
}

#[test]
fn read_parameter_after_pending() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::SetParam { id: 5, value: 3 },
        QueuedCommand::GetParam { id: 5 },
    ];
    interface.add_exchange(
        &request(&sent),
        &reply(&[ReturnValue::SetParam(0), ReturnValue::GetParam(3)]),
    );

    bus.append_set_param(5, 3).unwrap();
    let r = bus.read_parameter(1, 5).unwrap();

    assert_eq!(r, 3);
    assert_eq!(bus.return_value(0).unwrap(), ReturnValue::SetParam(0));
}

#[test]
fn read_parameters_invalid() {
    let interface = Interface::new();
    let mut bus = bus(&interface);

    assert!(matches!(
        bus.read_parameters::<0>(1, []),
        Err(BusError::InvalidArgument)
    ));
    assert!(matches!(
        bus.read_parameters(1, [1, 2, 3, 4]),
        Err(BusError::InvalidArgument)
    ));
    assert!(matches!(
        bus.read_parameter(0, 1),
        Err(BusError::BroadcastNotAllowed)
    ));
    assert!(matches!(
        bus.read_parameters(1, [1, 0x4000]),
        Err(BusError::InvalidParameterId(0x4000))
    ));
    assert!(bus.queue().is_empty());
    assert_eq!(interface.write_count(), 0);
}

#[test]
fn read_parameters_too_long_queues_nothing() {
    let interface = Interface::new();
    let mut bus = bus(&interface);
    // 36 * 7 = 252 request bytes, room for one more get but not two
    for id in 0..36 {
        bus.append_set_param(id, 0).unwrap();
    }

    assert!(matches!(
        bus.read_parameters(1, [1, 2]),
        Err(BusError::FrameTooLong(258))
    ));
    assert_eq!(bus.queue().len(), 36);
    assert!(matches!(
        bus.queue().pending().last(),
        Some(QueuedCommand::SetParam { id: 35, .. })
    ));
    assert_eq!(interface.write_count(), 0);
}

#[test]
fn single_zero_is_broadcast() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);

    assert!(matches!(
        bus.read_parameter(DeviceAddress::Single(0), 5),
        Err(BusError::BroadcastNotAllowed)
    ));
    assert!(matches!(
        bus.fast_update_cycle(DeviceAddress::Single(0), 0, 0),
        Err(BusError::BroadcastNotAllowed)
    ));
    assert_eq!(interface.write_count(), 0);

    // sent without waiting for a reply, like any broadcast
    let sent = [QueuedCommand::SetParam { id: 3, value: 1 }];
    interface.add_write(
        &frame::encode_request(map::BATCH_CMD, DeviceAddress::Broadcast, &sent).unwrap(),
    );
    bus.set_parameter(DeviceAddress::Single(0), 3, 1).unwrap();
    assert!(interface.is_empty());
}

#[test]
fn set_parameter() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [QueuedCommand::SetParam { id: 12, value: -1 }];
    interface.add_exchange(&request(&sent), &reply(&[ReturnValue::SetParam(0)]));

    bus.set_parameter(1, 12, -1).unwrap();

    assert!(interface.is_empty());
}

//

#[test]
fn upload_to_device_buffer() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::SetParam { id: 1, value: 1 },
        QueuedCommand::SetParam { id: 1, value: 2 },
    ];
    interface.add_exchange(
        &frame::encode_request(map::BUFFERED_CMD, DEV, &sent).unwrap(),
        &frame::encode_ack(map::BUFFERED_CMD_RET, DEV, 2).unwrap(),
    );

    bus.append_set_param(1, 1).unwrap();
    bus.append_set_param(1, 2).unwrap();
    bus.upload_to_device_buffer(1).unwrap();

    assert!(interface.is_empty());
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
}

#[test]
fn upload_partially_staged() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let sent = [
        QueuedCommand::SetParam { id: 1, value: 1 },
        QueuedCommand::SetParam { id: 1, value: 2 },
    ];
    interface.add_exchange(
        &frame::encode_request(map::BUFFERED_CMD, DEV, &sent).unwrap(),
        &frame::encode_ack(map::BUFFERED_CMD_RET, DEV, 1).unwrap(),
    );

    bus.append_set_param(1, 1).unwrap();
    bus.append_set_param(1, 2).unwrap();

    assert!(matches!(
        bus.upload_to_device_buffer(1),
        Err(BusError::CountMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn get_buffer_clock() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    interface.add_exchange(
        &frame::Frame {
            cmd: map::GET_CLOCK,
            address: DEV,
            count: 0,
            payload: Vec::new(),
        }
        .encode()
        .unwrap(),
        &frame::encode_clock_reply(DEV, 0x4321).unwrap(),
    );

    assert_eq!(bus.get_buffer_clock(1).unwrap(), 0x4321);
    assert!(interface.is_empty());
}

#[test]
fn fast_update_cycle() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let request = FastFrame {
        cmd: map::FAST_UPDATE_CYCLE,
        address: DEV,
        words: [100, 200],
    };
    let reply = FastFrame {
        cmd: map::FAST_UPDATE_CYCLE_RET,
        address: DEV,
        words: [1, 0xffff],
    };
    interface.add_exchange(&request.encode(), &reply.encode());

    let r = bus.fast_update_cycle(1, 100, 200).unwrap();

    assert_eq!(r, (1, 0xffff));
    assert!(interface.is_empty());
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
}

#[test]
fn fast_update_cycle_timeout() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    let request = FastFrame {
        cmd: map::FAST_UPDATE_CYCLE,
        address: DEV,
        words: [0, 0],
    };
    interface.add_write(&request.encode());
    // half a frame, then silence
    interface.add_read(&[map::FAST_UPDATE_CYCLE_RET, 1, 0, 0]);

    assert!(matches!(
        bus.fast_update_cycle(1, 0, 0),
        Err(BusError::Timeout)
    ));
    assert_eq!(bus.cumulative_status(), Status::COMMUNICATION);
}

#[test]
fn slow_reply_within_timeout() {
    let mut interface = Interface::new();
    let mut bus = Bus::with_transport("slow", Trickle(interface.clone()), BusConfig::new());
    let sent = [QueuedCommand::GetParam { id: 5 }];
    interface.add_exchange(&request(&sent), &reply(&[ReturnValue::GetParam(9)]));

    assert_eq!(bus.read_parameter(1, 5).unwrap(), 9);
    assert!(interface.is_empty());
}

#[test]
fn slow_reply_past_deadline() {
    let mut interface = Interface::new();
    let config = BusConfig::new().with_timeout(0).unwrap();
    let mut bus = Bus::with_transport("slow", Trickle(interface.clone()), config);
    let sent = [QueuedCommand::GetParam { id: 5 }];
    interface.add_exchange(&request(&sent), &reply(&[ReturnValue::GetParam(9)]));

    // every byte is there, but one per read takes longer than the whole reply
    // may take
    assert!(matches!(bus.read_parameter(1, 5), Err(BusError::Timeout)));
    assert_eq!(bus.queue().phase(), QueuePhase::Idle);
}

#[test]
fn fast_update_cycle_broadcast() {
    let interface = Interface::new();
    let mut bus = bus(&interface);

    assert!(matches!(
        bus.fast_update_cycle(0, 0, 0),
        Err(BusError::BroadcastNotAllowed)
    ));
    assert_eq!(bus.cumulative_status(), Status::PARAMETER);
    assert_eq!(interface.write_count(), 0);
}

//

#[test]
fn reset_cumulative_status() {
    let interface = Interface::new();
    let mut bus = bus(&interface);
    assert_eq!(bus.cumulative_status(), Status::NONE);

    let _ = bus.return_value(0);
    assert_eq!(bus.cumulative_status(), Status::PARAMETER);

    bus.reset_cumulative_status();
    bus.reset_cumulative_status();
    assert_eq!(bus.cumulative_status(), Status::NONE);
}

#[test]
fn bytes_received() {
    let mut interface = Interface::new();
    let mut bus = bus(&interface);
    interface.add_read(&[1, 2, 3]);

    assert_eq!(bus.bytes_received().unwrap(), 3);
    assert_eq!(bus.cumulative_status(), Status::OK);
}

#[test]
fn error_status() {
    assert_eq!(BusError::NoDevice("x".into()).status(), Status::NO_DEVICE);
    assert_eq!(BusError::NoFreeSlot(5).status(), Status::BUS);
    assert_eq!(BusError::Timeout.status(), Status::COMMUNICATION);
    assert_eq!(BusError::NoResults.status(), Status::PARAMETER);
    assert_eq!(BusError::FrameTooLong(300).status(), Status::LENGTH);
    assert_eq!(
        BusError::from(io::Error::from(io::ErrorKind::BrokenPipe)).status(),
        Status::BUS
    );
}

#[test]
fn version_matches_manifest() {
    let v = version();
    let expected = format!(
        "{}.{}.{}",
        v >> 16,
        (v >> 8) & 0xff,
        v & 0xff
    );
    assert_eq!(expected, env!("CARGO_PKG_VERSION"));
}

#[test]
fn close() {
    let interface = Interface::new();
    let bus = bus(&interface);
    bus.close().unwrap();
}
