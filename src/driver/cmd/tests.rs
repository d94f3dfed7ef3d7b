use super::{QueuedCommand, ReturnValue, SmpCommandType};
use crate::driver::{parse::parse_complete, BusError};

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

#[test]
fn smp_value_widths() {
    assert!(SmpCommandType::Value32.accepts((1 << 29) - 1));
    assert!(SmpCommandType::Value32.accepts(-(1 << 29)));
    assert!(!SmpCommandType::Value32.accepts(1 << 29));
    assert!(SmpCommandType::Value24.accepts(-(1 << 21)));
    assert!(!SmpCommandType::Value24.accepts(1 << 21));
    assert!(SmpCommandType::SetParamAddr.accepts(0x3fff));
    assert!(!SmpCommandType::SetParamAddr.accepts(0x4000));
    assert!(!SmpCommandType::SetParamAddr.accepts(-1));
}

#[test]
fn constructors() {
    assert_eq!(
        QueuedCommand::protocol(2, 100).unwrap(),
        QueuedCommand::Protocol {
            kind: SmpCommandType::SetParamAddr,
            value: 100
        }
    );
    assert!(matches!(
        QueuedCommand::protocol(3, 0),
        Err(BusError::InvalidArgument)
    ));
    assert_eq!(
        QueuedCommand::get_param(0x3fff).unwrap(),
        QueuedCommand::GetParam { id: 0x3fff }
    );
    assert!(matches!(
        QueuedCommand::set_param(0xffff, 1),
        Err(BusError::InvalidParameterId(0xffff))
    ));
}

#[test]
fn validate_hand_built() {
    let bad = QueuedCommand::Protocol {
        kind: SmpCommandType::Value24,
        value: i32::MAX,
    };
    assert!(matches!(bad.validate(), Err(BusError::InvalidArgument)));
    assert!(QueuedCommand::raw(0xff, 0xffff).validate().is_ok());
}

//

#[test]
fn write_raw() {
    let mut out = Vec::new();
    QueuedCommand::raw(0x20, 0x1234).write_to(&mut out);
    assert_eq!(out, [0x00, 0x20, 0x12, 0x34]);
}

#[test]
fn write_protocol() {
    let mut out = Vec::new();
    QueuedCommand::protocol(1, -2).unwrap().write_to(&mut out);
    assert_eq!(out, [0x01, 0x01, 0xff, 0xff, 0xff, 0xfe]);
}

#[test]
fn write_get_set() {
    let mut out = Vec::new();
    QueuedCommand::GetParam { id: 0x0102 }.write_to(&mut out);
    QueuedCommand::SetParam {
        id: 0x0304,
        value: 0x05060708,
    }
    .write_to(&mut out);
    assert_eq!(
        out,
        [0x02, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
    );
}

#[test]
fn encoded_lengths_match() {
    let cmds = [
        QueuedCommand::raw(1, 2),
        QueuedCommand::protocol(0, 3).unwrap(),
        QueuedCommand::GetParam { id: 4 },
        QueuedCommand::SetParam { id: 5, value: 6 },
    ];
    for c in cmds {
        let mut out = Vec::new();
        c.write_to(&mut out);
        assert_eq!(out.len(), c.encoded_len(), "{}", c);
    }
}

#[test]
fn parse_command() {
    let c = parse_complete(&[0x03, 0x00, 0x09, 0xff, 0xff, 0xff, 0xff], QueuedCommand::parse)
        .unwrap();
    assert_eq!(c, QueuedCommand::SetParam { id: 9, value: -1 });
}

#[test]
fn parse_command_unknown_tag() {
    assert!(parse_complete(&[0x09, 0x00, 0x00], QueuedCommand::parse).is_err());
}

#[test]
fn parse_command_unknown_smp_type() {
    assert!(parse_complete(&[0x01, 0x07, 0, 0, 0, 0], QueuedCommand::parse).is_err());
}

//

#[test]
fn parse_return_values() {
    let v = parse_complete(&[0x00, 0xbe, 0xef], ReturnValue::parse).unwrap();
    assert_eq!(v, ReturnValue::Raw(0xbeef));
    assert_eq!(v.value(), 0xbeef);

    let v = parse_complete(&[0x02, 0x80, 0x00, 0x00, 0x00], ReturnValue::parse).unwrap();
    assert_eq!(v, ReturnValue::GetParam(i32::MIN));
    assert_eq!(v.raw(), None);
}

#[test]
fn reply_lengths_match() {
    let values = [
        (ReturnValue::Raw(1), QueuedCommand::raw(0, 0)),
        (ReturnValue::Protocol(1), QueuedCommand::protocol(0, 0).unwrap()),
        (ReturnValue::GetParam(1), QueuedCommand::GetParam { id: 0 }),
        (ReturnValue::SetParam(1), QueuedCommand::SetParam { id: 0, value: 0 }),
    ];
    for (v, c) in values {
        let mut out = Vec::new();
        v.write_to(&mut out);
        assert_eq!(out.len(), c.reply_len(), "{}", c);
        assert!(v.answers(&c));
    }
}

#[test]
fn answers_only_same_kind() {
    assert!(!ReturnValue::GetParam(0).answers(&QueuedCommand::SetParam { id: 0, value: 0 }));
    assert!(!ReturnValue::Raw(0).answers(&QueuedCommand::GetParam { id: 0 }));
}

#[test]
fn display() {
    assert_eq!(QueuedCommand::raw(0x20, 7).to_string(), "raw 0x20 7");
    assert_eq!(
        QueuedCommand::SetParam { id: 3, value: -4 }.to_string(),
        "set 3=-4"
    );
    assert_eq!(ReturnValue::Raw(65535).to_string(), "65535");
}
