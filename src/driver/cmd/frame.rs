//! Wire format of everything that goes over the bus
//!
//! A batch frame looks like this, all integers big-endian:
//!
//! ```text
//! [cmd u8][address u8][count u8][len u8][payload, len bytes][crc u16]
//! ```
//!
//! `count` is the number of commands (or return values) in the payload and the
//! crc covers every byte before it. The fast update cycle uses a shorter frame
//! with a fixed size, see [`FastFrame`].
//!
//! Both directions are implemented, so the same module can be used to simulate
//! a device.


use super::{
    super::{
        map,
        parse::{parse_complete, ParseError},
        BusError, BusResult,
    },
    QueuedCommand, ReturnValue,
};
use crate::util::ensure;
use crc::{Crc, CRC_16_XMODEM};
use nom::{
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u8},
    sequence::tuple,
    IResult, Parser,
};
use std::fmt::Display;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Holds the address of a device
///
/// Used to discern whether something is addressed to a specific device or to
/// all devices on the bus. On the wire, broadcast is address `0`.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum DeviceAddress {
    Broadcast,
    Single(u8),
}

impl DeviceAddress {
    pub(crate) fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        be_u8.map(Self::from).parse(s)
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Turns a hand built `Single(0)` into [`DeviceAddress::Broadcast`], which
    /// is what it means on the wire
    pub fn normalized(self) -> Self {
        Self::from(u8::from(self))
    }

    pub fn single_or<E>(self, error: E) -> Result<u8, E> {
        match self {
            Self::Broadcast => Err(error),
            Self::Single(a) => Ok(a),
        }
    }
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "*"),
            Self::Single(a) => write!(f, "{}", a),
        }
    }
}

impl From<u8> for DeviceAddress {
    fn from(a: u8) -> Self {
        if a == map::BROADCAST_ADDRESS {
            Self::Broadcast
        } else {
            Self::Single(a)
        }
    }
}

impl From<DeviceAddress> for u8 {
    fn from(a: DeviceAddress) -> Self {
        match a {
            DeviceAddress::Broadcast => map::BROADCAST_ADDRESS,
            DeviceAddress::Single(a) => a,
        }
    }
}

//

/// Checksum appended to every frame
///
/// CRC-16/XMODEM, polynomial 0x1021 with initial value 0.
pub const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Bytes before the payload of a batch frame
pub const HEADER_LEN: usize = 4;

/// Bytes of the checksum at the end of every frame
pub const CRC_LEN: usize = 2;

fn push_crc(out: &mut Vec<u8>) {
    let crc = FRAME_CRC.checksum(out);
    out.extend_from_slice(&crc.to_be_bytes());
}

// checks the trailing crc, only called on bytes that already parsed as a
// frame so there always is one
fn check_crc(bytes: &[u8]) -> BusResult<()> {
    let (data, crc) = bytes.split_at(bytes.len() - CRC_LEN);
    let actual = u16::from_be_bytes([crc[0], crc[1]]);
    let expected = FRAME_CRC.checksum(data);
    ensure!(
        expected == actual,
        BusError::CrcMismatch { expected, actual }
    );
    Ok(())
}

//

/// A complete batch frame, with a payload that hasn't been looked into yet
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Frame {
    pub cmd: u8,
    pub address: DeviceAddress,
    pub count: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serializes the frame and appends the checksum
    ///
    /// # Errors
    /// [`BusError::FrameTooLong`] if the payload doesn't fit into a frame
    pub fn encode(&self) -> BusResult<Vec<u8>> {
        ensure!(
            self.payload.len() <= map::MAX_PAYLOAD,
            BusError::FrameTooLong(self.payload.len())
        );
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CRC_LEN);
        out.push(self.cmd);
        out.push(self.address.into());
        out.push(self.count);
        // can't truncate, checked above
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        push_crc(&mut out);
        Ok(out)
    }

    fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        tuple((
            be_u8,
            DeviceAddress::parse,
            be_u8,
            be_u8.flat_map(take),
            be_u16,
        ))
        .map(|(cmd, address, count, payload, _crc)| Self {
            cmd,
            address,
            count,
            payload: payload.to_vec(),
        })
        .parse(s)
    }

    /// Parses a complete frame and verifies its checksum
    ///
    /// # Errors
    /// [`BusError::ParsingError`] if the bytes aren't exactly one frame,
    /// [`BusError::CrcMismatch`] if the checksum is wrong
    pub fn decode(bytes: &[u8]) -> BusResult<Self> {
        let frame = parse_complete(bytes, Self::parse)?;
        check_crc(bytes)?;
        Ok(frame)
    }

    /// Returns how many bytes follow a frame header, checksum included
    pub fn remaining_len(header: &[u8; HEADER_LEN]) -> usize {
        usize::from(header[3]) + CRC_LEN
    }

    /// Checks that the frame is a `cmd` frame coming from `address`
    pub fn expect(self, cmd: u8, address: DeviceAddress) -> BusResult<Self> {
        ensure!(self.cmd == cmd, BusError::UnexpectedReply(self.cmd));
        ensure!(
            self.address == address,
            BusError::UnexpectedResponse(self.address)
        );
        Ok(self)
    }
}

//

/// Decoded batch request, as a device sees it
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Request {
    pub cmd: u8,
    pub address: DeviceAddress,
    pub commands: Vec<QueuedCommand>,
}

fn encode_items<T>(
    items: &[T],
    write: impl Fn(&T, &mut Vec<u8>),
) -> BusResult<(u8, Vec<u8>)> {
    let cnt = u8::try_from(items.len()).map_err(|_| BusError::FrameTooLong(items.len()))?;
    let mut payload = Vec::new();
    items.iter().for_each(|i| write(i, &mut payload));
    Ok((cnt, payload))
}

/// Builds a request frame carrying `commands` in order
pub fn encode_request(
    cmd: u8,
    address: DeviceAddress,
    commands: &[QueuedCommand],
) -> BusResult<Vec<u8>> {
    let (count, payload) = encode_items(commands, QueuedCommand::write_to)?;
    Frame {
        cmd,
        address,
        count,
        payload,
    }
    .encode()
}

/// Parses a request frame back into its commands
pub fn decode_request(bytes: &[u8]) -> BusResult<Request> {
    let frame = Frame::decode(bytes)?;
    let commands = parse_complete(
        &frame.payload,
        count(QueuedCommand::parse, frame.count.into()),
    )?;
    Ok(Request {
        cmd: frame.cmd,
        address: frame.address,
        commands,
    })
}

/// Builds a reply frame carrying `values` in order
pub fn encode_reply(
    cmd: u8,
    address: DeviceAddress,
    values: &[ReturnValue],
) -> BusResult<Vec<u8>> {
    let (count, payload) = encode_items(values, ReturnValue::write_to)?;
    Frame {
        cmd,
        address,
        count,
        payload,
    }
    .encode()
}

/// Parses the reply to a batch of `sent` commands
///
/// # Errors
/// - [`BusError::UnexpectedReply`] or [`BusError::UnexpectedResponse`] if the
///   reply isn't a `cmd` reply from `address`
/// - [`BusError::CountMismatch`] if the reply carries a different number of
///   values than commands were sent
/// - [`BusError::NonMatchingReply`] if a value doesn't answer the command at
///   the same position
/// - whatever [`Frame::decode`] returns
pub fn decode_reply(
    bytes: &[u8],
    cmd: u8,
    address: DeviceAddress,
    sent: &[QueuedCommand],
) -> BusResult<Vec<ReturnValue>> {
    let frame = Frame::decode(bytes)?.expect(cmd, address)?;
    ensure!(
        usize::from(frame.count) == sent.len(),
        BusError::CountMismatch {
            expected: sent.len(),
            actual: frame.count.into(),
        }
    );
    let values = parse_complete(
        &frame.payload,
        count(ReturnValue::parse, frame.count.into()),
    )?;
    if let Some(i) = values.iter().zip(sent).position(|(v, c)| !v.answers(c)) {
        return Err(BusError::NonMatchingReply(i));
    }
    Ok(values)
}

/// Builds the acknowledge of a device that staged `count` commands into its
/// buffer
pub fn encode_ack(cmd: u8, address: DeviceAddress, count: u8) -> BusResult<Vec<u8>> {
    Frame {
        cmd,
        address,
        count,
        payload: Vec::new(),
    }
    .encode()
}

/// Parses the acknowledge of a buffered batch of `expected` commands
///
/// # Errors
/// [`BusError::CountMismatch`] if the device staged a different number of
/// commands, [`BusError::ParsingError`] if the acknowledge carries a payload
pub fn decode_ack(
    bytes: &[u8],
    cmd: u8,
    address: DeviceAddress,
    expected: usize,
) -> BusResult<()> {
    let frame = Frame::decode(bytes)?.expect(cmd, address)?;
    ensure!(
        usize::from(frame.count) == expected,
        BusError::CountMismatch {
            expected,
            actual: frame.count.into(),
        }
    );
    ensure!(
        frame.payload.is_empty(),
        BusError::ParsingError(ParseError::NonEmptyRemainder)
    );
    Ok(())
}

/// Builds the reply to a buffer clock request
pub fn encode_clock_reply(address: DeviceAddress, clock: u16) -> BusResult<Vec<u8>> {
    Frame {
        cmd: map::GET_CLOCK_RET,
        address,
        count: 1,
        payload: clock.to_be_bytes().to_vec(),
    }
    .encode()
}

/// Parses the reply to a buffer clock request sent to `address`
pub fn decode_clock_reply(bytes: &[u8], address: DeviceAddress) -> BusResult<u16> {
    let frame = Frame::decode(bytes)?.expect(map::GET_CLOCK_RET, address)?;
    Ok(parse_complete(&frame.payload, be_u16)?)
}

//

/// Frame of the fast update cycle, two 16 bit words in either direction
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct FastFrame {
    pub cmd: u8,
    pub address: DeviceAddress,
    pub words: [u16; 2],
}

impl FastFrame {
    /// Size of a fast update cycle frame, checksum included
    pub const LEN: usize = 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.cmd);
        out.push(self.address.into());
        out.extend_from_slice(&self.words[0].to_be_bytes());
        out.extend_from_slice(&self.words[1].to_be_bytes());
        push_crc(&mut out);
        out
    }

    fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        tuple((be_u8, DeviceAddress::parse, be_u16, be_u16, be_u16))
            .map(|(cmd, address, w1, w2, _crc)| Self {
                cmd,
                address,
                words: [w1, w2],
            })
            .parse(s)
    }

    pub fn decode(bytes: &[u8]) -> BusResult<Self> {
        let frame = parse_complete(bytes, Self::parse)?;
        check_crc(bytes)?;
        Ok(frame)
    }

    /// Checks that the frame is a `cmd` frame coming from `address`
    pub fn expect(self, cmd: u8, address: DeviceAddress) -> BusResult<Self> {
        ensure!(self.cmd == cmd, BusError::UnexpectedReply(self.cmd));
        ensure!(
            self.address == address,
            BusError::UnexpectedResponse(self.address)
        );
        Ok(self)
    }
}
