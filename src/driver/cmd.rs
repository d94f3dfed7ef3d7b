//! Provides the commands that can be queued on a bus and the values they return.
//!
//! Commands are validated as soon as they are built, so a command that made it
//! into a queue is always one the device can understand. Building a command
//! with an id or value out of range returns [`BusError::InvalidParameterId`] or
//! [`BusError::InvalidArgument`] without anything being sent.

#[cfg(test)]
mod tests;

pub mod frame;

use super::{
    map,
    parse::{parse_enum_value, ParseError},
    BusError, BusResult,
};
use crate::util::ensure;
use nom::{
    number::complete::{be_i32, be_u16, be_u8},
    sequence::tuple,
    IResult, Parser,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt::Display;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Type of a protocol level command, see [`QueuedCommand::Protocol`]
///
/// Each type carries a value of a different width, values that don't fit are
/// rejected when the command is built.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, FromPrimitive)]
pub enum SmpCommandType {
    /// Value of up to 30 signed bits
    Value32 = 0,
    /// Value of up to 22 signed bits
    Value24 = 1,
    /// Selects the parameter the following values are written to
    SetParamAddr = 2,
}

impl SmpCommandType {
    pub(crate) fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        parse_enum_value(s, be_u8, SmpCommandType::from_u8)
    }

    /// Returns `true` if `value` can be carried by a command of this type
    pub fn accepts(&self, value: i32) -> bool {
        fn fits_signed(value: i32, bits: u32) -> bool {
            let half = 1i32 << (bits - 1);
            (-half..half).contains(&value)
        }
        match self {
            Self::Value32 => fits_signed(value, 30),
            Self::Value24 => fits_signed(value, 22),
            Self::SetParamAddr => (0..=i32::from(map::MAX_PARAM_ID)).contains(&value),
        }
    }
}

impl Display for SmpCommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

//

/// One pending operation in a command queue
///
/// The position of a command in the queue decides which return value belongs
/// to it, see [`Bus::return_value`][super::Bus::return_value].
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum QueuedCommand {
    /// Raw device command, an opcode with a 16 bit parameter
    Raw { opcode: u8, param: u16 },
    /// Protocol level command with a 32 bit parameter
    Protocol { kind: SmpCommandType, value: i32 },
    /// Reads the parameter `id`
    GetParam { id: u16 },
    /// Writes `value` to the parameter `id`
    SetParam { id: u16, value: i32 },
}

fn check_param_id(id: u16) -> BusResult<u16> {
    ensure!(id <= map::MAX_PARAM_ID, BusError::InvalidParameterId(id));
    Ok(id)
}

impl QueuedCommand {
    pub fn raw(opcode: u8, param: u16) -> Self {
        Self::Raw { opcode, param }
    }

    /// Builds a protocol level command from its numeric type
    ///
    /// # Errors
    /// [`BusError::InvalidArgument`] if `kind` is unknown or `value` doesn't
    /// fit into it
    pub fn protocol(kind: u8, value: i32) -> BusResult<Self> {
        let kind = SmpCommandType::from_u8(kind).ok_or(BusError::InvalidArgument)?;
        ensure!(kind.accepts(value), BusError::InvalidArgument);
        Ok(Self::Protocol { kind, value })
    }

    /// # Errors
    /// [`BusError::InvalidParameterId`] if `id` is bigger than the 14 bit
    /// parameter address space
    pub fn get_param(id: u16) -> BusResult<Self> {
        Ok(Self::GetParam {
            id: check_param_id(id)?,
        })
    }

    /// # Errors
    /// [`BusError::InvalidParameterId`] if `id` is bigger than the 14 bit
    /// parameter address space
    pub fn set_param(id: u16, value: i32) -> BusResult<Self> {
        Ok(Self::SetParam {
            id: check_param_id(id)?,
            value,
        })
    }

    /// Checks a command that was built by hand instead of through one of the
    /// constructors
    pub fn validate(&self) -> BusResult<()> {
        match *self {
            Self::Raw { .. } => Ok(()),
            Self::Protocol { kind, value } => {
                ensure!(kind.accepts(value), BusError::InvalidArgument);
                Ok(())
            }
            Self::GetParam { id } | Self::SetParam { id, .. } => check_param_id(id).map(|_| ()),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Raw { .. } => map::ITEM_RAW,
            Self::Protocol { .. } => map::ITEM_SMP,
            Self::GetParam { .. } => map::ITEM_GET_PARAM,
            Self::SetParam { .. } => map::ITEM_SET_PARAM,
        }
    }

    /// Number of bytes the command takes up in a request payload
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Raw { .. } => 4,
            Self::Protocol { .. } => 6,
            Self::GetParam { .. } => 3,
            Self::SetParam { .. } => 7,
        }
    }

    /// Number of bytes the answer to the command takes up in a reply payload
    pub fn reply_len(&self) -> usize {
        match self {
            Self::Raw { .. } => 3,
            _ => 5,
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match *self {
            Self::Raw { opcode, param } => {
                out.push(opcode);
                out.extend_from_slice(&param.to_be_bytes());
            }
            Self::Protocol { kind, value } => {
                out.push(kind as u8);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Self::GetParam { id } => out.extend_from_slice(&id.to_be_bytes()),
            Self::SetParam { id, value } => {
                out.extend_from_slice(&id.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    pub(crate) fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        let (rem, tag) = be_u8::<_, ParseError<&[u8]>>(s)?;
        match tag {
            map::ITEM_RAW => tuple((be_u8, be_u16))
                .map(|(opcode, param)| Self::Raw { opcode, param })
                .parse(rem),
            map::ITEM_SMP => tuple((SmpCommandType::parse, be_i32))
                .map(|(kind, value)| Self::Protocol { kind, value })
                .parse(rem),
            map::ITEM_GET_PARAM => be_u16.map(|id| Self::GetParam { id }).parse(rem),
            map::ITEM_SET_PARAM => tuple((be_u16, be_i32))
                .map(|(id, value)| Self::SetParam { id, value })
                .parse(rem),
            _ => Err(nom::Err::Error(ParseError::InvalidValue)),
        }
    }
}

impl Display for QueuedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw { opcode, param } => write!(f, "raw {:#04x} {}", opcode, param),
            Self::Protocol { kind, value } => write!(f, "smp {} {}", kind, value),
            Self::GetParam { id } => write!(f, "get {}", id),
            Self::SetParam { id, value } => write!(f, "set {}={}", id, value),
        }
    }
}

//

/// Value a device returned for one [`QueuedCommand`]
///
/// The variant always matches the variant of the command it answers.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum ReturnValue {
    Raw(u16),
    Protocol(i32),
    GetParam(i32),
    SetParam(i32),
}

impl ReturnValue {
    /// Returns the value, widened to 32 bits for [`ReturnValue::Raw`]
    pub fn value(&self) -> i32 {
        match *self {
            Self::Raw(v) => v.into(),
            Self::Protocol(v) | Self::GetParam(v) | Self::SetParam(v) => v,
        }
    }

    /// Returns the 16 bit value of an answer to a raw command
    pub fn raw(&self) -> Option<u16> {
        match *self {
            Self::Raw(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if this value is the answer kind for `cmd`
    pub fn answers(&self, cmd: &QueuedCommand) -> bool {
        matches!(
            (self, cmd),
            (Self::Raw(_), QueuedCommand::Raw { .. })
                | (Self::Protocol(_), QueuedCommand::Protocol { .. })
                | (Self::GetParam(_), QueuedCommand::GetParam { .. })
                | (Self::SetParam(_), QueuedCommand::SetParam { .. })
        )
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Raw(v) => {
                out.push(map::ITEM_RAW);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Protocol(v) => {
                out.push(map::ITEM_SMP);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::GetParam(v) => {
                out.push(map::ITEM_GET_PARAM);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::SetParam(v) => {
                out.push(map::ITEM_SET_PARAM);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    pub(crate) fn parse(s: &[u8]) -> IResult<&[u8], Self, ParseError<&[u8]>> {
        let (rem, tag) = be_u8::<_, ParseError<&[u8]>>(s)?;
        match tag {
            map::ITEM_RAW => be_u16.map(Self::Raw).parse(rem),
            map::ITEM_SMP => be_i32.map(Self::Protocol).parse(rem),
            map::ITEM_GET_PARAM => be_i32.map(Self::GetParam).parse(rem),
            map::ITEM_SET_PARAM => be_i32.map(Self::SetParam).parse(rem),
            _ => Err(nom::Err::Error(ParseError::InvalidValue)),
        }
    }
}

impl Display for ReturnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}
