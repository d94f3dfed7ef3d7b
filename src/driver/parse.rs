use nom::{IResult, Parser};
use std::fmt::Debug;
use thiserror::Error;

/// Gets thrown when there is an error while parsing a frame or one of the
/// items inside of it
#[derive(Error, Debug)]
pub enum ParseError<I: Debug> {
    /// Gets thrown when a value doesn't have a matching enum variant, for
    /// example an unknown item tag or protocol command type.
    #[error("invalid value while parsing")]
    InvalidValue,
    /// Gets thrown when the input contained more bytes than the parsed frame
    #[error("input has bytes after the end of the frame")]
    NonEmptyRemainder,
    /// Wrapper around [`nom::error::Error`]
    #[error("nom error: {0:?}")]
    NomError(nom::error::Error<I>),
}

impl<I: Debug> nom::error::ParseError<I> for ParseError<I> {
    fn from_error_kind(input: I, kind: nom::error::ErrorKind) -> Self {
        Self::NomError(nom::error::Error::from_error_kind(input, kind))
    }

    /// basically copied from nom::error::Error::append
    fn append(_: I, _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I: Debug> From<nom::error::Error<I>> for ParseError<I> {
    fn from(e: nom::error::Error<I>) -> Self {
        Self::NomError(e)
    }
}

impl From<ParseError<&[u8]>> for ParseError<Vec<u8>> {
    fn from(e: ParseError<&[u8]>) -> Self {
        match e {
            ParseError::InvalidValue => ParseError::InvalidValue,
            ParseError::NonEmptyRemainder => ParseError::NonEmptyRemainder,
            ParseError::NomError(e) => ParseError::NomError(nom::error::Error {
                input: e.input.to_vec(),
                code: e.code,
            }),
        }
    }
}

// parses a value with parser and turns it into an enum variant with constructor
#[inline]
pub(super) fn parse_enum_value<'a, P, C, O, O2>(
    s: &'a [u8],
    mut parser: P,
    constructor: C,
) -> IResult<&'a [u8], O2, ParseError<&'a [u8]>>
where
    P: Parser<&'a [u8], O, ParseError<&'a [u8]>>,
    C: Fn(O) -> Option<O2>,
{
    let (rem, res) = parser.parse(s)?;
    Ok((
        rem,
        constructor(res).ok_or(nom::Err::Error(ParseError::InvalidValue))?,
    ))
}

// runs parser on the whole input, anything left over is an error
pub(super) fn parse_complete<'a, P, O>(
    s: &'a [u8],
    mut parser: P,
) -> Result<O, ParseError<&'a [u8]>>
where
    P: Parser<&'a [u8], O, ParseError<&'a [u8]>>,
{
    use nom::Finish;
    let (rem, o) = parser.parse(s).finish()?;
    if rem.is_empty() {
        Ok(o)
    } else {
        Err(ParseError::NonEmptyRemainder)
    }
}
