#[cfg(test)]
mod tests;

pub mod cmd;
pub mod config;
pub(crate) mod debug;
mod map;
mod parse;
pub mod queue;
pub mod registry;
pub mod status;
pub mod transport;

use self::{
    cmd::{
        frame::{self, DeviceAddress, FastFrame, Frame, HEADER_LEN},
        QueuedCommand, ReturnValue,
    },
    config::BusConfig,
    debug::{smdebug, Verbosity},
    queue::CommandQueue,
    registry::BusHandle,
    status::Status,
    transport::Transport,
};
use crate::util::ensure;
use std::{
    fmt::Debug,
    io::{self, Read, Write},
    time::{Duration, Instant},
};
use thiserror::Error;

pub use map::{BROADCAST_ADDRESS, MAX_PARAM_ID, MAX_PAYLOAD};
pub use parse::ParseError;

/// Most parameters [`Bus::read_parameters`] reads in one go
pub const MAX_READ_PARAMETERS: usize = 3;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Errors returned by any part of the bus
///
/// Every error belongs to exactly one fault category, see [`BusError::status`].
#[derive(Error, Debug)]
pub enum BusError {
    /// Thrown by [`Bus::open`] if there is no port with the given name
    #[error("no device named {0}")]
    NoDevice(String),
    /// Thrown by [`Registry::open`][registry::Registry::open] if the maximum
    /// number of buses is already open
    #[error("all {0} bus slots are in use")]
    NoFreeSlot(usize),
    /// Thrown by [`Registry`][registry::Registry] if the handle doesn't belong
    /// to an open bus
    #[error("invalid bus handle {0}")]
    InvalidHandle(BusHandle),
    /// Thrown if a parameter id is out of the 14 bit address space
    #[error("parameter id must be <= {}, was {0}", MAX_PARAM_ID)]
    InvalidParameterId(u16),
    /// Thrown if an argument didn't match the requirements of the command
    #[error("invalid value for command argument")]
    InvalidArgument,
    /// Thrown by operations that need a reply if they are addressed to
    /// [`DeviceAddress::Broadcast`]
    #[error("operation needs a reply and can't be broadcast")]
    BroadcastNotAllowed,
    /// Thrown by [`config::set_timeout`] if the timeout is too long
    #[error("timeout must be <= {} ms, was {0}", config::MAX_TIMEOUT_MS)]
    InvalidTimeout(u16),
    /// Thrown by [`config::set_baudrate`] for a baud rate of 0
    #[error("invalid baud rate {0}")]
    InvalidBaudrate(u32),
    /// Thrown when reading return values while none are available, either
    /// because nothing was executed yet or commands are pending
    #[error("no return values available")]
    NoResults,
    /// Thrown when reading a return value past the end of the last batch
    #[error("return value {index} requested, but the batch only had {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Thrown if the device didn't reply within the timeout
    #[error("no reply within the timeout")]
    Timeout,
    /// Thrown if the checksum of a reply is wrong
    #[error("checksum mismatch, calculated {expected:#06x} but got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
    /// Thrown if a device other than the addressed one replied
    #[error("device with address {0} unexpectedly responded")]
    UnexpectedResponse(DeviceAddress),
    /// Thrown if the reply is of a different kind than the request
    #[error("unexpected reply {0:#04x}")]
    UnexpectedReply(u8),
    /// Thrown if a return value isn't an answer to the command at the same
    /// position
    #[error("return value {0} doesn't answer the command that was sent")]
    NonMatchingReply(usize),
    /// Thrown if a reply has a different number of values than commands were
    /// sent
    #[error("sent {expected} commands but got {actual} return values")]
    CountMismatch { expected: usize, actual: usize },
    /// Thrown if a batch doesn't fit into a single frame
    #[error("payload of {0} bytes doesn't fit into a frame")]
    FrameTooLong(usize),
    /// Wrapper around [`ParseError`]
    #[error("{0}")]
    ParsingError(ParseError<Vec<u8>>),
    /// Wrapper around [`io::Error`]
    #[error(transparent)]
    IoError(#[from] io::Error),
    /// Wrapper around [`serialport::Error`]
    #[error(transparent)]
    SerialPortError(#[from] serialport::Error),
}

impl BusError {
    /// Returns the fault bit this error reports
    pub fn status(&self) -> Status {
        match self {
            Self::NoDevice(_) => Status::NO_DEVICE,
            Self::NoFreeSlot(_) | Self::IoError(_) | Self::SerialPortError(_) => Status::BUS,
            Self::Timeout
            | Self::CrcMismatch { .. }
            | Self::UnexpectedResponse(_)
            | Self::UnexpectedReply(_)
            | Self::NonMatchingReply(_)
            | Self::ParsingError(_) => Status::COMMUNICATION,
            Self::InvalidHandle(_)
            | Self::InvalidParameterId(_)
            | Self::InvalidArgument
            | Self::BroadcastNotAllowed
            | Self::InvalidTimeout(_)
            | Self::InvalidBaudrate(_)
            | Self::NoResults
            | Self::IndexOutOfRange { .. } => Status::PARAMETER,
            Self::CountMismatch { .. } | Self::FrameTooLong(_) => Status::LENGTH,
        }
    }
}

impl From<ParseError<&[u8]>> for BusError {
    fn from(e: ParseError<&[u8]>) -> Self {
        Self::ParsingError(e.into())
    }
}

pub type BusResult<T> = Result<T, BusError>;

//

/// Represents a single open connection to a chain of SimpleMotion devices
///
/// A bus owns its transport, its command queue and its cumulative status.
/// Everything is released when the bus is dropped or [closed][Bus::close].
///
/// A bus is not synchronized internally. All methods take `&mut self`, so
/// sharing one between threads needs external locking, e.g. a
/// `Mutex<Bus>` per bus or one owning thread per bus. Different buses are
/// completely independent.
///
/// # Examples
/// ```no_run
/// # use simplemotion::{Bus, BusResult};
/// # fn main() -> BusResult<()> {
/// simplemotion::set_timeout(1000)?;
/// let mut bus = Bus::open("/dev/ttyUSB0")?;
///
/// bus.append_get_param(5)?;
/// bus.append_get_param(7)?;
/// bus.execute(1)?;
/// let a = bus.return_value(0)?.value();
/// let b = bus.return_value(1)?.value();
/// println!("parameter 5 = {}, parameter 7 = {}", a, b);
///
/// assert!(bus.cumulative_status().is_ok());
/// bus.close()
/// # }
/// ```
pub struct Bus {
    name: String,
    transport: Box<dyn Transport>,
    config: BusConfig,
    queue: CommandQueue,
    status: Status,
}

impl Bus {
    /// Opens the serial port `name` with the process wide defaults, see
    /// [`config`] for how they are set.
    ///
    /// # Errors
    /// [`BusError::NoDevice`] if there is no such port,
    /// [`BusError::SerialPortError`] if the port can't be claimed
    pub fn open(name: &str) -> BusResult<Self> {
        Self::open_with(name, &config::defaults())
    }

    /// Opens the serial port `name` with `config`. The config is copied, so
    /// changing it afterwards has no effect on this bus.
    pub fn open_with(name: &str, config: &BusConfig) -> BusResult<Self> {
        let port = transport::open_serial(name, config)?;
        smdebug!(
            Verbosity::Low,
            bus = name,
            baudrate = config.baudrate(),
            "bus opened"
        );
        Ok(Self::with_transport(name, port, *config))
    }

    /// Builds a bus on top of an already set up transport. The transport is
    /// expected to time out reads according to `config`.
    pub fn with_transport<T>(name: impl Into<String>, transport: T, config: BusConfig) -> Self
    where
        T: Transport + 'static,
    {
        Bus {
            name: name.into(),
            transport: Box::new(transport),
            config,
            queue: CommandQueue::new(),
            status: Status::NONE,
        }
    }

    /// Closes the bus, which releases the transport so others can open it.
    /// Dropping the bus does the same but doesn't report errors.
    ///
    /// # Errors
    /// [`BusError::IoError`] if unsent bytes couldn't be flushed, the
    /// transport is released nonetheless
    pub fn close(mut self) -> BusResult<()> {
        smdebug!(Verbosity::Low, bus = %self.name, "closing bus");
        self.transport.flush()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    // ors the outcome of an operation into the cumulative status
    fn record<T>(&mut self, r: BusResult<T>) -> BusResult<T> {
        match &r {
            Ok(_) => self.status |= Status::OK,
            Err(e) => {
                self.status |= e.status();
                smdebug!(Verbosity::Low, bus = %self.name, error = %e, "operation failed");
            }
        }
        r
    }

    //

    /// Returns all status bits that occurred since the bus was opened or
    /// [`reset_cumulative_status`][Bus::reset_cumulative_status] was called
    pub fn cumulative_status(&self) -> Status {
        self.status
    }

    /// Resets the cumulative status, so [`cumulative_status`][Bus::cumulative_status]
    /// returns [`Status::NONE`] until the next operation
    pub fn reset_cumulative_status(&mut self) {
        self.status = Status::NONE;
    }

    //

    /// Adds `cmd` to the end of the command queue
    ///
    /// # Errors
    /// Invalid commands and batches that would no longer fit into one frame
    /// are refused. Nothing is sent in that case and, since nothing touched
    /// the bus, the cumulative status stays the same.
    pub fn append(&mut self, cmd: QueuedCommand) -> BusResult<()> {
        self.queue.push(cmd)?;
        smdebug!(Verbosity::Trace, bus = %self.name, command = %cmd, "queued");
        self.record(Ok(()))
    }

    /// Queues a raw device command
    pub fn append_command(&mut self, opcode: u8, param: u16) -> BusResult<()> {
        self.append(QueuedCommand::raw(opcode, param))
    }

    /// Queues a protocol level command, see [`QueuedCommand::protocol`]
    pub fn append_sm_command(&mut self, kind: u8, value: i32) -> BusResult<()> {
        self.append(QueuedCommand::protocol(kind, value)?)
    }

    /// Queues reading the parameter `id`
    pub fn append_get_param(&mut self, id: u16) -> BusResult<()> {
        self.append(QueuedCommand::get_param(id)?)
    }

    /// Queues writing `value` to the parameter `id`
    pub fn append_set_param(&mut self, id: u16, value: i32) -> BusResult<()> {
        self.append(QueuedCommand::set_param(id, value)?)
    }

    /// Drops pending commands and the results of the last batch
    pub fn clear_queue(&mut self) {
        self.queue.clear()
    }

    //

    fn send(&mut self, bytes: &[u8]) -> BusResult<()> {
        smdebug!(Verbosity::Trace, bus = %self.name, ?bytes, "sending");
        self.transport.clear_input()?;
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    // reads until buf is full. the transport times out single reads, the
    // deadline bounds the whole reply. a reply ends at most one transport
    // timeout after the deadline
    fn receive_exact(&mut self, buf: &mut [u8], deadline: Instant) -> BusResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.transport.read(&mut buf[filled..]) {
                Ok(0) => return Err(BusError::Timeout),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(match e.kind() {
                        io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::UnexpectedEof => BusError::Timeout,
                        _ => BusError::IoError(e),
                    })
                }
            }
            ensure!(
                filled == buf.len() || Instant::now() < deadline,
                BusError::Timeout
            );
        }
        Ok(())
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeout()
    }

    // receives a single batch frame, the header tells how long the rest is
    fn receive_frame(&mut self) -> BusResult<Vec<u8>> {
        let deadline = self.deadline();
        let mut header = [0u8; HEADER_LEN];
        self.receive_exact(&mut header, deadline)?;
        let mut bytes = vec![0u8; HEADER_LEN + Frame::remaining_len(&header)];
        bytes[..HEADER_LEN].copy_from_slice(&header);
        self.receive_exact(&mut bytes[HEADER_LEN..], deadline)?;
        smdebug!(Verbosity::Trace, bus = %self.name, ?bytes, "received");
        Ok(bytes)
    }

    // receives the reply to the request that was just sent. if nothing
    // arrives, the results of the previous batch are dropped as well
    fn receive_reply(&mut self) -> BusResult<Vec<u8>> {
        self.receive_frame().map_err(|e| {
            self.queue.drop_results();
            e
        })
    }

    fn execute_batch(&mut self, address: DeviceAddress) -> BusResult<()> {
        let sent = self.queue.take_pending();
        smdebug!(
            Verbosity::Mid,
            bus = %self.name,
            %address,
            commands = sent.len(),
            "executing command queue"
        );
        let request = frame::encode_request(map::BATCH_CMD, address, &sent)?;
        self.send(&request)?;
        if address.is_broadcast() {
            // nobody answers a broadcast
            self.queue.drop_results();
            return Ok(());
        }
        let reply = self.receive_reply()?;
        let values = frame::decode_reply(&reply, map::BATCH_CMD_RET, address, &sent)?;
        self.queue.set_results(values);
        Ok(())
    }

    /// Sends all queued commands to `address` in a single frame and waits for
    /// the reply. Afterwards the queue is empty and the return values can be
    /// read in the order the commands were queued.
    ///
    /// Commands sent to [`DeviceAddress::Broadcast`] aren't answered, so there
    /// are no return values afterwards.
    ///
    /// # Errors
    /// - [`BusError::Timeout`] if no reply arrived in time. The return values of
    ///   earlier batches are dropped as well.
    /// - [`BusError::CrcMismatch`], [`BusError::CountMismatch`] and the other
    ///   reply errors if the reply was broken. The return values of the last
    ///   successful batch stay readable in that case.
    ///
    /// The queue is empty afterwards in every case.
    pub fn execute(&mut self, address: impl Into<DeviceAddress>) -> BusResult<()> {
        let r = self.execute_batch(DeviceAddress::normalized(address.into()));
        self.record(r)
    }

    fn upload_batch(&mut self, address: DeviceAddress) -> BusResult<()> {
        let sent = self.queue.take_pending();
        smdebug!(
            Verbosity::Mid,
            bus = %self.name,
            %address,
            commands = sent.len(),
            "uploading command queue to device buffer"
        );
        let request = frame::encode_request(map::BUFFERED_CMD, address, &sent)?;
        self.send(&request)?;
        self.queue.drop_results();
        if address.is_broadcast() {
            return Ok(());
        }
        let reply = self.receive_reply()?;
        frame::decode_ack(&reply, map::BUFFERED_CMD_RET, address, sent.len())
    }

    /// Sends all queued commands to the buffer of the device at `address`
    /// instead of executing them right away. The device runs them on its own
    /// clock, see [`get_buffer_clock`][Bus::get_buffer_clock].
    ///
    /// The device only acknowledges how many commands it staged, so there are
    /// no return values afterwards.
    pub fn upload_to_device_buffer(&mut self, address: impl Into<DeviceAddress>) -> BusResult<()> {
        let r = self.upload_batch(DeviceAddress::normalized(address.into()));
        self.record(r)
    }

    //

    /// Returns the value the `index`th command of the last executed batch
    /// returned
    ///
    /// # Errors
    /// [`BusError::NoResults`] if no batch was executed successfully since the
    /// last clear or commands are pending, [`BusError::IndexOutOfRange`] if
    /// the batch had fewer commands
    pub fn return_value(&mut self, index: usize) -> BusResult<ReturnValue> {
        let r = self.queue.result(index);
        self.record(r)
    }

    /// Returns the return values of the last executed batch one after the
    /// other, starting over after every execute
    pub fn next_return_value(&mut self) -> BusResult<ReturnValue> {
        let r = self.queue.next_result();
        self.record(r)
    }

    //

    /// Reads up to [`MAX_READ_PARAMETERS`] parameters from the device at
    /// `address` in a single round trip and returns their values in the order
    /// of `ids`.
    ///
    /// Commands that were already queued are sent in the same frame, their
    /// return values come before the ones of `ids`.
    ///
    /// # Errors
    /// [`BusError::InvalidArgument`] for zero or too many ids,
    /// [`BusError::BroadcastNotAllowed`] for the broadcast address and
    /// everything [`execute`][Bus::execute] returns
    pub fn read_parameters<const N: usize>(
        &mut self,
        address: impl Into<DeviceAddress>,
        ids: [u16; N],
    ) -> BusResult<[i32; N]> {
        let address = DeviceAddress::normalized(address.into());
        ensure!(
            (1..=MAX_READ_PARAMETERS).contains(&N),
            BusError::InvalidArgument
        );
        ensure!(address.is_single(), BusError::BroadcastNotAllowed);
        let cmds = ids
            .iter()
            .map(|&id| QueuedCommand::get_param(id))
            .collect::<BusResult<Vec<_>>>()?;
        // all or nothing
        self.queue.push_all(&cmds)?;
        self.record(Ok(()))?;
        self.execute(address)?;
        let first = self.queue.result_len() - N;
        let mut values = [0; N];
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.return_value(first + i)?.value();
        }
        Ok(values)
    }

    /// Reads a single parameter, see [`read_parameters`][Bus::read_parameters]
    pub fn read_parameter(&mut self, address: impl Into<DeviceAddress>, id: u16) -> BusResult<i32> {
        let [value] = self.read_parameters(address, [id])?;
        Ok(value)
    }

    /// Writes `value` to the parameter `id` of the device at `address`, or of
    /// all devices for [`DeviceAddress::Broadcast`]
    pub fn set_parameter(
        &mut self,
        address: impl Into<DeviceAddress>,
        id: u16,
        value: i32,
    ) -> BusResult<()> {
        self.append_set_param(id, value)?;
        self.execute(address)
    }

    //

    fn buffer_clock(&mut self, address: DeviceAddress) -> BusResult<u16> {
        ensure!(address.is_single(), BusError::BroadcastNotAllowed);
        let request = Frame {
            cmd: map::GET_CLOCK,
            address,
            count: 0,
            payload: Vec::new(),
        }
        .encode()?;
        self.send(&request)?;
        let reply = self.receive_frame()?;
        frame::decode_clock_reply(&reply, address)
    }

    /// Reads the clock the device at `address` runs its buffered commands on
    pub fn get_buffer_clock(&mut self, address: impl Into<DeviceAddress>) -> BusResult<u16> {
        let r = self.buffer_clock(DeviceAddress::normalized(address.into()));
        self.record(r)
    }

    fn fast_cycle(
        &mut self,
        address: DeviceAddress,
        write1: u16,
        write2: u16,
    ) -> BusResult<(u16, u16)> {
        ensure!(address.is_single(), BusError::BroadcastNotAllowed);
        let request = FastFrame {
            cmd: map::FAST_UPDATE_CYCLE,
            address,
            words: [write1, write2],
        };
        self.send(&request.encode())?;
        let deadline = self.deadline();
        let mut reply = [0u8; FastFrame::LEN];
        self.receive_exact(&mut reply, deadline)?;
        let [read1, read2] = FastFrame::decode(&reply)?
            .expect(map::FAST_UPDATE_CYCLE_RET, address)?
            .words;
        Ok((read1, read2))
    }

    /// Exchanges two 16 bit words with the device at `address` in a single
    /// short frame, bypassing the command queue. Meant for cyclic real time
    /// control, what the words mean is up to the application.
    pub fn fast_update_cycle(
        &mut self,
        address: impl Into<DeviceAddress>,
        write1: u16,
        write2: u16,
    ) -> BusResult<(u16, u16)> {
        let address = DeviceAddress::normalized(address.into());
        let r = self.fast_cycle(address, write1, write2);
        self.record(r)
    }

    /// Returns how many bytes are waiting in the input buffer of the transport
    pub fn bytes_received(&mut self) -> BusResult<u32> {
        let r = self.transport.bytes_to_read().map_err(BusError::from);
        self.record(r)
    }
}

impl Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bus {{ name: {:?}, transport: _, config: {:?}, queue: {:?}, status: {:?} }}",
            self.name, self.config, self.queue, self.status,
        )
    }
}

//

/// Returns the version of this library in hexadecimal format, e.g. 2.5.1 is
/// `0x020501`
pub fn version() -> u32 {
    fn part(s: &str) -> u32 {
        s.parse::<u32>().unwrap_or(0) & 0xff
    }
    part(env!("CARGO_PKG_VERSION_MAJOR")) << 16
        | part(env!("CARGO_PKG_VERSION_MINOR")) << 8
        | part(env!("CARGO_PKG_VERSION_PATCH"))
}
