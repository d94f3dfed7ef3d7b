//! Host side driver for the SimpleMotion serial field bus.
//!
//! One or more motor drives sit on a single serial line, each with its own
//! address. The host talks to them in request/reply frames protected by a
//! CRC. This crate builds and parses those frames and keeps track of how well
//! the communication went.
//!
//! # Usage
//! Every serial port gets its own [`Bus`]. Commands are appended to the command
//! queue of the bus and sent to one device with [`Bus::execute`], all of them
//! in a single frame. Afterwards the value every command returned can be read
//! with [`Bus::return_value`], in the order the commands were appended.
//!
//! Every operation ors its outcome into the cumulative status of the bus, see
//! [`Status`]. A program can run a whole sequence of operations and check
//! [`Bus::cumulative_status`] once at the end instead of after every call.
//!
//! For simple cases there are [`Bus::read_parameter`], [`Bus::read_parameters`]
//! and [`Bus::set_parameter`], which do the queueing themselves. Cyclic real
//! time control uses [`Bus::fast_update_cycle`].
//!
//! Diagnostics are emitted through [`tracing`] once enabled with
//! [`set_debug_output`].
//!
//! # Examples
//! ```no_run
//! use simplemotion::{Bus, BusResult};
//!
//! # fn main() -> BusResult<()> {
//! let mut bus = Bus::open("/dev/ttyUSB0")?;
//!
//! // one round trip for all three
//! let [a, b, c] = bus.read_parameters(1, [5, 7, 11])?;
//! bus.set_parameter(1, 5, a + 1)?;
//! println!("{} {} {}", a, b, c);
//!
//! if bus.cumulative_status().is_fault() {
//!     println!("something went wrong: {}", bus.cumulative_status());
//!     bus.reset_cumulative_status();
//! }
//! # Ok(())
//! # }
//! ```
//!

mod driver;
pub(crate) mod util;

pub use driver::{
    cmd::{
        frame::{self, DeviceAddress},
        QueuedCommand, ReturnValue, SmpCommandType,
    },
    config::{
        defaults, set_baudrate, set_timeout, BusConfig, DEFAULT_BAUDRATE, DEFAULT_TIMEOUT_MS,
        MAX_TIMEOUT_MS, TIMEOUT_RESOLUTION_MS,
    },
    debug::{debug_output, set_debug_output, Verbosity},
    queue::{CommandQueue, QueuePhase},
    registry::{BusHandle, Registry, DEFAULT_MAX_BUSES},
    status::Status,
    transport::{available_ports, open_serial, Transport},
    version, Bus, BusError, ParseError, BusResult, BROADCAST_ADDRESS, MAX_PARAM_ID, MAX_PAYLOAD,
    MAX_READ_PARAMETERS,
};
