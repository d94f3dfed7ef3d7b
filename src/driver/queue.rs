//! Per bus buffer of commands waiting to be sent, and the results of the last
//! batch that was sent


use super::{
    cmd::{QueuedCommand, ReturnValue},
    map, BusError, BusResult,
};
use crate::util::ensure;

/// Where a [`CommandQueue`] currently is in its life cycle
///
/// The transient executing phase only exists inside
/// [`Bus::execute`][super::Bus::execute], which holds the bus mutably, so it
/// can never be observed from outside.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum QueuePhase {
    /// Nothing pending and no results to read
    Idle,
    /// At least one command is waiting to be sent
    Accumulating,
    /// The results of the last batch can be read
    ResultsReady,
}

/// Ordered commands waiting to be sent to a device plus the results of the
/// last batch
///
/// The results always have the same length and order as the batch that
/// produced them.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<QueuedCommand>,
    // running sizes of the request and reply payload, so a batch that can't be
    // framed is refused on append and never reaches the wire
    request_len: usize,
    reply_len: usize,
    results: Option<Vec<ReturnValue>>,
    // position of next_result
    cursor: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QueuePhase {
        if !self.pending.is_empty() {
            QueuePhase::Accumulating
        } else if self.results.is_some() {
            QueuePhase::ResultsReady
        } else {
            QueuePhase::Idle
        }
    }

    pub fn pending(&self) -> &[QueuedCommand] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Adds `cmd` to the end of the queue
    ///
    /// # Errors
    /// [`BusError::InvalidParameterId`] or [`BusError::InvalidArgument`] if the
    /// command is invalid, [`BusError::FrameTooLong`] if the batch wouldn't fit
    /// into one frame anymore. The queue is left untouched in both cases.
    pub fn push(&mut self, cmd: QueuedCommand) -> BusResult<()> {
        self.push_all(std::slice::from_ref(&cmd))
    }

    /// Adds all of `cmds` to the end of the queue, or none of them if one is
    /// invalid or they don't fit into the frame together
    pub fn push_all(&mut self, cmds: &[QueuedCommand]) -> BusResult<()> {
        let mut request_len = self.request_len;
        let mut reply_len = self.reply_len;
        for cmd in cmds {
            cmd.validate()?;
            request_len += cmd.encoded_len();
            reply_len += cmd.reply_len();
            ensure!(
                request_len <= map::MAX_PAYLOAD && reply_len <= map::MAX_PAYLOAD,
                BusError::FrameTooLong(request_len.max(reply_len))
            );
        }
        self.pending.extend_from_slice(cmds);
        self.request_len = request_len;
        self.reply_len = reply_len;
        Ok(())
    }

    /// Takes all pending commands out of the queue, leaving the results alone
    pub(crate) fn take_pending(&mut self) -> Vec<QueuedCommand> {
        self.request_len = 0;
        self.reply_len = 0;
        std::mem::take(&mut self.pending)
    }

    /// Stores the results of a batch, replacing the previous ones
    pub(crate) fn set_results(&mut self, results: Vec<ReturnValue>) {
        self.results = Some(results);
        self.cursor = 0;
    }

    /// Drops the results of the last batch
    pub(crate) fn drop_results(&mut self) {
        self.results = None;
        self.cursor = 0;
    }

    /// Drops pending commands and results
    pub fn clear(&mut self) {
        self.take_pending();
        self.drop_results();
    }

    /// Number of results of the last batch, 0 if there are none
    pub fn result_len(&self) -> usize {
        self.results().map_or(0, |r| r.len())
    }

    fn results(&self) -> BusResult<&[ReturnValue]> {
        match (self.phase(), &self.results) {
            (QueuePhase::ResultsReady, Some(r)) => Ok(r),
            _ => Err(BusError::NoResults),
        }
    }

    /// Returns the result of the `index`th command of the last batch
    ///
    /// # Errors
    /// [`BusError::NoResults`] if there are no results to read,
    /// [`BusError::IndexOutOfRange`] if the batch was shorter than `index`
    pub fn result(&self, index: usize) -> BusResult<ReturnValue> {
        let results = self.results()?;
        results
            .get(index)
            .copied()
            .ok_or(BusError::IndexOutOfRange {
                index,
                len: results.len(),
            })
    }

    /// Returns the results of the last batch one after the other, starting
    /// with the first one after every batch
    pub fn next_result(&mut self) -> BusResult<ReturnValue> {
        let r = self.result(self.cursor)?;
        self.cursor += 1;
        Ok(r)
    }
}
