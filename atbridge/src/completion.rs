use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};

use crate::{scan::Networks, Error};

/// Result code that ended a command.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Ok,
    Error,
    Fail,
    /// The modem reported `CLOSED`, which also ends any transparent relay
    Closed,
}

impl Outcome {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A finished command, as seen by the modem-reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub outcome: Outcome,
    /// SSIDs found, when the finished command was a network scan
    pub networks: Option<Networks>,
}

impl Completion {
    pub const fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            networks: None,
        }
    }

    pub fn scan(outcome: Outcome, networks: Networks) -> Self {
        Self {
            outcome,
            networks: Some(networks),
        }
    }
}

/// Single-slot handoff of [`Completion`]s from the modem-reader to the
/// [`CommandSession`](crate::CommandSession).
///
/// A slot holds at most one unconsumed completion per command cycle.
pub struct CompletionSlot(Signal<CriticalSectionRawMutex, Completion>);

impl Default for CompletionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSlot {
    pub const fn new() -> Self {
        Self(Signal::new())
    }

    /// Discard any stale completion
    pub fn reset(&self) {
        self.0.reset();
    }

    /// Wait for a completion and consume it
    pub async fn wait(&self) -> Completion {
        self.0.wait().await
    }

    /// Consume the pending completion, if any
    pub fn try_take(&self) -> Option<Completion> {
        self.0.try_take()
    }

    /// Get whether a completion is waiting to be consumed
    pub fn available(&self) -> bool {
        self.0.signaled()
    }

    pub(crate) fn signal(&self, completion: Completion) -> Result<(), Error> {
        if self.0.signaled() {
            return Err(Error::SlotInUse);
        }
        self.0.signal(completion);
        Ok(())
    }
}
