use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};

use crate::classifier::ResponseClassifier;

const NO_REQUEST: u8 = 0;
const ENTER_RELAY: u8 = 1;
const EXIT_RELAY: u8 = 2;

/// Commands that can be sent from the session to the modem-reader. They are
/// applied before the next received bytes are classified, or as soon as the
/// modem-reader is idle.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkCommand {
    /// Start interpreting modem traffic as transparent relay data
    EnterRelay,
    /// Return to ordinary command/response traffic
    ExitRelay,
    /// Drop any partial line and return to idle, usually after a timeout
    Reset,
}

/// Requests taken by the modem-reader in one go. A reset is applied before
/// the relay request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Requests {
    pub reset: bool,
    pub relay: Option<LinkCommand>,
}

/// Shared between the modem-reader and the console/menu side.
///
/// Requests towards the modem-reader are latest-wins: a newer relay request
/// replaces one that was not applied yet, and a reset cancels it. Requesting
/// therefore never waits.
///
/// The parts of the classifier state the console needs are published back:
/// whether typed characters must be masked and whether a relay is active.
pub struct LinkControl {
    relay_request: AtomicU8,
    reset_request: AtomicBool,
    requested: Signal<CriticalSectionRawMutex, ()>,
    echo_suppressed: AtomicBool,
    relaying: AtomicBool,
}

impl Default for LinkControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkControl {
    pub const fn new() -> Self {
        Self {
            relay_request: AtomicU8::new(NO_REQUEST),
            reset_request: AtomicBool::new(false),
            requested: Signal::new(),
            echo_suppressed: AtomicBool::new(false),
            relaying: AtomicBool::new(false),
        }
    }

    pub fn request(&self, command: LinkCommand) {
        match command {
            LinkCommand::EnterRelay => self.relay_request.store(ENTER_RELAY, Ordering::Release),
            LinkCommand::ExitRelay => self.relay_request.store(EXIT_RELAY, Ordering::Release),
            LinkCommand::Reset => {
                self.reset_request.store(true, Ordering::Release);
                self.relay_request.store(NO_REQUEST, Ordering::Release);
            }
        }
        self.requested.signal(());
    }

    /// Whether a request has not been applied by the modem-reader yet
    pub fn has_pending_requests(&self) -> bool {
        self.reset_request.load(Ordering::Acquire)
            || self.relay_request.load(Ordering::Acquire) != NO_REQUEST
    }

    /// Whether console input should currently be masked
    pub fn is_echo_suppressed(&self) -> bool {
        self.echo_suppressed.load(Ordering::Acquire)
    }

    /// Whether a transparent relay is active, or has been requested
    pub fn is_relaying(&self) -> bool {
        match self.relay_request.load(Ordering::Acquire) {
            ENTER_RELAY => true,
            EXIT_RELAY => false,
            _ => {
                !self.reset_request.load(Ordering::Acquire)
                    && self.relaying.load(Ordering::Acquire)
            }
        }
    }

    /// Wait until a request is made
    pub(crate) async fn wait_request(&self) {
        self.requested.wait().await
    }

    /// Snapshot of the pending requests. They stay pending until
    /// [`acknowledge`](Self::acknowledge) is called with the same snapshot.
    pub(crate) fn peek(&self) -> Requests {
        let relay = match self.relay_request.load(Ordering::Acquire) {
            ENTER_RELAY => Some(LinkCommand::EnterRelay),
            EXIT_RELAY => Some(LinkCommand::ExitRelay),
            _ => None,
        };
        Requests {
            reset: self.reset_request.load(Ordering::Acquire),
            relay,
        }
    }

    /// Clear the requests in `applied`, unless a newer request replaced them
    pub(crate) fn acknowledge(&self, applied: Requests) {
        let code = match applied.relay {
            Some(LinkCommand::EnterRelay) => ENTER_RELAY,
            Some(LinkCommand::ExitRelay) => EXIT_RELAY,
            _ => NO_REQUEST,
        };
        if code != NO_REQUEST {
            let _ = self.relay_request.compare_exchange(
                code,
                NO_REQUEST,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        if applied.reset {
            self.reset_request.store(false, Ordering::Release);
        }
    }

    pub(crate) fn publish(&self, classifier: &ResponseClassifier) {
        self.echo_suppressed
            .store(classifier.is_echo_suppressed(), Ordering::Release);
        self.relaying
            .store(classifier.is_relaying(), Ordering::Release);
    }
}
