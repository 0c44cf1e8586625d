//! Incremental classifier for the modem byte stream.
//!
//! The modem echoes every command it receives and then answers with one or
//! more lines, the last of which carries a result code. Bytes are consumed one
//! at a time and the classifier decides for each of them whether it should be
//! mirrored to the console, and whether it ended the current command.
//!
//! Stream shapes handled (with modem echo enabled):
//! - `AT<CMD>\r\r\n<LINES>\r\n<OK|ERROR|FAIL>\r\n`
//! - `AT+CWLAP\r\r\n+CWLAP:(...)\r\n...\r\n\r\nOK\r\n` (network scan)
//! - `AT+CWJAP="<ssid>","<password>"\r\r\n...` (join, password not mirrored)
//! - `AT+CIPSEND=<n>\r\r\nOK\r\n> ` (relay payload announcement)
//! - `<LINES>CLOSED\r\n` (connection dropped)

use heapless::Vec;

use crate::{
    completion::{Completion, Outcome},
    helpers::{LossyStr, TokenMatcher},
    scan::{ScanTable, ENTRY_LEN},
    Error,
};

/// Response line termination character
pub const LINE_TERM_CHAR: u8 = b'\r';
/// Response formatting character
pub const FORMAT_CHAR: u8 = b'\n';
/// Capacity of the per-line command buffer
pub const COMMAND_LEN: usize = 256;

const SCAN_ENTRY_PREFIX: &[u8] = b"+CWLAP:";

/// Processing state of the [`ResponseClassifier`]
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Plain command/response traffic, mirrored to the console
    #[default]
    Idle,
    /// The echo of a join command is being received. Bytes up to the next line
    /// terminator carry a password and are neither mirrored nor buffered.
    EchoSuppressed,
    /// Listing lines of a network scan are being collected
    ScanCollecting,
    /// Transparent relay of console messages to a remote peer. Result codes
    /// are only honoured while a `AT+CIPSEND=` is awaiting acknowledgement.
    Relay { send_pending: bool },
}

/// What to do with a single classified byte
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classified {
    /// Mirror the byte to the console
    pub echo: bool,
    /// The byte completed a command
    pub completion: Option<Completion>,
    /// Recoverable parsing anomaly. The stream keeps being consumed.
    pub anomaly: Option<Error>,
}

impl Classified {
    fn echoed() -> Self {
        Self {
            echo: true,
            completion: None,
            anomaly: None,
        }
    }

    fn anomaly(error: Error) -> Self {
        Self {
            echo: false,
            completion: None,
            anomaly: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
struct Sentinels {
    ok: TokenMatcher,
    error: TokenMatcher,
    fail: TokenMatcher,
    closed: TokenMatcher,
    scan: TokenMatcher,
    join: TokenMatcher,
    send: TokenMatcher,
}

impl Sentinels {
    const fn new() -> Self {
        Self {
            ok: TokenMatcher::new(b"OK"),
            error: TokenMatcher::new(b"ERROR"),
            fail: TokenMatcher::new(b"FAIL"),
            closed: TokenMatcher::new(b"CLOSED"),
            scan: TokenMatcher::new(b"AT+CWLAP\r"),
            join: TokenMatcher::new(b"AT+CWJAP="),
            send: TokenMatcher::new(b"AT+CIPSEND="),
        }
    }

    fn advance(&mut self, byte: u8) {
        for m in self.all() {
            m.advance(byte);
        }
    }

    fn reset(&mut self) {
        for m in self.all() {
            m.reset();
        }
    }

    fn all(&mut self) -> [&mut TokenMatcher; 7] {
        [
            &mut self.ok,
            &mut self.error,
            &mut self.fail,
            &mut self.closed,
            &mut self.scan,
            &mut self.join,
            &mut self.send,
        ]
    }

    /// Result code seen on the current line. When several are present the
    /// most severe one wins.
    fn outcome(&self) -> Option<Outcome> {
        if self.closed.matched() {
            Some(Outcome::Closed)
        } else if self.error.matched() {
            Some(Outcome::Error)
        } else if self.fail.matched() {
            Some(Outcome::Fail)
        } else if self.ok.matched() {
            Some(Outcome::Ok)
        } else {
            None
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

pub struct ResponseClassifier {
    state: State,
    command: Vec<u8, COMMAND_LEN>,
    command_overflowed: bool,
    entry: Vec<u8, ENTRY_LEN>,
    entry_overflowed: bool,
    table: ScanTable,
    sentinels: Sentinels,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseClassifier {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            command: Vec::new(),
            command_overflowed: false,
            entry: Vec::new(),
            entry_overflowed: false,
            table: ScanTable::new(),
            sentinels: Sentinels::new(),
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// Listing of the most recent network scan
    pub const fn table(&self) -> &ScanTable {
        &self.table
    }

    /// Bytes of the current, unterminated line
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Whether bytes currently typed or received must not be shown on the
    /// console as they are.
    pub const fn is_echo_suppressed(&self) -> bool {
        matches!(self.state, State::EchoSuppressed | State::ScanCollecting)
    }

    pub const fn is_relaying(&self) -> bool {
        matches!(self.state, State::Relay { .. })
    }

    /// Start interpreting the stream as transparent relay traffic.
    pub fn enter_relay(&mut self) {
        match self.state {
            State::Idle => {
                debug!("Entering relay mode");
                self.state = State::Relay {
                    send_pending: false,
                };
            }
            State::Relay { .. } => {}
            state => warn!("Cannot enter relay mode while in state {:?}", state),
        }
    }

    pub fn exit_relay(&mut self) {
        if self.is_relaying() {
            debug!("Leaving relay mode");
            self.state = State::Idle;
        }
    }

    /// Return to `Idle`, discarding any partial line. The scan table is kept.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.clear_command();
        self.clear_entry();
    }

    /// Classify a single byte received from the modem.
    pub fn feed(&mut self, byte: u8) -> Classified {
        match self.state {
            State::ScanCollecting => self.collect_scan(byte),
            State::EchoSuppressed => {
                if byte == LINE_TERM_CHAR {
                    trace!("Join command echo finished");
                    self.state = State::Idle;
                    self.clear_command();
                }
                Classified::default()
            }
            State::Idle | State::Relay { .. } => self.classify_line(byte),
        }
    }

    fn classify_line(&mut self, byte: u8) -> Classified {
        let mut result = Classified::echoed();

        if self.command.push(byte).is_ok() {
            self.sentinels.advance(byte);
        } else if !self.command_overflowed {
            self.command_overflowed = true;
            error!(
                "Command buffer full, dropping bytes until end of line: {:?}",
                LossyStr(&self.command)
            );
            result.anomaly = Some(Error::Overflow);
        }

        match self.state {
            State::Idle if self.sentinels.scan.matched() => {
                debug!("Network scan started");
                self.state = State::ScanCollecting;
                self.table.clear();
                self.clear_entry();
                self.clear_command();
                return result;
            }
            State::Idle if self.sentinels.join.matched() => {
                debug!("Join command, suppressing echo");
                self.state = State::EchoSuppressed;
                return result;
            }
            State::Relay {
                send_pending: false,
            } if self.sentinels.send.matched() => {
                trace!("Relay payload announced");
                self.state = State::Relay { send_pending: true };
            }
            _ => {}
        }

        if byte == LINE_TERM_CHAR {
            result.completion = self.terminate_line();
            self.clear_command();
        }

        result
    }

    fn terminate_line(&mut self) -> Option<Completion> {
        let outcome = self.sentinels.outcome()?;

        let accepted = match self.state {
            State::Relay { send_pending } => match outcome {
                Outcome::Closed => {
                    debug!("Connection closed, leaving relay mode");
                    self.state = State::Idle;
                    true
                }
                Outcome::Error | Outcome::Fail if send_pending => {
                    self.state = State::Idle;
                    true
                }
                Outcome::Ok if send_pending => {
                    self.state = State::Relay {
                        send_pending: false,
                    };
                    true
                }
                _ => false,
            },
            _ => true,
        };

        if accepted {
            debug!("Command finished: {:?}", outcome);
            Some(Completion::new(outcome))
        } else {
            trace!(
                "Ignoring {:?} in relayed data: {:?}",
                outcome,
                LossyStr(&self.command)
            );
            None
        }
    }

    fn collect_scan(&mut self, byte: u8) -> Classified {
        match byte {
            LINE_TERM_CHAR => {
                let result = self.finish_entry();
                self.clear_entry();
                result
            }
            FORMAT_CHAR => Classified::default(),
            _ => {
                if self.entry.push(byte).is_err() && !self.entry_overflowed {
                    self.entry_overflowed = true;
                    warn!("Scan entry too long: {:?}", LossyStr(&self.entry));
                    return Classified::anomaly(Error::Overflow);
                }
                Classified::default()
            }
        }
    }

    fn finish_entry(&mut self) -> Classified {
        let line = self.entry.as_slice();
        if line.is_empty() {
            return Classified::default();
        }

        if !line.starts_with(SCAN_ENTRY_PREFIX) {
            let terminal = if contains(line, b"ERROR") {
                Some(Outcome::Error)
            } else if contains(line, b"OK") {
                Some(Outcome::Ok)
            } else {
                None
            };

            if let Some(outcome) = terminal {
                debug!(
                    "Network scan finished: {:?}, {} entries",
                    outcome,
                    self.table.len()
                );
                self.state = State::Idle;
                self.clear_command();
                return Classified {
                    echo: false,
                    completion: Some(Completion::scan(outcome, self.table.networks())),
                    anomaly: None,
                };
            }
        }

        match self.table.record_entry(line) {
            Ok(index) => {
                trace!("Scan entry {}: {:?}", index, LossyStr(line));
                Classified::default()
            }
            Err(e) => {
                warn!("Rejected scan entry {:?}: {:?}", LossyStr(line), e);
                Classified::anomaly(e)
            }
        }
    }

    fn clear_command(&mut self) {
        self.command.clear();
        self.command_overflowed = false;
        self.sentinels.reset();
    }

    fn clear_entry(&mut self) {
        self.entry.clear();
        self.entry_overflowed = false;
    }
}
