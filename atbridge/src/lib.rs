//! Serial bridge between a human-facing console and an AT-command WiFi modem.
//!
//! Keystrokes from the console are decoupled from their processing by a
//! fixed-capacity [`RingBuffer`]. Bytes from the modem are fed one at a time
//! through a [`ResponseClassifier`], which decides what may be echoed back to
//! the console, when a command finished (`OK`, `ERROR`, `FAIL` or `CLOSED`)
//! and which networks a `AT+CWLAP` scan listed.
//!
//! The [`ModemIngress`] drives the classifier from a modem serial port, and a
//! [`CommandSession`] sends commands and waits for the ingress to report them
//! finished.
//!
//! # Examples
//!
//! ```ignore
//! static COMPLETION: CompletionSlot = CompletionSlot::new();
//! static LINK: LinkControl = LinkControl::new();
//!
//! let mut ingress = ModemIngress::new(console_tx, &COMPLETION, &LINK);
//! let mut session = CommandSession::new(modem_tx, &COMPLETION, &LINK, Config::default());
//!
//! spawner.spawn(async move { ingress.read_from(&mut modem_rx).await });
//!
//! let completion = session.request("AT+CWMODE=3").await?;
//! assert!(completion.outcome.is_ok());
//! ```

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod classifier;
mod completion;
mod config;
mod error;
pub mod helpers;
mod ingress;
mod link;
mod ring_buffer;
pub mod scan;
mod session;

#[cfg(test)]
mod tx_mock;

pub use classifier::{Classified, ResponseClassifier, State};
pub use completion::{Completion, CompletionSlot, Outcome};
pub use config::Config;
pub use error::Error;
pub use ingress::ModemIngress;
pub use link::{LinkCommand, LinkControl};
pub use ring_buffer::RingBuffer;
pub use scan::{Networks, ScanTable, Ssid};
pub use session::CommandSession;
