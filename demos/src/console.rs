use core::sync::atomic::{AtomicBool, Ordering};

use atbridge::{Error, LinkControl, RingBuffer};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embedded_io_async::{Read, Write};
use heapless::{String, Vec};

/// Longest console line kept. Further bytes on the same line are dropped.
pub const LINE_LEN: usize = 128;
pub const CONSOLE_BUF_LEN: usize = 256;

pub type Line = String<LINE_LEN>;
pub type LineChannel = Channel<CriticalSectionRawMutex, Line, 2>;
pub type ConsoleRing = RingBuffer<CONSOLE_BUF_LEN>;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// Move every byte typed on the console into `ring`.
pub async fn console_reader(mut input: impl Read, ring: &ConsoleRing) -> Error {
    let mut buffer = [0; 32];
    loop {
        match input.read(&mut buffer).await {
            Ok(0) => {
                log::error!("Console input closed");
                return Error::Read;
            }
            Ok(received) => {
                for &byte in &buffer[..received] {
                    ring.push(byte).await;
                }
            }
            Err(_) => {
                log::error!("Got console read error");
                return Error::Read;
            }
        }
    }
}

/// Drain `ring`, echo what was typed and hand complete lines to `lines`.
///
/// Typed characters are shown as `*` while `mask` is set or while the modem
/// is receiving credentials.
pub async fn console_writer(
    ring: &ConsoleRing,
    mut output: impl Write,
    lines: &LineChannel,
    link: &LinkControl,
    mask: &AtomicBool,
) -> Error {
    let mut line = Vec::<u8, LINE_LEN>::new();
    let mut after_cr = false;

    loop {
        let byte = ring.pop().await;

        let shown: &[u8] = match byte {
            b'\n' if after_cr => {
                after_cr = false;
                continue;
            }
            b'\r' | b'\n' => {
                after_cr = byte == b'\r';
                match String::from_utf8(core::mem::take(&mut line)) {
                    Ok(complete) => lines.send(complete).await,
                    Err(_) => log::warn!("Dropping console line that is not UTF-8"),
                }
                b"\r\n"
            }
            BACKSPACE | DELETE => {
                after_cr = false;
                if line.pop().is_none() {
                    continue;
                }
                b"\x08 \x08"
            }
            _ => {
                after_cr = false;
                if line.push(byte).is_err() {
                    log::warn!("Console line full, dropping input");
                    continue;
                }
                if mask.load(Ordering::Acquire) || link.is_echo_suppressed() {
                    b"*"
                } else {
                    core::slice::from_ref(&byte)
                }
            }
        };

        if output.write_all(shown).await.is_err() || output.flush().await.is_err() {
            log::error!("Got console write error");
            return Error::Write;
        }
    }
}
