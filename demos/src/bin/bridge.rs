use core::sync::atomic::{AtomicBool, Ordering};
use std::process::exit;
use std::time::Duration;

use atbridge::{CommandSession, CompletionSlot, Config, LinkControl, ModemIngress, RingBuffer};
use atbridge_demos::{
    console::{self, ConsoleRing, LineChannel},
    menu::Menu,
};
use embassy_sync::channel::Channel;
use embedded_io_adapters::tokio_1::FromTokio;
use tokio_serial::SerialPortBuilderExt;

const DEFAULT_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 115_200;
const HEARTBEAT: Duration = Duration::from_millis(500);

static CONSOLE_RING: ConsoleRing = RingBuffer::new();
static LINES: LineChannel = Channel::new();
static COMPLETION: CompletionSlot = CompletionSlot::new();
static LINK: LinkControl = LinkControl::new();
static MASK: AtomicBool = AtomicBool::new(false);
static LED: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| DEFAULT_PORT.to_string());
    let baud_rate = match args.next().map(|b| b.parse::<u32>()) {
        None => DEFAULT_BAUD_RATE,
        Some(Ok(baud_rate)) => baud_rate,
        Some(Err(e)) => {
            log::error!("Invalid baud rate: {}", e);
            exit(2);
        }
    };

    let serial = match tokio_serial::new(&path, baud_rate).open_native_async() {
        Ok(serial) => serial,
        Err(e) => {
            log::error!("Failed to open {}: {}", path, e);
            exit(1);
        }
    };
    log::info!("Bridging console to modem on {} at {} baud", path, baud_rate);
    let (modem_rx, modem_tx) = tokio::io::split(serial);

    let mut ingress = ModemIngress::new(FromTokio::new(tokio::io::stdout()), &COMPLETION, &LINK);
    tokio::spawn(async move {
        let e = ingress.read_from(&mut FromTokio::new(modem_rx)).await;
        log::error!("Modem reader stopped: {:?}", e);
        exit(1);
    });

    tokio::spawn(async {
        let e = console::console_reader(FromTokio::new(tokio::io::stdin()), &CONSOLE_RING).await;
        log::error!("Console reader stopped: {:?}", e);
        exit(1);
    });

    tokio::spawn(async {
        let e = console::console_writer(
            &CONSOLE_RING,
            FromTokio::new(tokio::io::stdout()),
            &LINES,
            &LINK,
            &MASK,
        )
        .await;
        log::error!("Console writer stopped: {:?}", e);
        exit(1);
    });

    // Stands in for the board LED, which is toggled by a push button
    tokio::spawn(async {
        let mut interval = tokio::time::interval(HEARTBEAT);
        loop {
            interval.tick().await;
            LED.fetch_xor(true, Ordering::AcqRel);
        }
    });

    let session = CommandSession::new(
        FromTokio::new(modem_tx),
        &COMPLETION,
        &LINK,
        Config::default(),
    );
    let mut menu = Menu::new(
        session,
        FromTokio::new(tokio::io::stdout()),
        &LINES,
        &MASK,
        &LED,
    );

    let e = menu.run().await;
    log::error!("Menu stopped: {:?}", e);
    exit(1);
}
