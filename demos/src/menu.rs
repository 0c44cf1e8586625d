use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use atbridge::{scan::SSID_LEN, CommandSession, Completion, Error, Outcome};
use embedded_io_async::Write;
use heapless::String;

use crate::console::{Line, LineChannel, LINE_LEN};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[1;1H";
const COMMAND_LIST: &str = "Command List:\r\n \
    1. Set mode \r\n \
    2. Connect to WiFi \r\n \
    3. Choose port for communication \r\n \
    4. Enter passthrough mode \r\n \
    5. Restore Factory Default Settings\r\n";

const JOIN_COMMAND_LEN: usize = "AT+CWJAP=\"\",\"\"".len() + SSID_LEN + LINE_LEN;
const CONNECT_COMMAND_LEN: usize = "AT+CIPSTART=\"TCP\",\"\",65535".len() + LINE_LEN;

const EXIT_RELAY: &str = "+++";
const SEND_PIN: &str = "++pin";

/// Interactive command menu driving a [`CommandSession`].
pub struct Menu<'a, W: Write, C: Write> {
    session: CommandSession<'a, W>,
    console: C,
    lines: &'a LineChannel,
    mask: &'a AtomicBool,
    led: &'a AtomicBool,
}

impl<'a, W: Write, C: Write> Menu<'a, W, C> {
    pub fn new(
        session: CommandSession<'a, W>,
        console: C,
        lines: &'a LineChannel,
        mask: &'a AtomicBool,
        led: &'a AtomicBool,
    ) -> Self {
        Self {
            session,
            console,
            lines,
            mask,
            led,
        }
    }

    /// Serve menu selections until the modem or the console fails.
    pub async fn run(&mut self) -> Error {
        if let Err(e) = self.print(CLEAR_SCREEN).await {
            return e;
        }

        loop {
            if let Err(e) = self.print(COMMAND_LIST).await {
                return e;
            }

            let choice = self.read_line().await;
            let result = match choice.trim() {
                "1" => self.set_mode().await,
                "2" => self.connect_wifi().await,
                "3" => self.open_connection().await,
                "4" => self.passthrough().await,
                "5" => self.restore().await,
                _ => self.print("Invalid option \r\n").await,
            };

            match result {
                Ok(()) => {}
                Err(Error::Timeout) => {
                    if let Err(e) = self.print("Modem did not respond\r\n").await {
                        return e;
                    }
                }
                Err(e @ (Error::Read | Error::Write)) => return e,
                Err(Error::Overflow) => {
                    if let Err(e) = self.print("Input too long\r\n").await {
                        return e;
                    }
                }
                Err(e) => log::warn!("Menu action failed: {:?}", e),
            }
        }
    }

    async fn print(&mut self, text: &str) -> Result<(), Error> {
        self.console
            .write_all(text.as_bytes())
            .await
            .map_err(|_| Error::Write)?;
        self.console.flush().await.map_err(|_| Error::Write)
    }

    async fn read_line(&mut self) -> Line {
        self.lines.receive().await
    }

    async fn report(&mut self, completion: &Completion) -> Result<(), Error> {
        match completion.outcome {
            Outcome::Ok => Ok(()),
            Outcome::Error => self.print("Command failed: ERROR\r\n").await,
            Outcome::Fail => self.print("Command failed: FAIL\r\n").await,
            Outcome::Closed => self.print("Connection closed\r\n").await,
        }
    }

    async fn set_mode(&mut self) -> Result<(), Error> {
        let completion = self.session.request("AT+CWMODE=3").await?;
        self.report(&completion).await
    }

    async fn connect_wifi(&mut self) -> Result<(), Error> {
        let completion = self.session.scan().await?;
        let networks = completion.networks.unwrap_or_default();
        if networks.is_empty() {
            return self.print("No networks found\r\n").await;
        }

        let mut entry = String::<48>::new();
        for (i, ssid) in networks.iter().enumerate() {
            entry.clear();
            write!(entry, "{}. {}\r\n", i + 1, ssid).map_err(|_| Error::Overflow)?;
            self.print(&entry).await?;
        }

        self.print("Type 0 to return \r\n").await?;
        let choice = self.read_line().await;
        let Some(ssid) = choice
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| networks.get(i))
        else {
            return Ok(());
        };

        self.print(ssid).await?;
        self.print("\r\nEnter password\r\n").await?;
        self.mask.store(true, Ordering::Release);
        let password = self.read_line().await;
        self.mask.store(false, Ordering::Release);

        let command = join_command(ssid, &password)?;
        let completion = self.session.request(&command).await?;
        self.report(&completion).await
    }

    async fn open_connection(&mut self) -> Result<(), Error> {
        self.print("First run the relay server. \r\nType the number of port you'd like to use. \r\n")
            .await?;
        let port = self.read_line().await;
        let Ok(port) = port.trim().parse::<u16>() else {
            return self.print("Invalid port\r\n").await;
        };

        self.print("Enter IP address you'd like to message. \r\n").await?;
        let address = self.read_line().await;

        let command = connect_command(address.trim(), port)?;
        let completion = self.session.request(&command).await?;
        self.report(&completion).await
    }

    async fn passthrough(&mut self) -> Result<(), Error> {
        self.session.enter_relay();
        self.print(
            "Entered passthrough mode. \r\nWrite your messages. \r\n ++pin to send LED0 pin value. \r\n +++ to exit. \r\n",
        )
        .await?;

        let result = self.relay_messages().await;

        if self.session.is_relaying() {
            self.session.exit_relay();
        }
        self.print("Exited passthrough mode. \r\n").await?;
        result
    }

    async fn relay_messages(&mut self) -> Result<(), Error> {
        loop {
            let message = self.read_line().await;
            let message = message.trim();
            if message == EXIT_RELAY {
                return Ok(());
            }
            if !self.session.is_relaying() {
                return self.print("Connection closed\r\n").await;
            }

            let completion = if message == SEND_PIN {
                let value = if self.led.load(Ordering::Acquire) { "1" } else { "0" };
                self.session.relay_send(value.as_bytes()).await?
            } else {
                self.session.relay_send(message.as_bytes()).await?
            };

            if !completion.outcome.is_ok() {
                return self.report(&completion).await;
            }
        }
    }

    async fn restore(&mut self) -> Result<(), Error> {
        let completion = self.session.request("AT+RESTORE").await?;
        self.report(&completion).await
    }
}

fn join_command(ssid: &str, password: &str) -> Result<String<JOIN_COMMAND_LEN>, Error> {
    let mut command = String::new();
    write!(command, "AT+CWJAP=\"{}\",\"{}\"", ssid, password).map_err(|_| Error::Overflow)?;
    Ok(command)
}

fn connect_command(address: &str, port: u16) -> Result<String<CONNECT_COMMAND_LEN>, Error> {
    let mut command = String::new();
    write!(command, "AT+CIPSTART=\"TCP\",\"{}\",{}", address, port)
        .map_err(|_| Error::Overflow)?;
    Ok(command)
}
