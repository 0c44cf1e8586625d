use core::fmt::Write as _;
use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::Write;
use heapless::String;

use crate::{
    completion::{Completion, CompletionSlot},
    helpers::LossyStr,
    link::{LinkCommand, LinkControl},
    Config, Error,
};

const JOIN_PREFIX: &str = "AT+CWJAP=";

/// Issues AT commands to the modem and waits for the
/// [`ModemIngress`](crate::ModemIngress) to report them finished.
///
/// At most one command is outstanding at a time.
pub struct CommandSession<'a, W: Write> {
    writer: W,
    completion: &'a CompletionSlot,
    link: &'a LinkControl,
    config: Config,
    pending: bool,
    cooldown_timer: Option<Timer>,
}

impl<'a, W: Write> CommandSession<'a, W> {
    pub fn new(
        writer: W,
        completion: &'a CompletionSlot,
        link: &'a LinkControl,
        config: Config,
    ) -> Self {
        Self {
            writer,
            completion,
            link,
            config,
            pending: false,
            cooldown_timer: None,
        }
    }

    /// Whether a command was sent and has not been awaited yet
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_relaying(&self) -> bool {
        self.link.is_relaying()
    }

    fn start_cooldown_timer(&mut self) {
        self.cooldown_timer = Some(Timer::after(self.config.cmd_cooldown));
    }

    async fn wait_cooldown_timer(&mut self) {
        if let Some(cooldown) = self.cooldown_timer.take() {
            cooldown.await
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.writer.write_all(bytes).await.map_err(|_| Error::Write)?;
        self.writer.flush().await.map_err(|_| Error::Write)
    }

    /// Write `command`, terminated by `\r\n`, to the modem.
    ///
    /// Any completion left over from an earlier command is discarded.
    pub async fn send(&mut self, command: &str) -> Result<(), Error> {
        self.wait_cooldown_timer().await;

        if command.starts_with(JOIN_PREFIX) {
            debug!("Sending join command");
        } else if command.len() < 50 {
            debug!("Sending command: {:?}", LossyStr(command.as_bytes()));
        } else {
            debug!("Sending command with long payload ({} bytes)", command.len());
        }

        self.completion.reset();
        self.writer
            .write_all(command.as_bytes())
            .await
            .map_err(|_| Error::Write)?;
        self.write_all(b"\r\n").await?;

        self.pending = true;
        Ok(())
    }

    /// Write raw relay payload to the modem after the configured send delay.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<(), Error> {
        Timer::after(self.config.send_delay).await;
        debug!("Sending {} bytes of payload", payload.len());
        self.write_all(payload).await
    }

    /// Wait for the outstanding command to finish, bounded by the configured
    /// response timeout.
    pub async fn await_completion(&mut self) -> Result<Completion, Error> {
        self.await_completion_within(self.config.response_timeout)
            .await
    }

    pub async fn await_completion_within(
        &mut self,
        timeout: Duration,
    ) -> Result<Completion, Error> {
        let response = match with_timeout(timeout, self.completion.wait()).await {
            Ok(completion) => Ok(completion),
            Err(_) => {
                warn!("Received timeout after {}ms", timeout.as_millis());
                // Drop whatever half-received line the modem-reader holds
                self.link.request(LinkCommand::Reset);
                Err(Error::Timeout)
            }
        };

        self.pending = false;
        self.start_cooldown_timer();
        response
    }

    /// Send `command` and wait for it to finish.
    pub async fn request(&mut self, command: &str) -> Result<Completion, Error> {
        self.send(command).await?;
        self.await_completion().await
    }

    /// Run a network scan. The returned completion carries the SSIDs found.
    pub async fn scan(&mut self) -> Result<Completion, Error> {
        self.send("AT+CWLAP").await?;
        self.await_completion_within(self.config.scan_timeout).await
    }

    /// Announce `payload` with `AT+CIPSEND=` and transmit it once the modem
    /// accepted the announcement.
    pub async fn relay_send(&mut self, payload: &[u8]) -> Result<Completion, Error> {
        let mut command = String::<24>::new();
        write!(command, "AT+CIPSEND={}", payload.len()).map_err(|_| Error::Overflow)?;
        self.send(&command).await?;

        let completion = self.await_completion().await?;
        if completion.outcome.is_ok() {
            self.send_payload(payload).await?;
        } else {
            warn!("Payload announcement rejected: {:?}", completion.outcome);
        }
        Ok(completion)
    }

    /// Start relaying. Takes effect in the modem-reader without waiting.
    pub fn enter_relay(&mut self) {
        self.link.request(LinkCommand::EnterRelay);
    }

    pub fn exit_relay(&mut self) {
        self.link.request(LinkCommand::ExitRelay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::State,
        completion::Outcome,
        ingress::ModemIngress,
        scan::Networks,
        tx_mock::{PipeReader, PipeWriter, RecordingSink, TxMock},
    };
    use embassy_sync::{
        blocking_mutex::raw::CriticalSectionRawMutex, pipe::Pipe, pubsub::PubSubChannel,
    };

    type SerialLine = Pipe<CriticalSectionRawMutex, 128>;

    macro_rules! setup {
        ($config:expr) => {{
            static TX_CHANNEL: PubSubChannel<CriticalSectionRawMutex, String<64>, 1, 1, 1> =
                PubSubChannel::new();
            static COMPLETION: CompletionSlot = CompletionSlot::new();
            static LINK: LinkControl = LinkControl::new();

            let tx_mock = TxMock::new(TX_CHANNEL.publisher().unwrap());
            let session = CommandSession::new(tx_mock, &COMPLETION, &LINK, $config);
            (session, TX_CHANNEL.subscriber().unwrap(), &COMPLETION, &LINK)
        }};
    }

    #[tokio::test]
    async fn request_completes_on_ok() {
        let (mut session, mut tx, completion, _) = setup!(Config::new());

        let modem = async {
            let sent = tx.next_message_pure().await;
            completion.signal(Completion::new(Outcome::Ok)).unwrap();
            sent
        };

        let (result, sent) = tokio::join!(session.request("AT+CWMODE=3"), modem);
        assert_eq!("AT+CWMODE=3\r\n", sent.as_str());
        assert_eq!(Ok(Completion::new(Outcome::Ok)), result);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn error_outcome_is_returned() {
        let (mut session, mut tx, completion, _) = setup!(Config::new());

        let modem = async {
            tx.next_message_pure().await;
            completion.signal(Completion::new(Outcome::Fail)).unwrap();
        };

        let (result, ()) = tokio::join!(session.request("AT+CWJAP=\"a\",\"b\""), modem);
        assert_eq!(Outcome::Fail, result.unwrap().outcome);
    }

    #[tokio::test]
    async fn times_out_and_resets_link() {
        let (mut session, mut tx, _, link) =
            setup!(Config::new().response_timeout(Duration::from_millis(50)));

        let (result, sent) = tokio::join!(session.request("AT+RESTORE"), tx.next_message_pure());
        assert_eq!("AT+RESTORE\r\n", sent.as_str());
        assert_eq!(Err(Error::Timeout), result);
        assert!(!session.is_pending());
        assert!(link.peek().reset);
    }

    #[tokio::test]
    async fn stale_completion_is_discarded() {
        let (mut session, mut tx, completion, _) =
            setup!(Config::new().response_timeout(Duration::from_millis(50)));

        completion.signal(Completion::new(Outcome::Ok)).unwrap();

        let (result, _) = tokio::join!(session.request("AT+CWMODE=3"), tx.next_message_pure());
        assert_eq!(Err(Error::Timeout), result);
    }

    #[tokio::test]
    async fn pending_until_awaited() {
        let (mut session, mut tx, completion, _) = setup!(Config::new());

        let (sent, _) = tokio::join!(session.send("AT"), tx.next_message_pure());
        sent.unwrap();
        assert!(session.is_pending());

        completion.signal(Completion::new(Outcome::Ok)).unwrap();
        assert!(session.await_completion().await.is_ok());
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn scan_returns_networks() {
        let (mut session, mut tx, completion, _) = setup!(Config::new());

        let mut networks = Networks::new();
        networks.push("home".try_into().unwrap()).unwrap();
        networks.push("office".try_into().unwrap()).unwrap();

        let modem = async {
            let sent = tx.next_message_pure().await;
            completion
                .signal(Completion::scan(Outcome::Ok, networks.clone()))
                .unwrap();
            sent
        };

        let (result, sent) = tokio::join!(session.scan(), modem);
        assert_eq!("AT+CWLAP\r\n", sent.as_str());
        assert_eq!(Some(networks), result.unwrap().networks);
    }

    #[tokio::test]
    async fn relay_send_announces_then_writes_payload() {
        let (mut session, mut tx, completion, _) =
            setup!(Config::new().send_delay(Duration::from_millis(10)));

        let modem = async {
            let announce = tx.next_message_pure().await;
            completion.signal(Completion::new(Outcome::Ok)).unwrap();
            let payload = tx.next_message_pure().await;
            (announce, payload)
        };

        let (result, (announce, payload)) = tokio::join!(session.relay_send(b"hello"), modem);
        assert_eq!(Outcome::Ok, result.unwrap().outcome);
        assert_eq!("AT+CIPSEND=5\r\n", announce.as_str());
        assert_eq!("hello", payload.as_str());
    }

    #[tokio::test]
    async fn rejected_announcement_writes_no_payload() {
        let (mut session, mut tx, completion, _) =
            setup!(Config::new().send_delay(Duration::from_millis(10)));

        let modem = async {
            tx.next_message_pure().await;
            completion.signal(Completion::new(Outcome::Error)).unwrap();
        };

        let (result, ()) = tokio::join!(session.relay_send(b"hello"), modem);
        assert_eq!(Outcome::Error, result.unwrap().outcome);
        assert!(tx.try_next_message_pure().is_none());
    }

    #[tokio::test]
    async fn relay_mode_is_forwarded_to_ingress() {
        let (mut session, _tx, _, link) = setup!(Config::new());

        session.enter_relay();
        assert!(session.is_relaying());
        session.exit_relay();
        assert!(!session.is_relaying());

        assert_eq!(Some(LinkCommand::ExitRelay), link.peek().relay);
    }

    /// Session and ingress connected through an in-memory serial line, with
    /// the test playing the modem.
    macro_rules! wired {
        ($config:expr) => {{
            static TO_MODEM: SerialLine = Pipe::new();
            static FROM_MODEM: SerialLine = Pipe::new();
            static COMPLETION: CompletionSlot = CompletionSlot::new();
            static LINK: LinkControl = LinkControl::new();

            let ingress = ModemIngress::new(RecordingSink::default(), &COMPLETION, &LINK);
            let session = CommandSession::new(PipeWriter(&TO_MODEM), &COMPLETION, &LINK, $config);
            (session, ingress, &TO_MODEM, &FROM_MODEM, &COMPLETION, &LINK)
        }};
    }

    async fn expect_line(line: &SerialLine) -> String<64> {
        let mut received = String::new();
        while !received.ends_with("\r\n") {
            let mut byte = [0];
            line.read(&mut byte).await;
            received.push(byte[0] as char).unwrap();
        }
        received
    }

    async fn read_exact(line: &SerialLine, buf: &mut [u8]) {
        let mut filled = 0;
        while filled < buf.len() {
            filled += line.read(&mut buf[filled..]).await;
        }
    }

    async fn reply(line: &SerialLine, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let written = line.write(bytes).await;
            bytes = &bytes[written..];
        }
    }

    #[tokio::test]
    async fn passthrough_toggles_without_modem_traffic() {
        let (mut session, mut ingress, _, from_modem, _, link) = wired!(Config::new());
        let mut serial = PipeReader(from_modem);

        let toggles = async {
            for _ in 0..10 {
                session.enter_relay();
                Timer::after(Duration::from_millis(5)).await;
                assert!(!link.has_pending_requests());
                assert!(session.is_relaying());

                session.exit_relay();
                Timer::after(Duration::from_millis(5)).await;
                assert!(!link.has_pending_requests());
                assert!(!session.is_relaying());
            }
            session.enter_relay();
            Timer::after(Duration::from_millis(5)).await;
        };

        tokio::select! {
            e = ingress.read_from(&mut serial) => panic!("modem reader stopped: {:?}", e),
            () = toggles => {}
        }
        assert_eq!(
            State::Relay {
                send_pending: false
            },
            ingress.classifier().state()
        );
    }

    #[tokio::test]
    async fn relay_send_acknowledged_by_modem() {
        let (mut session, mut ingress, to_modem, from_modem, completion, _) =
            wired!(Config::new().send_delay(Duration::from_millis(10)));
        let mut serial = PipeReader(from_modem);

        session.enter_relay();
        let modem = async {
            let announce = expect_line(to_modem).await;
            reply(from_modem, b"AT+CIPSEND=5\r\r\nOK\r\n> ").await;
            let mut payload = [0; 5];
            read_exact(to_modem, &mut payload).await;
            reply(
                from_modem,
                b"\r\nRecv 5 bytes\r\n\r\nSEND OK\r\n\r\n+IPD,11:I am SERVER\r\n",
            )
            .await;
            (announce, payload)
        };
        let exchange = async {
            let exchanged = tokio::join!(session.relay_send(b"hello"), modem);
            // Let the trailing traffic be classified
            Timer::after(Duration::from_millis(10)).await;
            exchanged
        };

        let (result, (announce, payload)) = tokio::select! {
            e = ingress.read_from(&mut serial) => panic!("modem reader stopped: {:?}", e),
            exchanged = exchange => exchanged,
        };

        assert_eq!(Outcome::Ok, result.unwrap().outcome);
        assert_eq!("AT+CIPSEND=5\r\n", announce.as_str());
        assert_eq!(b"hello", &payload);
        // Neither `SEND OK` nor the relayed data completes anything
        assert!(!completion.available());
        assert_eq!(
            State::Relay {
                send_pending: false
            },
            ingress.classifier().state()
        );
    }

    #[tokio::test]
    async fn timed_out_scan_is_reset_without_modem_traffic() {
        let (mut session, mut ingress, to_modem, from_modem, _, link) =
            wired!(Config::new().scan_timeout(Duration::from_millis(50)));
        let mut serial = PipeReader(from_modem);

        let exchange = async {
            // The listing never ends with a result code
            let (scanned, ()) = tokio::join!(session.scan(), async {
                expect_line(to_modem).await;
                reply(from_modem, b"AT+CWLAP\r\r\n+CWLAP:(3,\"cafe\",-60,\"x\",1)\r\n").await;
                Timer::after(Duration::from_millis(10)).await;
                assert!(link.is_echo_suppressed());
            });
            assert_eq!(Err(Error::Timeout), scanned);

            Timer::after(Duration::from_millis(10)).await;
            assert!(!link.has_pending_requests());
            assert!(!link.is_echo_suppressed());

            let (result, ()) = tokio::join!(session.request("AT"), async {
                assert_eq!("AT\r\n", expect_line(to_modem).await.as_str());
                reply(from_modem, b"AT\r\r\nOK\r\n").await;
            });
            result
        };

        let result = tokio::select! {
            e = ingress.read_from(&mut serial) => panic!("modem reader stopped: {:?}", e),
            result = exchange => result,
        };
        assert_eq!(Outcome::Ok, result.unwrap().outcome);
        assert_eq!(State::Idle, ingress.classifier().state());
    }
}
