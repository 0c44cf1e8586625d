use embassy_futures::select::{select, Either};
use embedded_io_async::{Read, Write};
use heapless::Vec;

use crate::{
    classifier::ResponseClassifier,
    completion::{Completion, CompletionSlot},
    helpers::LossyStr,
    link::{LinkCommand, LinkControl},
    Error,
};

const ECHO_CHUNK: usize = 64;

/// Modem-reader side of the bridge.
///
/// Every byte received from the modem is run through the
/// [`ResponseClassifier`]. Bytes the classifier allows are mirrored to the
/// console sink `E`, finished commands are handed to the
/// [`CommandSession`](crate::CommandSession) through the [`CompletionSlot`].
pub struct ModemIngress<'a, E: Write> {
    classifier: ResponseClassifier,
    echo: E,
    completion: &'a CompletionSlot,
    link: &'a LinkControl,
    anomalies: usize,
}

impl<'a, E: Write> ModemIngress<'a, E> {
    pub fn new(echo: E, completion: &'a CompletionSlot, link: &'a LinkControl) -> Self {
        Self {
            classifier: ResponseClassifier::new(),
            echo,
            completion,
            link,
            anomalies: 0,
        }
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    /// Number of parsing anomalies seen since creation
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Read all bytes from the provided serial and classify them until the
    /// modem channel or the console sink fails.
    ///
    /// Link requests are applied while waiting for the modem, so `serial.read`
    /// must be cancel safe.
    pub async fn read_from(&mut self, serial: &mut impl Read) -> Error {
        let link = self.link;
        let mut buffer = [0; 32];
        loop {
            let received = match select(serial.read(&mut buffer), link.wait_request()).await {
                Either::First(received) => received,
                Either::Second(()) => {
                    self.apply_link_commands();
                    continue;
                }
            };

            match received {
                Ok(0) => {
                    error!("Modem serial closed");
                    return Error::Read;
                }
                Ok(received) => {
                    if let Err(e) = self.write(&buffer[..received]).await {
                        return e;
                    }
                }
                Err(_) => {
                    error!("Got modem serial read error");
                    return Error::Read;
                }
            }
        }
    }

    /// Classify a chunk of received bytes
    pub async fn write(&mut self, buffer: &[u8]) -> Result<(), Error> {
        self.apply_link_commands();
        trace!("Classifying: {:?}", LossyStr(buffer));

        let mut echo = Vec::<u8, ECHO_CHUNK>::new();
        for &byte in buffer {
            let classified = self.classifier.feed(byte);

            if classified.echo && echo.push(byte).is_err() {
                self.flush_echo(&mut echo).await?;
                // Cannot fail, the chunk was just emptied
                let _ = echo.push(byte);
            }

            if let Some(e) = classified.anomaly {
                self.anomalies += 1;
                warn!("Classifier anomaly: {:?}", e);
            }

            if let Some(completion) = classified.completion {
                // The console should see the response before the menu reacts
                self.flush_echo(&mut echo).await?;
                self.complete(completion);
            }

            self.link.publish(&self.classifier);
        }

        self.flush_echo(&mut echo).await
    }

    fn complete(&self, completion: Completion) {
        if self.completion.signal(completion).is_err() {
            error!("Completion slot in use, dropping completion");
        }
    }

    fn apply_link_commands(&mut self) {
        let requests = self.link.peek();
        if requests.reset {
            debug!("Resetting classifier");
            self.classifier.reset();
        }
        match requests.relay {
            Some(LinkCommand::EnterRelay) => self.classifier.enter_relay(),
            Some(LinkCommand::ExitRelay) => self.classifier.exit_relay(),
            _ => {}
        }
        // Publish before acknowledging, so the console never sees the state
        // from before the request once the request is cleared
        self.link.publish(&self.classifier);
        self.link.acknowledge(requests);
    }

    async fn flush_echo(&mut self, echo: &mut Vec<u8, ECHO_CHUNK>) -> Result<(), Error> {
        if echo.is_empty() {
            return Ok(());
        }
        self.echo.write_all(echo).await.map_err(|_| Error::Write)?;
        self.echo.flush().await.map_err(|_| Error::Write)?;
        echo.clear();
        Ok(())
    }
}
