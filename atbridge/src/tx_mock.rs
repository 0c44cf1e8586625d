use core::convert::Infallible;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pipe::Pipe,
    pubsub::Publisher,
};
use embedded_io::ErrorType;
use heapless::String;

/// Modem writer that publishes everything written between two flushes as one
/// message.
pub struct TxMock<'a> {
    buf: String<64>,
    publisher: Publisher<'a, CriticalSectionRawMutex, String<64>, 1, 1, 1>,
}

#[derive(Debug)]
pub struct IoError;

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "mock io error")
    }
}

impl core::error::Error for IoError {}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl<'a> TxMock<'a> {
    pub fn new(publisher: Publisher<'a, CriticalSectionRawMutex, String<64>, 1, 1, 1>) -> Self {
        TxMock {
            buf: String::new(),
            publisher,
        }
    }
}

impl ErrorType for TxMock<'_> {
    type Error = IoError;
}

impl embedded_io_async::Write for TxMock<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for c in buf {
            self.buf.push(*c as char).map_err(|_| IoError)?;
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.publisher.publish(self.buf.clone()).await;
        self.buf.clear();
        Ok(())
    }
}

/// Console sink collecting everything echoed to it.
#[derive(Debug, Default)]
pub struct RecordingSink(pub std::vec::Vec<u8>);

impl ErrorType for RecordingSink {
    type Error = Infallible;
}

impl embedded_io_async::Write for RecordingSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Console sink that rejects every write.
pub struct BrokenSink;

impl ErrorType for BrokenSink {
    type Error = IoError;
}

impl embedded_io_async::Write for BrokenSink {
    async fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
        Err(IoError)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Err(IoError)
    }
}

/// Receiving end of an in-memory serial line.
pub struct PipeReader<'a, const N: usize>(pub &'a Pipe<CriticalSectionRawMutex, N>);

impl<const N: usize> ErrorType for PipeReader<'_, N> {
    type Error = Infallible;
}

impl<const N: usize> embedded_io_async::Read for PipeReader<'_, N> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.0.read(buf).await)
    }
}

/// Sending end of an in-memory serial line.
pub struct PipeWriter<'a, const N: usize>(pub &'a Pipe<CriticalSectionRawMutex, N>);

impl<const N: usize> ErrorType for PipeWriter<'_, N> {
    type Error = Infallible;
}

impl<const N: usize> embedded_io_async::Write for PipeWriter<'_, N> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.0.write(buf).await)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
