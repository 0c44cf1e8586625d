/// Errors returned by the crate
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Serial read error. The channel is unusable and its task should stop.
    Read,
    /// Serial write error. The channel is unusable and its task should stop.
    Write,
    /// Timed out while waiting for the modem to complete a command
    Timeout,
    /// A bounded buffer or table would have exceeded its capacity
    Overflow,
    /// A scan entry did not have the expected `+CWLAP:(id,"ssid",...)` shape
    MalformedScanEntry,
    /// A completion was signaled while the previous one was still unconsumed
    SlotInUse,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Read => f.write_str("serial read error"),
            Self::Write => f.write_str("serial write error"),
            Self::Timeout => f.write_str("timed out waiting for modem"),
            Self::Overflow => f.write_str("buffer capacity exceeded"),
            Self::MalformedScanEntry => f.write_str("malformed scan entry"),
            Self::SlotInUse => f.write_str("completion slot in use"),
        }
    }
}
