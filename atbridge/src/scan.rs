//! Network-scan (`AT+CWLAP`) listing.
//!
//! Each listing line looks like
//! `+CWLAP:(<id>,"<ssid>",<rssi>,"<bssid>",<channel>)`. Raw lines are kept in
//! arrival order next to the SSID extracted from them.

use heapless::{String, Vec};
use nom::{
    bytes::complete::{tag, take_until},
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::{helpers::LossyStr, Error};

/// Maximum number of listing lines kept per scan
pub const MAX_ENTRIES: usize = 32;
/// Maximum length of a single raw listing line
pub const ENTRY_LEN: usize = 128;
/// Maximum stored SSID length. Longer SSIDs are truncated.
pub const SSID_LEN: usize = 32;

pub type Ssid = String<SSID_LEN>;
pub type Networks = Vec<Ssid, MAX_ENTRIES>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanTable {
    entries: Vec<Vec<u8, ENTRY_LEN>, MAX_ENTRIES>,
    ssids: Vec<Option<Ssid>, MAX_ENTRIES>,
}

impl ScanTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            ssids: Vec::new(),
        }
    }

    /// Append a raw listing line and return its 0-based index.
    ///
    /// A line whose SSID cannot be extracted is still stored and still takes
    /// up an index, but `Error::MalformedScanEntry` is returned and it is left
    /// out of [`list`](Self::list).
    pub fn record_entry(&mut self, raw: &[u8]) -> Result<usize, Error> {
        if self.entries.is_full() {
            return Err(Error::Overflow);
        }
        let entry = Vec::from_slice(raw).map_err(|_| Error::Overflow)?;
        let ssid = extract_ssid(raw);
        let index = self.entries.len();

        // Both pushes are infallible: the two vectors grow in lockstep and
        // `entries` was checked for room above
        self.entries.push(entry).map_err(|_| Error::Overflow)?;
        self.ssids
            .push(ssid.as_ref().ok().cloned())
            .map_err(|_| Error::Overflow)?;

        ssid.map(|_| index)
    }

    /// `(display_index, ssid)` pairs in listing order, 1-based. Malformed
    /// entries are skipped but keep their display index.
    pub fn list(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.ssids
            .iter()
            .enumerate()
            .filter_map(|(i, ssid)| ssid.as_ref().map(|s| (i + 1, s.as_str())))
    }

    /// SSID shown at the given 1-based display index
    pub fn get(&self, display_index: usize) -> Option<&str> {
        self.ssids
            .get(display_index.checked_sub(1)?)?
            .as_ref()
            .map(String::as_str)
    }

    /// Raw listing line at the given 0-based index
    pub fn raw(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(|e| e.as_slice())
    }

    /// Snapshot of the well-formed SSIDs, in listing order
    pub fn networks(&self) -> Networks {
        self.ssids.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ssids.clear();
    }
}

/// Second comma-separated field, with its surrounding quotes removed.
fn ssid_field(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(
        pair(take_until(","), tag(",")),
        delimited(tag("\""), take_until("\""), tag("\"")),
    )(i)
}

/// Extract the SSID from a raw `+CWLAP:(...)` listing line.
pub fn extract_ssid(raw: &[u8]) -> Result<Ssid, Error> {
    let (_, field) = ssid_field(raw).map_err(|_| {
        warn!("Malformed scan entry: {:?}", LossyStr(raw));
        Error::MalformedScanEntry
    })?;
    let field = core::str::from_utf8(field).map_err(|_| Error::MalformedScanEntry)?;

    let mut end = field.len().min(SSID_LEN);
    while !field.is_char_boundary(end) {
        end -= 1;
    }

    let mut ssid = Ssid::new();
    ssid.push_str(&field[..end]).map_err(|_| Error::Overflow)?;
    Ok(ssid)
}
