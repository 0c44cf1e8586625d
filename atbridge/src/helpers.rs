/// Formats a byte slice as a string when it is valid UTF-8, and as raw bytes
/// otherwise.
pub struct LossyStr<'a>(pub &'a [u8]);

impl core::fmt::Debug for LossyStr<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LossyStr<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:a}", self.0)
    }
}

/// Incremental substring matcher for a single sentinel token.
///
/// Bytes are fed one at a time and the matcher remembers whether the token has
/// been seen since the last [`reset`](TokenMatcher::reset), so a growing
/// buffer never has to be rescanned from the start.
#[derive(Debug, Clone)]
pub struct TokenMatcher {
    token: &'static [u8],
    progress: usize,
    matched: bool,
}

impl TokenMatcher {
    pub const fn new(token: &'static [u8]) -> Self {
        Self {
            token,
            progress: 0,
            matched: false,
        }
    }

    pub fn advance(&mut self, byte: u8) {
        if self.matched || self.token.is_empty() {
            return;
        }

        let mut k = self.progress;
        loop {
            if self.token[k] == byte {
                k += 1;
                break;
            }
            if k == 0 {
                break;
            }
            k = self.border(k);
        }

        if k == self.token.len() {
            self.matched = true;
            self.progress = 0;
        } else {
            self.progress = k;
        }
    }

    pub const fn matched(&self) -> bool {
        self.matched
    }

    pub fn reset(&mut self) {
        self.progress = 0;
        self.matched = false;
    }

    /// Length of the longest proper prefix of `token[..k]` that is also a
    /// suffix of it.
    fn border(&self, k: usize) -> usize {
        let partial = &self.token[..k];
        (1..k)
            .rev()
            .find(|&l| partial[..l] == partial[k - l..])
            .unwrap_or(0)
    }
}
