use embassy_time::Duration;

/// Configuration of the [`CommandSession`](crate::CommandSession).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) cmd_cooldown: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) scan_timeout: Duration,
    pub(crate) send_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cmd_cooldown: Duration::from_millis(20),
            response_timeout: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(15),
            send_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum time between the completion of one command and the start of
    /// the next.
    #[must_use]
    pub const fn cmd_cooldown(mut self, duration: Duration) -> Self {
        self.cmd_cooldown = duration;
        self
    }

    /// Upper bound on how long to wait for a command to complete.
    #[must_use]
    pub const fn response_timeout(mut self, duration: Duration) -> Self {
        self.response_timeout = duration;
        self
    }

    /// Upper bound on how long a network scan may take. Scans are much
    /// slower than ordinary commands.
    #[must_use]
    pub const fn scan_timeout(mut self, duration: Duration) -> Self {
        self.scan_timeout = duration;
        self
    }

    /// Delay between the modem accepting `AT+CIPSEND=` and the payload being
    /// written. Slow modems drop the payload if it follows too soon.
    #[must_use]
    pub const fn send_delay(mut self, duration: Duration) -> Self {
        self.send_delay = duration;
        self
    }
}
