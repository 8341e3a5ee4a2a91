use std::time::Duration;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Which failed sends may be repeated for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Reads and overwrites. Repeating them leaves the tracker in the same state.
    Idempotent,
    /// Creates. Only repeated when the server cannot have stored the first send.
    Unaccepted,
}

impl RetryPolicy {
    pub fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Idempotent => status == 429 || status >= 500,
            Self::Unaccepted => status == 429,
        }
    }

    pub fn retries_transport_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => error.is_timeout() || error.is_connect(),
            // A timeout may fire after the server committed the write.
            Self::Unaccepted => error.is_connect(),
        }
    }
}

/// Attempt budget and backoff shared by the Jira and GitHub clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
}

impl RetrySchedule {
    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay_ms.max(1),
        }
    }

    pub fn has_attempts_after(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff before the send following `attempt`. A `Retry-After` hint wins
    /// over the exponential step but never drops below the base delay.
    pub fn delay_after(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(MAX_RETRY_DELAY_MS);
        if let Some(hint) = retry_after {
            return hint.max(Duration::from_millis(self.base_delay_ms)).min(cap);
        }
        let exponent = attempt.saturating_sub(1).min(10) as u32;
        let scaled = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent));
        Duration::from_millis(scaled).min(cap)
    }
}

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Clips a response body for inclusion in an error message.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
