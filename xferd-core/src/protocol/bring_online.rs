//! Bring-online (staging) polling state
//!
//! A staging request is submitted once, then polled on a doubling
//! schedule until the file is pinned or the wait budget runs out.
//!
//! ```text
//! NotStarted --submit--> Polling --poll(pinned)--> Ready
//!                           |  ^
//!                           |  | poll(pending)
//!                           +--+
//!                           |
//!                           +--wait exceeded--> Expired
//! ```

use serde::{Deserialize, Serialize};

use super::messages::ErrorInfo;
use super::text::{FixedText, JobId};

/// Staging URL
pub const URL_LEN: usize = 1024;
/// Delegated proxy reference
pub const PROXY_LEN: usize = 1024;
/// Storage access token
pub const TOKEN_LEN: usize = 512;

/// First poll interval after submission (seconds)
pub const POLL_INTERVAL_BASE_SECS: i64 = 5;
/// Upper bound of the poll interval (seconds)
pub const POLL_INTERVAL_MAX_SECS: i64 = 300;

/// Polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StagingPhase {
    #[default]
    NotStarted,
    Polling,
    Ready,
    Expired,
}

impl StagingPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StagingPhase::Ready | StagingPhase::Expired)
    }
}

/// Pin status reported by the storage endpoint on a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    Pending,
    Pinned,
}

/// Bring-online request and its polling progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BringOnlineState {
    pub error: ErrorInfo,
    pub job_id: JobId,
    pub url: FixedText<URL_LEN>,
    pub proxy: FixedText<PROXY_LEN>,
    pub token: FixedText<TOKEN_LEN>,
    /// Transport-level retry attempts, independent of polls
    pub retries: u32,
    pub file_id: u64,
    pub started: bool,
    /// Submission time, seconds since epoch
    pub timestamp: i64,
    /// Seconds, 0 = unbounded
    pub pin_lifetime: u32,
    /// Seconds, 0 = unbounded
    pub bringonline_timeout: u32,
    pub n_polls: u32,
    /// Seconds since epoch
    pub next_poll: i64,
    pub phase: StagingPhase,
}

impl BringOnlineState {
    pub fn new(
        job_id: JobId,
        file_id: u64,
        url: &str,
        pin_lifetime: u32,
        bringonline_timeout: u32,
    ) -> Self {
        Self {
            error: ErrorInfo::default(),
            job_id,
            url: FixedText::new(url),
            proxy: FixedText::empty(),
            token: FixedText::empty(),
            retries: 0,
            file_id,
            started: false,
            timestamp: 0,
            pin_lifetime,
            bringonline_timeout,
            n_polls: 0,
            next_poll: 0,
            phase: StagingPhase::NotStarted,
        }
    }

    pub fn with_credentials(mut self, proxy: &str, token: &str) -> Self {
        self.proxy = FixedText::new(proxy);
        self.token = FixedText::new(token);
        self
    }

    /// Mark the staging request as submitted at `now`.
    ///
    /// Returns false if the request had already been submitted.
    pub fn submit(&mut self, now: i64) -> bool {
        if self.phase != StagingPhase::NotStarted {
            return false;
        }
        self.phase = StagingPhase::Polling;
        self.started = true;
        self.n_polls = 0;
        self.timestamp = now;
        self.next_poll = now + self.poll_interval(0);
        true
    }

    /// Is a poll due at `now`?
    pub fn poll_due(&self, now: i64) -> bool {
        self.phase == StagingPhase::Polling && now >= self.next_poll
    }

    /// Seconds waited since submission
    pub fn waited(&self, now: i64) -> i64 {
        if self.started {
            (now - self.timestamp).max(0)
        } else {
            0
        }
    }

    /// Record the outcome of one poll made at `now`.
    ///
    /// Expiry is checked before the pin status: a file pinned after the
    /// wait budget is exhausted still resolves to `Expired`.
    pub fn record_poll(&mut self, now: i64, pin: PinStatus) -> StagingPhase {
        if self.phase != StagingPhase::Polling {
            return self.phase;
        }
        self.n_polls += 1;

        if self.wait_exceeded(now) {
            self.phase = StagingPhase::Expired;
        } else if pin == PinStatus::Pinned {
            self.phase = StagingPhase::Ready;
        } else {
            self.next_poll = now + self.poll_interval(self.n_polls);
        }
        self.phase
    }

    /// Count a transport-level retry
    pub fn record_retry(&mut self) -> u32 {
        self.retries += 1;
        self.retries
    }

    fn wait_exceeded(&self, now: i64) -> bool {
        let waited = self.waited(now);
        let over = |limit: u32| limit > 0 && waited > i64::from(limit);
        over(self.bringonline_timeout) || over(self.pin_lifetime)
    }

    /// Interval before the poll following `polls_done` polls
    pub fn poll_interval(&self, polls_done: u32) -> i64 {
        let shift = polls_done.min(16);
        let mut interval = (POLL_INTERVAL_BASE_SECS << shift).min(POLL_INTERVAL_MAX_SECS);
        if self.bringonline_timeout > 0 {
            interval = interval.min(i64::from(self.bringonline_timeout));
        }
        interval.max(1)
    }
}
