//! Caller-side polling.
//!
//! [`EdiCropClient::poll_status`] asks once. [`Poller`] repeats that on the
//! caller's thread: one request per `next()`, a sleep between requests, and
//! a [`CancellationToken`] the caller can trip from anywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::client::EdiCropClient;
use crate::error::Result;
use crate::model::{MutationTicket, ProcessStatus};
use crate::transport::{CredentialProvider, Transport};

/// Sleeps are cut into slices of this length so cancellation is noticed
/// promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Iterator over successive statuses of one ticket.
///
/// Ends after the first settled status (validated, rejected, formalized or
/// cancelled), after a non-retryable error, after `max_attempts` polls, or
/// once the token is cancelled. Timeouts are yielded and polling continues.
pub struct Poller<'a, T, C> {
    client: &'a EdiCropClient<T, C>,
    ticket: MutationTicket,
    interval: Duration,
    max_attempts: Option<u32>,
    cancel: CancellationToken,
    attempts: u32,
    finished: bool,
}

impl<'a, T: Transport, C: CredentialProvider> Poller<'a, T, C> {
    pub fn new(client: &'a EdiCropClient<T, C>, ticket: MutationTicket) -> Self {
        Self {
            client,
            ticket,
            interval: Duration::from_secs(5),
            max_attempts: None,
            cancel: CancellationToken::new(),
            attempts: 0,
            finished: false,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drains the poller and returns the last status seen.
    pub fn last_status(self) -> Result<Option<ProcessStatus>> {
        let mut last = None;
        for status in self {
            last = Some(status?);
        }
        Ok(last)
    }

    fn exhausted(&self) -> bool {
        self.finished
            || self.cancel.is_cancelled()
            || self.max_attempts.is_some_and(|max| self.attempts >= max)
    }

    /// Returns false when cancelled while waiting.
    fn wait(&self) -> bool {
        let mut remaining = self.interval;
        while !remaining.is_zero() {
            if self.cancel.is_cancelled() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
        !self.cancel.is_cancelled()
    }
}

impl<T: Transport, C: CredentialProvider> Iterator for Poller<'_, T, C> {
    type Item = Result<ProcessStatus>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted() {
            return None;
        }
        if self.attempts > 0 && !self.wait() {
            debug!("Polling {} cancelled", self.ticket);
            return None;
        }

        self.attempts += 1;
        let result = self.client.poll_status(&self.ticket);
        match &result {
            Ok(status) if status.state().is_settled() => self.finished = true,
            Err(err) if !err.is_retryable() => self.finished = true,
            _ => {}
        }
        Some(result)
    }
}
