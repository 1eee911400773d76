//! Debounced analysis scheduling.

use std::future::pending;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{sleep_until, Instant};

/// Why the scheduler is being poked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Edit,
    Paste,
}

/// How a paste is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PastePolicy {
    /// Same quiet period as any other edit.
    #[default]
    Debounce,
    /// Fire on the next turn. A later notification still restarts the full window.
    Immediate,
}

/// Coalesces bursts of notifications into one firing after a quiet period.
///
/// Every notification restarts the window. The scheduler holds at most one
/// deadline; a restarted or cancelled window never fires.
#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    quiet_period: Duration,
    paste_policy: PastePolicy,
    deadline: Option<Instant>,
}

impl DebounceScheduler {
    pub fn new(quiet_period: Duration, paste_policy: PastePolicy) -> Self {
        Self {
            quiet_period,
            paste_policy,
            deadline: None,
        }
    }

    pub fn notify(&mut self, trigger: Trigger) {
        self.notify_at(trigger, Instant::now());
    }

    pub fn notify_at(&mut self, trigger: Trigger, now: Instant) {
        self.deadline = Some(match (trigger, self.paste_policy) {
            (Trigger::Paste, PastePolicy::Immediate) => now,
            _ => now + self.quiet_period,
        });
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return true if the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Wait for the armed window to elapse, then disarm.
    ///
    /// Never completes while disarmed. Cancel-safe: dropping the future leaves
    /// the deadline in place.
    pub async fn fired(&mut self) {
        loop {
            let Some(deadline) = self.deadline else {
                return pending().await;
            };
            sleep_until(deadline).await;
            if self.take_due(Instant::now()) {
                return;
            }
        }
    }
}
