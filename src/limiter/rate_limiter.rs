//! Process-wide pacing limiter.
//!
//! A single limiter paces every outgoing network call from every source
//! routed through it. A slot is granted only when both constraints hold:
//!
//! - at least `min_interval` elapsed since the last granted slot;
//! - fewer than `max_per_window` slots were granted inside the current
//!   rolling window (the window re-arms to `now + window` once it
//!   lapses).

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::config::PacingConfig;

/// Mutable pacing state behind the mutex.
#[derive(Debug)]
struct PacingState {
    /// Time of the last granted slot.
    last_grant: Option<Instant>,
    /// When the current rolling window lapses.
    window_reset_at: Instant,
    /// Slots granted inside the current window.
    granted_in_window: u32,
}

/// Process-wide rate limiter enforcing a minimum inter-call interval and
/// a rolling-window request budget.
///
/// Thread-safe; shared via `Arc` by every component that performs
/// network calls. Counters are in-memory and reset on restart.
pub struct PacingLimiter {
    state: Mutex<PacingState>,
    config: PacingConfig,
}

impl PacingLimiter {
    /// Create a limiter with default pacing settings.
    pub fn new() -> Self {
        Self::with_config(PacingConfig::default())
    }

    /// Create a limiter with custom pacing settings.
    pub fn with_config(config: PacingConfig) -> Self {
        Self {
            state: Mutex::new(PacingState {
                last_grant: None,
                window_reset_at: Instant::now() + config.window,
                granted_in_window: 0,
            }),
            config,
        }
    }

    /// Lock the pacing state, recovering from poison if necessary.
    ///
    /// For rate limiting it's safe to recover from a poisoned mutex
    /// since the worst case is slightly incorrect pacing, which is
    /// better than panicking.
    fn lock_state(&self) -> MutexGuard<'_, PacingState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Pacing limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Wait until a slot is granted.
    ///
    /// Suspends the caller until both the interval and window
    /// constraints hold, then records the grant.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.lock_state();
                match self.try_grant(&mut state) {
                    Ok(()) => {
                        debug!("Pacing limiter: slot granted");
                        return;
                    }
                    Err(wait) => wait,
                }
            };

            debug!("Pacing limiter: waiting {:?} for next slot", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Try to take a slot without waiting.
    ///
    /// Returns true if a slot was granted, false if pacing would require
    /// a wait.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock_state();
        self.try_grant(&mut state).is_ok()
    }

    /// Grant a slot or report how long the caller must wait.
    fn try_grant(&self, state: &mut PacingState) -> Result<(), Duration> {
        let now = Instant::now();

        // Re-arm the rolling window once it lapses.
        if now >= state.window_reset_at {
            state.window_reset_at = now + self.config.window;
            state.granted_in_window = 0;
        }

        // "At least min_interval elapsed" includes exact equality, so a
        // zero computed wait is grantable, not a wait. Returning
        // Err(ZERO) would make acquire sleep(ZERO) and spin without
        // ever advancing the clock.
        let interval_wait = state
            .last_grant
            .and_then(|last| {
                let next_allowed = last + self.config.min_interval;
                next_allowed.checked_duration_since(now)
            })
            .filter(|wait| !wait.is_zero());

        let window_wait = if state.granted_in_window >= self.config.max_per_window {
            Some(state.window_reset_at.saturating_duration_since(now))
        } else {
            None
        };

        match (interval_wait, window_wait) {
            (None, None) => {
                state.last_grant = Some(now);
                state.granted_in_window += 1;
                Ok(())
            }
            (a, b) => Err(a.unwrap_or(Duration::ZERO).max(b.unwrap_or(Duration::ZERO))),
        }
    }

    /// Slots granted inside the current window (for introspection).
    pub fn granted_in_window(&self) -> u32 {
        let state = self.lock_state();
        state.granted_in_window
    }
}

impl Default for PacingLimiter {
    fn default() -> Self {
        Self::new()
    }
}
