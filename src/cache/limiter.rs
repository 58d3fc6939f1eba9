/// Request spacing and server-error cooldown
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{sleep_until, Duration, Instant};

use crate::error::TelemetryError;

#[derive(Debug, Default)]
struct LimiterState {
    last_request_at: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Gate in front of every outbound fetch.
///
/// Requests are spaced at least `min_interval` apart; callers arriving too
/// early are delayed, never dropped. After a server error the gate refuses
/// everything until the cooldown expires.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    cooldown: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, cooldown: Duration) -> Self {
        RateLimiter {
            min_interval,
            cooldown,
            state: Mutex::new(LimiterState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next request slot, or fail fast while cooling down
    ///
    /// The cooldown is checked again after waiting, so callers queued
    /// behind a request that tripped it do not reach the backend.
    pub async fn gate(&self) -> Result<(), TelemetryError> {
        let start_at = {
            let mut state = self.state();
            let now = Instant::now();
            check_cooldown(&mut state, now)?;

            // Each caller reserves its own slot after the previous one
            let start_at = match state.last_request_at {
                Some(last) => (last + self.min_interval).max(now),
                None => now,
            };
            state.last_request_at = Some(start_at);
            start_at
        };

        let now = Instant::now();
        if start_at > now {
            debug!("Delaying request by {} ms", (start_at - now).as_millis());
            sleep_until(start_at).await;
            check_cooldown(&mut self.state(), Instant::now())?;
        }
        Ok(())
    }

    /// Open (or restart) the cooldown window after a server error
    pub fn trip(&self) {
        let until = Instant::now() + self.cooldown;
        self.state().cooldown_until = Some(until);
        warn!(
            "Server error, refusing telemetry requests for {}s",
            self.cooldown.as_secs()
        );
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.state()
            .cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Forget spacing and cooldown state
    pub fn reset(&self) {
        *self.state() = LimiterState::default();
    }
}

fn check_cooldown(state: &mut LimiterState, now: Instant) -> Result<(), TelemetryError> {
    if let Some(until) = state.cooldown_until {
        if now < until {
            return Err(TelemetryError::Cooldown {
                remaining_seconds: ceil_seconds(until - now),
            });
        }
        state.cooldown_until = None;
    }
    Ok(())
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
