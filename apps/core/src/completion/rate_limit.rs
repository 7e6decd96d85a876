//! Rate-limit bookkeeping for the completion client.
//!
//! Tracks a sliding window of recent request timestamps (self-imposed
//! throttling), a backend-imposed cooldown deadline, and a consecutive-error
//! counter that trips a proactive cooldown when a failing backend keeps
//! failing. Owned by one client instance behind a single mutex; there is no
//! process-wide singleton.

use std::time::{Duration, Instant};

/// Outcome of asking the limiter whether a request may be sent now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    /// The request may go out immediately (and has been recorded).
    Allowed,
    /// The self-imposed window is full; pause briefly before sending.
    Throttled,
    /// A backend-imposed or proactive cooldown is active for this long.
    LimitedFor(Duration),
}

/// Mutable rate-limit state shared by all calls on one client.
pub struct RateLimitState {
    /// Timestamps of requests inside the sliding window.
    recent: Vec<Instant>,
    /// Maximum requests allowed per `window`.
    limit: usize,
    /// Duration of the sliding window.
    window: Duration,
    /// Deadline of an active backend-imposed or proactive cooldown.
    limited_until: Option<Instant>,
    /// Terminal failures since the last success.
    consecutive_errors: u32,
}

impl RateLimitState {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            recent: Vec::new(),
            limit,
            window,
            limited_until: None,
            consecutive_errors: 0,
        }
    }

    /// Check whether a request is admissible right now.
    ///
    /// On [`RateCheck::Allowed`] the request is recorded in the window.
    /// Callers that pause after [`RateCheck::Throttled`] must call
    /// [`RateLimitState::note_request`] once they actually send.
    pub fn check(&mut self) -> RateCheck {
        let now = Instant::now();

        if let Some(until) = self.limited_until {
            if until > now {
                return RateCheck::LimitedFor(until - now);
            }
            self.limited_until = None;
        }

        let window = self.window;
        self.recent.retain(|&t| now.duration_since(t) < window);

        if self.recent.len() < self.limit {
            self.recent.push(now);
            RateCheck::Allowed
        } else {
            RateCheck::Throttled
        }
    }

    /// Record a request sent after a throttle pause.
    pub fn note_request(&mut self) {
        self.recent.push(Instant::now());
    }

    /// Whether a cooldown is currently active.
    pub fn is_limited(&self) -> bool {
        matches!(self.limited_until, Some(until) if until > Instant::now())
    }

    /// Enter a backend-imposed cooldown until the given deadline.
    pub fn mark_limited_for(&mut self, duration: Duration) {
        self.limited_until = Some(Instant::now() + duration);
    }

    /// Record a successful request: the error streak resets.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Record a terminal failure. Once the streak reaches `threshold`,
    /// enter a proactive cooldown to avoid hammering a failing backend.
    pub fn record_failure(&mut self, threshold: u32, cooldown: Duration) {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= threshold {
            self.limited_until = Some(Instant::now() + cooldown);
        }
    }

    #[cfg(test)]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_allows_requests_within_limit() {
        let mut state = RateLimitState::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            assert_eq!(state.check(), RateCheck::Allowed);
        }
        assert_eq!(state.check(), RateCheck::Throttled);
    }

    #[test]
    fn test_window_resets() {
        let mut state = RateLimitState::new(2, Duration::from_millis(50));
        assert_eq!(state.check(), RateCheck::Allowed);
        assert_eq!(state.check(), RateCheck::Allowed);
        assert_eq!(state.check(), RateCheck::Throttled);

        thread::sleep(Duration::from_millis(60));

        assert_eq!(state.check(), RateCheck::Allowed);
    }

    #[test]
    fn test_backend_cooldown_blocks_then_expires() {
        let mut state = RateLimitState::new(5, Duration::from_secs(1));
        state.mark_limited_for(Duration::from_millis(40));
        assert!(state.is_limited());
        assert!(matches!(state.check(), RateCheck::LimitedFor(_)));

        thread::sleep(Duration::from_millis(50));
        assert!(!state.is_limited());
        assert_eq!(state.check(), RateCheck::Allowed);
    }

    #[test]
    fn test_error_streak_trips_cooldown() {
        let mut state = RateLimitState::new(5, Duration::from_secs(1));
        let cooldown = Duration::from_secs(10);

        state.record_failure(3, cooldown);
        state.record_failure(3, cooldown);
        assert!(!state.is_limited());

        state.record_failure(3, cooldown);
        assert!(state.is_limited());
    }

    #[test]
    fn test_success_resets_error_streak() {
        let mut state = RateLimitState::new(5, Duration::from_secs(1));
        state.record_failure(5, Duration::from_secs(10));
        state.record_failure(5, Duration::from_secs(10));
        assert_eq!(state.consecutive_errors(), 2);

        state.record_success();
        assert_eq!(state.consecutive_errors(), 0);
    }
}
