use std::time::{Duration, SystemTime};

/// Circuit breaker state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Tripped; calls are short-circuited without touching the network.
    Open,
    /// Cooldown elapsed; trial calls are allowed through.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping Closed -> Open.
    pub failure_threshold: u32,
    /// How long the circuit stays Open before allowing a trial call.
    pub recovery_timeout: Duration,
    /// Consecutive trial successes required to close from HalfOpen.
    /// A single success is not enough.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

/// Observable snapshot of the breaker, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub is_open: bool,
    pub opened_at: Option<SystemTime>,
}

/// Tracks consecutive failures/successes against the paired peer and
/// short-circuits calls while the peer is considered dark.
///
/// Not internally synchronized; the session manager owns one behind a
/// mutex and heartbeats are sequential anyway.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<SystemTime>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
        }
    }

    /// Whether a call may go out right now.
    ///
    /// While Open, this is where the Open -> HalfOpen transition happens:
    /// once `recovery_timeout` has elapsed since the circuit opened, the
    /// next caller is let through as a trial.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .and_then(|t| t.elapsed().ok())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    tracing::info!("circuit breaker half-open after {:?} cooldown", elapsed);
                    self.state = CircuitState::HalfOpen;
                    self.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        if self.state == CircuitState::HalfOpen
            && self.consecutive_successes >= self.config.success_threshold
        {
            tracing::info!(
                "circuit breaker closed after {} trial successes",
                self.consecutive_successes
            );
            self.state = CircuitState::Closed;
            self.opened_at = None;
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => {
                tracing::warn!("trial call failed, reopening circuit");
                self.trip();
            }
            CircuitState::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    "circuit breaker opened after {} consecutive failures",
                    self.consecutive_failures
                );
                self.trip();
            }
            _ => {}
        }
    }

    /// Back to a pristine Closed breaker (used on unpair).
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.opened_at = None;
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            is_open: self.state == CircuitState::Open,
            opened_at: self.opened_at,
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::default())
    }

    /// Rewinds `opened_at` so cooldown checks see an elapsed timeout.
    fn expire_cooldown(b: &mut CircuitBreaker) {
        b.opened_at = Some(SystemTime::now() - Duration::from_secs(31));
    }

    #[test]
    fn test_starts_closed() {
        let mut b = breaker();
        assert!(b.can_execute());
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert!(!snap.is_open);
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let mut b = breaker();
        for _ in 0..4 {
            b.record_failure();
            assert_eq!(b.snapshot().state, CircuitState::Closed);
        }
        b.record_failure();
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert!(snap.is_open);
        assert_eq!(snap.consecutive_failures, 5);
        assert!(snap.opened_at.is_some());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut b = breaker();
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        assert_eq!(b.snapshot().consecutive_failures, 0);

        // Needs a full threshold run again to trip.
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn test_short_circuits_before_cooldown() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert!(!b.can_execute());
        assert_eq!(b.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        expire_cooldown(&mut b);

        assert!(b.can_execute());
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_closing_requires_three_trial_successes() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        expire_cooldown(&mut b);
        assert!(b.can_execute());

        b.record_success();
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.snapshot().state, CircuitState::Closed);
        assert!(b.snapshot().opened_at.is_none());
    }

    #[test]
    fn test_trial_failure_reopens() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        expire_cooldown(&mut b);
        assert!(b.can_execute());

        b.record_success();
        b.record_failure();
        assert_eq!(b.snapshot().state, CircuitState::Open);
        // Failure also reset the trial success streak.
        assert_eq!(b.snapshot().consecutive_successes, 0);

        // And the cooldown starts over from the reopen.
        assert!(!b.can_execute());
    }

    #[test]
    fn test_reset_returns_to_pristine() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        b.reset();
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.opened_at.is_none());
        assert!(b.can_execute());
    }
}
