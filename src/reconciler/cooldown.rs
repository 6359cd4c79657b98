use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Blocks every fetch until a rate-limit cooldown has elapsed
#[derive(Debug, Default)]
pub struct RateLimitGate {
    until: Mutex<Option<Instant>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) a cooldown of `cooldown` from now
    pub fn trip(&self, cooldown: Duration) -> Instant {
        let until = Instant::now() + cooldown;
        let mut guard = self.until.lock();
        let until = guard.map_or(until, |current| current.max(until));
        *guard = Some(until);
        until
    }

    /// Time left before fetches may resume, `None` when open
    pub fn remaining(&self) -> Option<Duration> {
        let mut guard = self.until.lock();
        match *guard {
            Some(until) if until > Instant::now() => Some(until - Instant::now()),
            Some(_) => {
                *guard = None;
                None
            }
            None => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gate_closes_for_cooldown() {
        let gate = RateLimitGate::new();
        assert!(gate.is_open());

        gate.trip(Duration::from_secs(15));
        assert_eq!(gate.remaining(), Some(Duration::from_secs(15)));

        tokio::time::advance(Duration::from_secs(14)).await;
        assert!(!gate.is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_trip_does_not_shorten_cooldown() {
        let gate = RateLimitGate::new();
        gate.trip(Duration::from_secs(15));
        gate.trip(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!gate.is_open());
    }
}
