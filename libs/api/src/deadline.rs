use std::time::Duration;

use tokio::time::Instant;

/// Абсолютный момент, к которому блокирующая стадия должна вернуть управление.
///
/// Один deadline выводится из общего timeout'а вызова pipeline и
/// передаётся в fetch и append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Сколько осталось до deadline (ноль, если уже истёк).
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_shrinks_to_zero() {
        let deadline = Deadline::after(Duration::from_secs(2));
        assert_eq!(deadline.remaining(), Duration::from_secs(2));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_orders_first() {
        let short = Deadline::after(Duration::from_millis(10));
        let long = Deadline::after(Duration::from_secs(10));
        assert_eq!(short.min(long), short);
    }
}
