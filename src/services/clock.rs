use std::time::Duration;

use chrono::{NaiveDate, Utc};

/// Source of the current date and of timed waits
///
/// The scheduler never touches wall-clock time directly, so tests can pin the
/// date and run on a paused tokio runtime.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current calendar date (UTC)
    fn today(&self) -> NaiveDate;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock pinned to one date; sleeps still go through tokio's timer
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

#[async_trait::async_trait]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
