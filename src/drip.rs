//! Fixed-cadence pacing for a single session.

use std::time::Duration;

/// Pause between two writes when nothing else is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Paces one session's writes.
///
/// Each call to [`Drip::next_interval`] waits one full interval from the
/// moment it is called, i.e. from the end of the previous write. A write that
/// stalls for a long time is followed by a full interval, never a burst.
#[derive(Debug)]
pub struct Drip {
    period: Duration,
}

impl Drip {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Wait one interval.
    pub async fn next_interval(&mut self) {
        tokio::time::sleep(self.period).await;
    }
}
