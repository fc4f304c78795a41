use std::time::Duration;

/// What the producer knows about the batch it just dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTiming {
    pub sequence: u64,
    pub batch_len: usize,
}

/// Decides how long the producer holds the next dispatch back.
///
/// The delay is measured from the previous dispatch, not added after it.
/// Implementations that react to downstream load would plug in here.
pub trait PacingPolicy: Send + Sync {
    fn delay_before_next(&self, previous: &BatchTiming) -> Duration;
}

/// Constant cadence between dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPacing {
    pace: Duration,
}

impl FixedPacing {
    pub fn new(pace: Duration) -> Self {
        Self { pace }
    }

    pub fn pace(&self) -> Duration {
        self.pace
    }
}

impl PacingPolicy for FixedPacing {
    fn delay_before_next(&self, _previous: &BatchTiming) -> Duration {
        self.pace
    }
}
