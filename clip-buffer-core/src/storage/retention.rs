use std::time::{Duration, Instant};

/// Decides how much history the fragment store keeps.
///
/// The horizon is `max(floor, clip_duration)`: always enough for the
/// configured clip, never less than the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    floor_secs: u32,
}

impl RetentionPolicy {
    pub const DEFAULT_FLOOR_SECS: u32 = 30;

    pub fn new(floor_secs: u32) -> Self {
        Self { floor_secs }
    }

    pub fn horizon_secs(&self, clip_duration_secs: u32) -> u32 {
        self.floor_secs.max(clip_duration_secs)
    }

    pub fn horizon(&self, clip_duration_secs: u32) -> Duration {
        Duration::from_secs(u64::from(self.horizon_secs(clip_duration_secs)))
    }

    /// Oldest timestamp worth keeping at `now`.
    ///
    /// `None` when the horizon reaches back past the clock's origin, in which
    /// case nothing is old enough to evict.
    pub fn cutoff(&self, now: Instant, clip_duration_secs: u32) -> Option<Instant> {
        now.checked_sub(self.horizon(clip_duration_secs))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FLOOR_SECS)
    }
}

/// Retention horizon under the default 30 second floor.
pub fn retention_horizon_seconds(configured_clip_duration_secs: u32) -> u32 {
    RetentionPolicy::default().horizon_secs(configured_clip_duration_secs)
}
