//! Monotonic version clock for `created`/`updated` markers.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::types::Version;

/// Hands out wall-clock microseconds, bumped so no two calls return the
/// same version.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicI64,
}

impl VersionClock {
    pub fn new() -> Self {
        VersionClock::default()
    }

    pub fn next(&self) -> Version {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Version(candidate),
                Err(seen) => last = seen,
            }
        }
    }

    /// Ensures future versions are greater than `version`.
    pub fn observe(&self, version: Version) {
        self.last.fetch_max(version.0, Ordering::AcqRel);
    }
}
