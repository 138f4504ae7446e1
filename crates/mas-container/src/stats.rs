//! Resolution statistics.

use std::time::Duration;

use serde::Serialize;

/// Counters for one service id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    /// Times the service was built.
    pub resolutions: u64,
    /// Times a cached singleton was returned instead.
    pub cache_hits: u64,
    #[serde(serialize_with = "serialize_micros")]
    pub total_time: Duration,
    #[serde(serialize_with = "serialize_micros")]
    pub last_time: Duration,
    /// Resident memory change across builds, in bytes. Zero where unsupported.
    pub memory_delta: i64,
    /// Size of the handle returned by the last build.
    pub last_size: usize,
}

impl ResolutionStats {
    pub(crate) fn record(&mut self, elapsed: Duration, memory_delta: i64, size: usize) {
        self.resolutions += 1;
        self.total_time += elapsed;
        self.last_time = elapsed;
        self.memory_delta = self.memory_delta.saturating_add(memory_delta);
        self.last_size = size;
    }

    /// Mean build time, or zero if never built.
    #[must_use]
    pub fn average_time(&self) -> Duration {
        u32::try_from(self.resolutions)
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| self.total_time / n)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_micros<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(value.as_micros())
}

/// Aggregate view over the whole container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub services: usize,
    pub singletons: usize,
    pub instantiated: usize,
    pub aliases: usize,
    pub tags: usize,
    pub resolutions: u64,
    pub cache_hits: u64,
}
