use crate::cache::ProbeResult;
use crate::config::CacheConfiguration;
use crate::report::Report;
use crate::trace::AccessRecord;
use std::ops::{Add, AddAssign};

/// Counters gathered over one run. They only ever grow while a trace is replayed. Runs over the
/// same geometry can be summed to get totals across several traces.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct Statistics {
    pub total_accesses: u64,
    pub misses: u64,
    pub writes: u64,
    pub instructions_retired: u64,
    pub dirty_evictions: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.total_accesses - self.misses
    }
}

impl Add<Statistics> for Statistics {
    type Output = Statistics;

    fn add(self, rhs: Statistics) -> Self::Output {
        Self::Output {
            total_accesses: self.total_accesses + rhs.total_accesses,
            misses: self.misses + rhs.misses,
            writes: self.writes + rhs.writes,
            instructions_retired: self.instructions_retired + rhs.instructions_retired,
            dirty_evictions: self.dirty_evictions + rhs.dirty_evictions,
        }
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.add(rhs)
    }
}

/// `StatisticsCollector` is fed by the driver after every access. Reading the counters never
/// prints anything; rendering is left to whoever asks for a `Report`.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    statistics: Statistics,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one processed access.
    ///
    /// # Arguments
    ///
    /// * `record` - the access that was applied to the cache
    /// * `result` - what the cache reported for it
    pub fn record(&mut self, record: &AccessRecord, result: &ProbeResult) {
        let stats = &mut self.statistics;
        stats.total_accesses += 1;
        stats.writes += u64::from(record.kind.is_store());
        stats.misses += u64::from(!result.hit);
        stats.dirty_evictions += u64::from(result.evicted_was_dirty);
        stats.instructions_retired += record.instructions_retired;
    }

    pub fn snapshot(&self) -> Statistics {
        self.statistics
    }

    /// Build a report for the counters gathered so far. May be called any number of times.
    pub fn report(&self, config: &CacheConfiguration) -> Report {
        Report::build(config, &self.statistics)
    }
}
