use crate::config::CacheConfiguration;
use crate::stattrack::Statistics;
use std::fmt;

/// Category label for a cache geometry.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Associativity {
    DirectMapped,
    FullyAssociative,
    SetAssociative(usize),
}

impl Associativity {
    /// A single-line cache is both one-way and one-set; it is labelled fully associative.
    pub fn of(config: &CacheConfiguration) -> Self {
        if config.num_sets() == 1 {
            Associativity::FullyAssociative
        } else if config.associativity() == 1 {
            Associativity::DirectMapped
        } else {
            Associativity::SetAssociative(config.associativity())
        }
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Associativity::DirectMapped => write!(f, "Direct-Mapped"),
            Associativity::FullyAssociative => write!(f, "Fully Associative"),
            Associativity::SetAssociative(ways) => write!(f, "{}-way set associative", ways),
        }
    }
}

/// A ratio over the number of accesses. With no accesses there is nothing to divide by, and the
/// rate is reported as such instead of as NaN.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Rate {
    NoAccesses,
    Percent(f64),
}

impl Rate {
    pub fn of(count: u64, total: u64) -> Self {
        if total == 0 {
            Rate::NoAccesses
        } else {
            Rate::Percent(count as f64 / total as f64 * 100.0)
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::NoAccesses => write!(f, "n/a (no accesses)"),
            Rate::Percent(percent) => write!(f, "{:.2}%", percent),
        }
    }
}

/// Everything worth printing about a finished run: the geometry that was simulated and the
/// outcome counters.
#[derive(Debug, PartialEq, Clone)]
pub struct Report {
    pub num_sets: usize,
    pub associativity: usize,
    pub block_size: u64,
    pub capacity: u64,
    pub label: Associativity,
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub instructions_retired: u64,
    pub dirty_evictions: u64,
    pub hit_rate: Rate,
    pub miss_rate: Rate,
}

impl Report {
    pub fn build(config: &CacheConfiguration, stats: &Statistics) -> Self {
        Self {
            num_sets: config.num_sets(),
            associativity: config.associativity(),
            block_size: config.block_size(),
            capacity: config.capacity(),
            label: Associativity::of(config),
            accesses: stats.total_accesses,
            hits: stats.hits(),
            misses: stats.misses,
            writes: stats.writes,
            instructions_retired: stats.instructions_retired,
            dirty_evictions: stats.dirty_evictions,
            hit_rate: Rate::of(stats.hits(), stats.total_accesses),
            miss_rate: Rate::of(stats.misses, stats.total_accesses),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "
Cache Info
---------------------------------
number of sets:           {}
lines per set:            {}
block size (bytes):       {}
associativity:            {}
cache size (bytes):       {}

Cache Hit Rate
---------------------------------
accesses:                 {}
hit rate:                 {}
miss rate:                {}
misses:                   {}
hits:                     {}
writes:                   {}
dirty evictions:          {}
instructions retired:     {}
",
            self.num_sets,
            self.associativity,
            self.block_size,
            self.label,
            self.capacity,
            self.accesses,
            self.hit_rate,
            self.miss_rate,
            self.misses,
            self.hits,
            self.writes,
            self.dirty_evictions,
            self.instructions_retired,
        )
    }
}
