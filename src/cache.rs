use crate::address::AddressDecoder;
use crate::config::{CacheConfiguration, ConfigurationError};
use crate::trace::AccessRecord;
use std::cmp::Reverse;
use tracing::trace;

/// The `ProbeResult` encodes the outcome of presenting one access to the cache: whether the block
/// was resident, and, when a resident block had to make room, which tag left and whether it
/// needed to be written back.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ProbeResult {
    pub hit: bool,
    pub evicted_was_dirty: bool,
    pub evicted_tag: Option<u64>,
}

/// The `CacheLine` struct is the simplest element of the simulated cache. No data is stored, only
/// the bookkeeping needed to decide hits and victims.
///
/// `age` is a recency rank within the owning set rather than a timestamp: 0 is the most recently
/// used line and larger values are staler, never exceeding `associativity - 1`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct CacheLine {
    pub tag: u64,
    pub valid: bool,
    pub dirty: bool,
    pub age: usize,
}

/// A `CacheSet` is the group of `associativity` lines a given block may occupy. It owns lookup,
/// victim selection, and the least-recently-used ordering of its lines.
///
/// LRU order is kept with small bounded counters instead of a list. Among the valid lines the
/// ages always form the sequence `0..k` with no repeats, so the victim in a full set is the one
/// line whose age is `associativity - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    /// Create a set of `associativity` invalid lines.
    pub fn new(associativity: usize) -> Self {
        Self {
            lines: vec![CacheLine::default(); associativity],
        }
    }

    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    pub fn associativity(&self) -> usize {
        self.lines.len()
    }

    /// Present `tag` to the set and update its state as a real write-back, write-allocate cache
    /// would.
    ///
    /// On a hit the line is marked dirty if `is_store` (a dirty line stays dirty until evicted).
    /// On a miss the first invalid line is filled; if there is none, the stalest line is evicted,
    /// the lowest slot winning any tie. A freshly filled line is dirty only if the miss itself was
    /// a store. Either way the touched line becomes the most recently used.
    ///
    /// # Arguments
    ///
    /// * `tag` - tag bits of the accessed address
    /// * `is_store` - whether the access writes the block
    pub fn probe(&mut self, tag: u64, is_store: bool) -> ProbeResult {
        let mut result = ProbeResult::default();

        let mut first_invalid = None;
        let mut hit_index = None;
        for (i, line) in self.lines.iter().enumerate() {
            if !line.valid {
                if first_invalid.is_none() {
                    first_invalid = Some(i);
                }
            } else if line.tag == tag {
                hit_index = Some(i);
                break;
            }
        }

        let index = match (hit_index, first_invalid) {
            (Some(index), _) => {
                result.hit = true;
                self.lines[index].dirty |= is_store;
                index
            }
            (None, Some(index)) => {
                self.fill(index, tag, is_store);
                index
            }
            (None, None) => {
                let index = self.victim();
                let victim = &self.lines[index];
                result.evicted_was_dirty = victim.dirty;
                result.evicted_tag = Some(victim.tag);
                self.fill(index, tag, is_store);
                index
            }
        };

        self.touch(index);
        result
    }

    /// Slot holding the stalest line. Only meaningful when every line is valid.
    fn victim(&self) -> usize {
        // min_by_key keeps the first of equal keys, so the lowest slot wins ties
        match self
            .lines
            .iter()
            .enumerate()
            .min_by_key(|(_, line)| Reverse(line.age))
        {
            Some((index, _)) => index,
            None => unreachable!("cache set has no lines"),
        }
    }

    fn fill(&mut self, index: usize, tag: u64, is_store: bool) {
        let line = &mut self.lines[index];
        line.valid = true;
        line.tag = tag;
        line.dirty = is_store;
    }

    /// Make `index` the most recently used line. Every line at least as recent as it moves one
    /// step staler, bounded by the oldest rank.
    fn touch(&mut self, index: usize) {
        let pivot = self.lines[index].age;
        let oldest = self.lines.len().saturating_sub(1);
        for line in self.lines.iter_mut() {
            if line.age <= pivot && line.age < oldest {
                line.age += 1;
            }
        }
        self.lines[index].age = 0;
    }
}

/// The `CacheModel` struct simulates a single set-associative cache. It owns one `CacheSet` per
/// set index, routes each access to its set, and reports the outcome unchanged.
///
/// Instances share no state, so independent runs may be driven in parallel, but accesses to one
/// model must be applied strictly in trace order.
#[derive(Debug, Clone)]
pub struct CacheModel {
    configuration: CacheConfiguration,
    decoder: AddressDecoder,
    sets: Vec<CacheSet>,
}

impl CacheModel {
    /// Create a cold cache with every line invalid.
    pub fn new(configuration: CacheConfiguration) -> Self {
        Self {
            decoder: AddressDecoder::from(&configuration),
            sets: vec![CacheSet::new(configuration.associativity()); configuration.num_sets()],
            configuration,
        }
    }

    /// Validate raw byte counts and create a cold cache from them.
    ///
    /// # Errors
    ///
    /// Fails with a `ConfigurationError` if any argument is not a power of two or the capacity
    /// cannot hold a single set.
    pub fn build(
        block_size: u64,
        associativity: u64,
        capacity: u64,
    ) -> Result<Self, ConfigurationError> {
        CacheConfiguration::new(block_size, associativity, capacity).map(Self::new)
    }

    pub fn configuration(&self) -> &CacheConfiguration {
        &self.configuration
    }

    pub fn set(&self, index: usize) -> Option<&CacheSet> {
        self.sets.get(index)
    }

    /// Apply one access to the cache.
    pub fn probe(&mut self, record: &AccessRecord) -> ProbeResult {
        let decoded = self.decoder.decode(record.address);
        let result = self.sets[decoded.set_index].probe(decoded.tag, record.kind.is_store());
        if result.evicted_was_dirty {
            trace!(
                set = decoded.set_index,
                tag = ?result.evicted_tag,
                "dirty line written back"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    /// Ages of the valid lines, sorted. Must always be `0..k`.
    fn valid_ages(set: &CacheSet) -> Vec<usize> {
        let mut ages: Vec<usize> = set
            .lines()
            .iter()
            .filter(|line| line.valid)
            .map(|line| line.age)
            .collect();
        ages.sort_unstable();
        ages
    }

    fn assert_ages_are_permutation(set: &CacheSet) {
        let ages = valid_ages(set);
        let expected: Vec<usize> = (0..ages.len()).collect();
        assert_eq!(ages, expected);
    }

    fn age_of(set: &CacheSet, tag: u64) -> Option<usize> {
        set.lines()
            .iter()
            .find(|line| line.valid && line.tag == tag)
            .map(|line| line.age)
    }

    #[cfg(test)]
    mod cache_line_tests {

        use super::*;

        #[test]
        fn default() {
            let line = CacheLine::default();
            assert!(!line.valid);
            assert!(!line.dirty);
            assert_eq!(line.age, 0);
            assert_eq!(line.tag, 0);
        }
    }

    #[cfg(test)]
    mod cache_set_tests {

        use super::*;

        #[test]
        fn new() {
            let set = CacheSet::new(4);
            assert_eq!(set.associativity(), 4);
            assert!(set.lines().iter().all(|line| !line.valid));
        }

        #[test]
        fn fills_first_invalid_slot() {
            let mut set = CacheSet::new(4);
            for tag in 0..4 {
                let result = set.probe(tag, false);
                assert!(!result.hit);
                assert_eq!(result.evicted_tag, None);
                assert_eq!(set.lines()[tag as usize].tag, tag);
                assert_ages_are_permutation(&set);
            }
            let ages: Vec<usize> = set.lines().iter().map(|line| line.age).collect();
            assert_eq!(ages, vec![3, 2, 1, 0]);
        }

        #[test]
        fn repeated_access_hits_and_is_youngest() {
            let mut set = CacheSet::new(4);
            for tag in [7, 8, 9] {
                set.probe(tag, false);
            }
            assert!(!set.probe(1, false).hit);
            assert!(set.probe(1, false).hit);
            assert_eq!(age_of(&set, 1), Some(0));
            assert!(set.probe(8, false).hit);
            assert!(set.probe(8, false).hit);
            assert_eq!(age_of(&set, 8), Some(0));
            assert_ages_are_permutation(&set);
        }

        #[test]
        fn evicts_least_recently_used() {
            let ways = 4;
            let mut set = CacheSet::new(ways);
            for tag in 0..=ways as u64 {
                set.probe(tag, false);
            }
            assert_eq!(age_of(&set, 0), None);
            assert!(!set.probe(0, false).hit);
        }

        #[test]
        fn refreshed_line_survives() {
            let mut set = CacheSet::new(4);
            for tag in 0..4 {
                set.probe(tag, false);
            }
            assert!(set.probe(0, false).hit);
            let result = set.probe(4, false);
            assert_eq!(result.evicted_tag, Some(1));
            assert!(set.probe(0, false).hit);
            assert_ages_are_permutation(&set);
        }

        #[test]
        fn store_fill_is_written_back() {
            let mut set = CacheSet::new(2);
            set.probe(1, true);
            set.probe(2, false);
            let result = set.probe(3, false);
            assert_eq!(result.evicted_tag, Some(1));
            assert!(result.evicted_was_dirty);
        }

        #[test]
        fn load_fill_is_clean() {
            let mut set = CacheSet::new(2);
            set.probe(1, false);
            set.probe(1, false);
            set.probe(2, true);
            let result = set.probe(3, false);
            assert_eq!(result.evicted_tag, Some(1));
            assert!(!result.evicted_was_dirty);
        }

        #[test]
        fn dirty_is_sticky_until_eviction() {
            let mut set = CacheSet::new(2);
            set.probe(1, false);
            set.probe(1, true);
            set.probe(1, false);
            assert!(set.lines()[0].dirty);
            set.probe(2, false);
            assert!(set.probe(3, false).evicted_was_dirty);
            assert!(!set.lines()[0].dirty);
        }

        #[test]
        fn direct_mapped_always_replaces() {
            let mut set = CacheSet::new(1);
            assert_eq!(set.probe(1, true).evicted_tag, None);
            for tag in 2..6 {
                let result = set.probe(tag, false);
                assert!(!result.hit);
                assert_eq!(result.evicted_tag, Some(tag - 1));
                assert_eq!(set.lines()[0].age, 0);
            }
        }
    }

    #[cfg(test)]
    mod cache_model_tests {

        use super::*;

        #[test]
        fn new() {
            let model = CacheModel::build(64, 2, 1024).unwrap();
            assert_eq!(model.configuration().num_sets(), 8);
            assert_eq!(model.sets.len(), 8);
            assert!(model.set(7).is_some());
            assert!(model.set(8).is_none());
        }

        #[test]
        fn build_rejects_bad_geometry() {
            assert!(CacheModel::build(64, 3, 1024).is_err());
            assert!(CacheModel::build(64, 32, 1024).is_err());
        }

        #[test]
        fn conflicting_blocks_share_a_set() {
            let mut model = CacheModel::build(64, 2, 1024).unwrap();
            let outcomes: Vec<ProbeResult> = [0x0, 0x200, 0x400, 0x0]
                .into_iter()
                .map(|address| model.probe(&AccessRecord::load(address)))
                .collect();
            assert!(outcomes.iter().all(|result| !result.hit));
            assert_eq!(outcomes[2].evicted_tag, Some(0));
            assert!(!outcomes[2].evicted_was_dirty);
            assert_eq!(outcomes[3].evicted_tag, Some(1));
            assert!(model.set(1).unwrap().lines().iter().all(|l| !l.valid));
        }

        #[test]
        fn offsets_within_a_block_hit() {
            let mut model = CacheModel::build(64, 1, 256).unwrap();
            assert!(!model.probe(&AccessRecord::store(0x100)).hit);
            assert!(model.probe(&AccessRecord::load(0x13f)).hit);
            assert!(!model.probe(&AccessRecord::load(0x140)).hit);
        }
    }

    #[cfg(test)]
    mod lru_reference_tests {

        use super::*;
        use linked_hash_map::LinkedHashMap;
        use proptest::prelude::*;

        /// Straightforward LRU set: front of the map is least recently used.
        struct ReferenceSet {
            ways: usize,
            map: LinkedHashMap<u64, bool>,
        }

        impl ReferenceSet {
            fn new(ways: usize) -> Self {
                Self {
                    ways,
                    map: LinkedHashMap::new(),
                }
            }

            fn probe(&mut self, tag: u64, is_store: bool) -> ProbeResult {
                if let Some(dirty) = self.map.get_refresh(&tag) {
                    *dirty |= is_store;
                    return ProbeResult {
                        hit: true,
                        ..ProbeResult::default()
                    };
                }
                let mut result = ProbeResult::default();
                if self.map.len() == self.ways {
                    if let Some((evicted, dirty)) = self.map.pop_front() {
                        result.evicted_tag = Some(evicted);
                        result.evicted_was_dirty = dirty;
                    }
                }
                self.map.insert(tag, is_store);
                result
            }
        }

        proptest! {
            #[test]
            fn ages_stay_a_permutation(
                ways_bits in 0u32..4,
                accesses in prop::collection::vec((0u64..12, any::<bool>()), 1..200),
            ) {
                let mut set = CacheSet::new(1 << ways_bits);
                for (tag, is_store) in accesses {
                    set.probe(tag, is_store);
                    let ages = valid_ages(&set);
                    let expected: Vec<usize> = (0..ages.len()).collect();
                    prop_assert_eq!(ages, expected);
                    prop_assert_eq!(age_of(&set, tag), Some(0));
                }
            }

            #[test]
            fn matches_reference_lru(
                ways_bits in 0u32..4,
                accesses in prop::collection::vec((0u64..12, any::<bool>()), 1..200),
            ) {
                let ways = 1 << ways_bits;
                let mut set = CacheSet::new(ways);
                let mut reference = ReferenceSet::new(ways);
                for (tag, is_store) in accesses {
                    prop_assert_eq!(set.probe(tag, is_store), reference.probe(tag, is_store));
                }
            }

            #[test]
            fn wide_sets_match_reference_lru(
                ways_bits in 4u32..7,
                accesses in prop::collection::vec((0u64..96, any::<bool>()), 1..2000),
            ) {
                let ways = 1 << ways_bits;
                let mut set = CacheSet::new(ways);
                let mut reference = ReferenceSet::new(ways);
                for (tag, is_store) in accesses {
                    prop_assert_eq!(set.probe(tag, is_store), reference.probe(tag, is_store));
                }
            }
        }
    }
}
