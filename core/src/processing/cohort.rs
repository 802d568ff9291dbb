use crate::interface::Capture;
use std::collections::BTreeMap;

/// Open cohorts held before the oldest is forced through.
pub const COHORT_CAPACITY: usize = 5;

/// Captures sharing one millisecond timestamp bucket.
#[derive(Debug)]
pub struct Cohort {
    pub key: i64,
    pub captures: Vec<Capture>,
    /// Released by eviction rather than completion.
    pub forced: bool,
}

/// Time-keyed staging area for captures awaiting correlation.
#[derive(Debug, Default)]
pub struct CohortBuffer {
    cohorts: BTreeMap<i64, Vec<Capture>>,
}

impl CohortBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files a capture under its cohort key and returns the key.
    pub fn insert(&mut self, capture: Capture) -> i64 {
        let key = capture.cohort_key();
        self.cohorts.entry(key).or_default().push(capture);
        key
    }

    /// Number of open cohorts.
    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    pub fn cohort_len(&self, key: i64) -> usize {
        self.cohorts.get(&key).map_or(0, Vec::len)
    }

    /// Next cohort due for processing, if any.
    ///
    /// The oldest cohort is evicted while more than [`COHORT_CAPACITY`] are
    /// open; otherwise the oldest cohort holding a capture from every node is
    /// released. Callers loop until this returns `None`.
    pub fn next_ready(&mut self, node_count: usize) -> Option<Cohort> {
        if self.cohorts.len() > COHORT_CAPACITY {
            let (key, captures) = self.cohorts.pop_first()?;
            return Some(Cohort {
                key,
                captures,
                forced: true,
            });
        }

        let key = self
            .cohorts
            .iter()
            .find(|(_, captures)| captures.len() >= node_count.max(1))
            .map(|(key, _)| *key)?;
        let captures = self.cohorts.remove(&key)?;
        Some(Cohort {
            key,
            captures,
            forced: false,
        })
    }
}
