//! Latest-value store
//!
//! Holds the most recent sample per register (physical and calculated).
//! Pollers write, the calc engine and external readers read. Backed by a
//! `DashMap` so concurrent device tasks never contend on one lock.

use dashmap::DashMap;

use crate::model::Sample;

#[derive(Debug, Default)]
pub struct ValueStore {
    samples: DashMap<u32, Sample>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, sample: Sample) {
        self.samples.insert(sample.register_id, sample);
    }

    pub fn latest(&self, register_id: u32) -> Option<Sample> {
        self.samples.get(&register_id).map(|entry| entry.clone())
    }

    /// Latest sample only if it is good quality.
    pub fn latest_good(&self, register_id: u32) -> Option<Sample> {
        self.latest(register_id).filter(Sample::is_good)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_update_replaces_previous() {
        let store = ValueStore::new();
        store.update(Sample::good(1, 1, 100.0, 10.0));
        store.update(Sample::good(1, 1, 110.0, 11.0));
        assert_eq!(store.latest(1).unwrap().value, 11.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_latest_good_filters_bad_samples() {
        let store = ValueStore::new();
        store.update(Sample::bad(1, 1));
        assert!(store.latest(1).is_some());
        assert!(store.latest_good(1).is_none());

        store.update(Sample::good(1, 1, 1.0, 1.0));
        assert!(store.latest_good(1).is_some());
    }

    #[test]
    fn test_missing_register() {
        let store = ValueStore::new();
        assert!(store.latest(42).is_none());
    }
}
