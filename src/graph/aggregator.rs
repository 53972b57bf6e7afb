//! Relationship aggregation.
//!
//! Collapses relationship instances into `(source-type, relation, target-type)`
//! triples with a frequency. Accumulation is a plain counter per key, so it
//! is commutative and associative: partial aggregators built over any
//! partition of the input can be merged in any order.

use crate::types::{AggregatedRelationship, RelationKey, RelationshipInstance};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Single-owner accumulator.
///
/// Keys are kept sorted so `finish` output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipAggregator {
    counts: BTreeMap<RelationKey, u64>,
}

impl RelationshipAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one instance.
    pub fn add(&mut self, instance: &RelationshipInstance) {
        self.add_key(instance.key(), 1);
    }

    /// Add `frequency` to a key directly.
    pub fn add_key(&mut self, key: RelationKey, frequency: u64) {
        if frequency > 0 {
            *self.counts.entry(key).or_default() += frequency;
        }
    }

    /// Fold another aggregator into this one.
    pub fn merge(&mut self, other: Self) {
        for (key, frequency) in other.counts {
            self.add_key(key, frequency);
        }
    }

    /// Frequency recorded for a key (0 if absent).
    #[must_use]
    pub fn frequency(&self, key: &RelationKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of instances counted.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Aggregated relationships, sorted by key.
    #[must_use]
    pub fn finish(self) -> Vec<AggregatedRelationship> {
        self.counts
            .into_iter()
            .map(|(key, frequency)| AggregatedRelationship::new(key, frequency))
            .collect()
    }
}

impl<'a> Extend<&'a RelationshipInstance> for RelationshipAggregator {
    fn extend<I: IntoIterator<Item = &'a RelationshipInstance>>(&mut self, iter: I) {
        for instance in iter {
            self.add(instance);
        }
    }
}

impl<'a> FromIterator<&'a RelationshipInstance> for RelationshipAggregator {
    fn from_iter<I: IntoIterator<Item = &'a RelationshipInstance>>(iter: I) -> Self {
        let mut aggregator = Self::new();
        aggregator.extend(iter);
        aggregator
    }
}

/// Aggregate a batch of instances.
#[must_use]
pub fn aggregate<'a, I>(instances: I) -> Vec<AggregatedRelationship>
where
    I: IntoIterator<Item = &'a RelationshipInstance>,
{
    instances
        .into_iter()
        .collect::<RelationshipAggregator>()
        .finish()
}

/// Accumulator shared between concurrent producers.
///
/// Producers call [`add`](Self::add) through a shared reference; the
/// per-key counters are updated under the map's shard locks, so no update is
/// lost.
#[derive(Debug, Default)]
pub struct SharedAggregator {
    counts: DashMap<RelationKey, u64>,
}

impl SharedAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, instance: &RelationshipInstance) {
        *self.counts.entry(instance.key()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Freeze into a single-owner aggregator.
    #[must_use]
    pub fn into_aggregator(self) -> RelationshipAggregator {
        let mut aggregator = RelationshipAggregator::new();
        for (key, frequency) in self.counts {
            aggregator.add_key(key, frequency);
        }
        aggregator
    }
}
