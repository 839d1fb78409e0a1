//! Deduplication across partitions.
//!
//! A feature clipped into several leaves contributes one part per leaf, so
//! the same feature pair (or the same flagged feature) can be observed once
//! per part. This module collapses those observations before the results
//! leave the engine.
//!
//! # Dedup Strategies
//!
//! - **KeepFirst**: keep the first occurrence of a feature id
//! - **MergeContacts**: add up the contacts observed for one pair, so the
//!   pair is classified on its whole shared boundary

use rustc_hash::{FxHashMap, FxHashSet};

use crate::geometry::Contact;
use crate::layer::FeatureId;

/// One observed contact between parts of two features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairObservation {
    pub fida: FeatureId,
    pub fidb: FeatureId,
    pub contact: Contact,
}

impl PairObservation {
    /// Create an observation with the lower id first.
    pub fn oriented(a: FeatureId, b: FeatureId, contact: Contact) -> Self {
        Self {
            fida: a.min(b),
            fidb: a.max(b),
            contact,
        }
    }
}

/// Deduplicate feature ids, keeping first-occurrence order.
pub fn dedup_keep_first(ids: impl IntoIterator<Item = FeatureId>) -> Vec<FeatureId> {
    let mut seen: FxHashSet<FeatureId> = FxHashSet::default();
    ids.into_iter().filter(|fid| seen.insert(*fid)).collect()
}

/// Merge pair observations, adding up the contacts of each pair.
///
/// The result is sorted by `(fida, fidb)`.
pub fn merge_contacts(
    observations: impl IntoIterator<Item = PairObservation>,
) -> Vec<PairObservation> {
    let mut merged: FxHashMap<(FeatureId, FeatureId), Contact> = FxHashMap::default();

    for obs in observations {
        merged
            .entry((obs.fida, obs.fidb))
            .or_default()
            .merge(obs.contact);
    }

    let mut result: Vec<PairObservation> = merged
        .into_iter()
        .map(|((fida, fidb), contact)| PairObservation {
            fida,
            fidb,
            contact,
        })
        .collect();
    result.sort_by_key(|o| (o.fida, o.fidb));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(length: f64) -> Contact {
        Contact { area: 0.0, length }
    }

    #[test]
    fn test_dedup_keep_first() {
        let result = dedup_keep_first(vec![3, 1, 3, 2, 1]);
        assert_eq!(result, vec![3, 1, 2]);
    }

    #[test]
    fn test_merge_contacts() {
        let observations = vec![
            PairObservation::oriented(2, 1, touch(0.0)),
            PairObservation::oriented(1, 2, touch(0.25)),
            PairObservation::oriented(3, 4, Contact { area: 2.0, length: 0.0 }),
            PairObservation::oriented(4, 3, touch(1.0)),
            PairObservation::oriented(1, 2, touch(0.5)),
        ];

        let result = merge_contacts(observations);

        assert_eq!(
            result,
            vec![
                PairObservation {
                    fida: 1,
                    fidb: 2,
                    contact: touch(0.75),
                },
                PairObservation {
                    fida: 3,
                    fidb: 4,
                    contact: Contact { area: 2.0, length: 1.0 },
                },
            ]
        );
    }

    #[test]
    fn test_oriented_orders_ids() {
        let obs = PairObservation::oriented(9, 4, touch(0.0));
        assert_eq!((obs.fida, obs.fidb), (4, 9));
    }
}
