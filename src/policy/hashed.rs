//! Hashed split-point synthesis, and the split-points strategy used for
//! empty collections with a hashed key prefix and no zones.

use crate::chunk::ChunkRecord;
use crate::error::Result;
use crate::key::{BoundaryKey, KeyPattern, KeyValue};
use crate::policy::{chunks_from_split_points, PlacementContext, SplitRequest};

/// Split the signed 64-bit hash range into `num_chunks` equal-width
/// intervals and return the `num_chunks - 1` boundaries, ascending.
///
/// The intervals are symmetric about zero: an even chunk count places a
/// split exactly at 0 and walks outward in both directions, an odd count
/// starts the walk offset by half an interval. Each returned point carries
/// the `prefix` values for the fields before the hashed field, the computed
/// hash for the hashed field, and `MinKey` for every later field.
///
/// The pattern must have a hashed field, `prefix` must cover exactly the
/// fields before it, and `num_chunks` must be positive; those are caller
/// contracts, not recoverable errors.
pub fn calculate_hashed_split_points(
    pattern: &KeyPattern,
    prefix: &[KeyValue],
    num_chunks: usize,
) -> Vec<BoundaryKey> {
    let hashed_idx = pattern
        .hashed_field_index()
        .expect("shard key pattern has no hashed field");
    assert!(num_chunks > 0, "chunk count must be positive");
    assert_eq!(
        prefix.len(),
        hashed_idx,
        "prefix must cover exactly the fields before the hashed field"
    );

    let mut points = Vec::with_capacity(num_chunks.saturating_sub(1));
    if num_chunks == 1 {
        return points;
    }

    let build = |value: i64| {
        let mut values = prefix.to_vec();
        values.push(KeyValue::Number(value));
        values.resize(pattern.num_fields(), KeyValue::MinKey);
        BoundaryKey::new(values)
    };

    let interval = (i64::MAX / num_chunks as i64) * 2;
    let mut current: i64 = 0;

    if num_chunks % 2 == 0 {
        points.push(build(current));
        current += interval;
    } else {
        current += interval / 2;
    }

    for _ in 0..(num_chunks - 1) / 2 {
        points.push(build(current));
        points.push(build(-current));
        current += interval;
    }

    points.sort();
    points
}

/// Evenly spaced hashed chunks rotated across all shards. Selected for an
/// empty collection whose shard key has a hashed prefix and no zones.
#[derive(Debug)]
pub struct SplitPointsPolicy {
    split_points: Vec<BoundaryKey>,
    chunks_per_shard: usize,
}

impl SplitPointsPolicy {
    /// Precompute the split points. An unset chunk count defaults to two
    /// chunks per shard.
    pub fn new(pattern: &KeyPattern, num_shards: usize, num_initial_chunks: Option<usize>) -> Self {
        assert!(num_shards > 0, "at least one shard is required");
        let num_chunks = num_initial_chunks.unwrap_or(num_shards * 2);
        let split_points = calculate_hashed_split_points(pattern, &[], num_chunks);
        let chunks_per_shard = (num_chunks / num_shards).max(1);
        Self {
            split_points,
            chunks_per_shard,
        }
    }

    pub(crate) fn create_first_chunks(
        &self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let shard_ids = ctx.shuffled_shard_ids()?;
        let timestamp = ctx.clock().now();
        tracing::debug!(
            split_points = self.split_points.len(),
            chunks_per_shard = self.chunks_per_shard,
            "Generating evenly spaced hashed chunks"
        );
        Ok(chunks_from_split_points(
            request.collection_id,
            &request.key_pattern,
            timestamp,
            self.split_points.clone(),
            &shard_ids,
            self.chunks_per_shard,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FixedClusterTime, InMemoryShardCatalog, ShardEntry};
    use crate::chunk::Timestamp;
    use crate::key::KeyField;
    use crate::testing::{assert_contiguous_cover, assert_version_progression};
    use std::collections::BTreeSet;

    fn hashed_pattern() -> KeyPattern {
        KeyPattern::new(vec![KeyField::hashed("h")])
    }

    fn hash_values(points: &[BoundaryKey]) -> Vec<i64> {
        points
            .iter()
            .map(|p| match p.values()[0] {
                KeyValue::Number(n) => n,
                ref other => panic!("unexpected split point value {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_point_count_and_symmetry() {
        let pattern = hashed_pattern();
        for num_chunks in [2usize, 3, 4, 5, 8, 17] {
            let points = calculate_hashed_split_points(&pattern, &[], num_chunks);
            assert_eq!(points.len(), num_chunks - 1, "for {} chunks", num_chunks);

            let values = hash_values(&points);
            assert!(values.windows(2).all(|w| w[0] < w[1]), "points are sorted");

            // The point set equals its own negation, the zero point aside.
            let set: BTreeSet<i64> = values.iter().copied().collect();
            let negated: BTreeSet<i64> = values.iter().map(|v| -v).collect();
            assert_eq!(set, negated, "for {} chunks", num_chunks);

            // Even counts split exactly at zero; odd counts never do.
            assert_eq!(set.contains(&0), num_chunks % 2 == 0, "for {} chunks", num_chunks);
        }
    }

    #[test]
    fn test_single_chunk_yields_no_points() {
        assert!(calculate_hashed_split_points(&hashed_pattern(), &[], 1).is_empty());
    }

    #[test]
    fn test_points_carry_prefix_and_min_suffix() {
        let pattern = KeyPattern::new(vec![
            KeyField::asc("region"),
            KeyField::hashed("id"),
            KeyField::asc("ts"),
        ]);
        let prefix = [KeyValue::from("eu")];
        let points = calculate_hashed_split_points(&pattern, &prefix, 4);

        assert_eq!(points.len(), 3);
        for point in &points {
            assert_eq!(point.len(), 3);
            assert_eq!(point.values()[0], KeyValue::from("eu"));
            assert!(matches!(point.values()[1], KeyValue::Number(_)));
            assert_eq!(point.values()[2], KeyValue::MinKey);
        }
    }

    #[test]
    fn test_round_trip_assembly_yields_requested_chunks() {
        let pattern = hashed_pattern();
        let shards = [crate::catalog::ShardId::from("a"), crate::catalog::ShardId::from("b")];

        for num_chunks in [1usize, 2, 5, 8] {
            let points = calculate_hashed_split_points(&pattern, &[], num_chunks);
            let chunks = chunks_from_split_points(
                uuid::Uuid::new_v4(),
                &pattern,
                Timestamp::new(1, 0),
                points,
                &shards,
                1,
            );
            assert_eq!(chunks.len(), num_chunks);
            assert_contiguous_cover(&chunks, &pattern);
            assert_version_progression(&chunks);
        }
    }

    #[test]
    fn test_policy_defaults_to_two_chunks_per_shard() {
        let catalog = InMemoryShardCatalog::new(vec![
            ShardEntry::new("a"),
            ShardEntry::new("b"),
            ShardEntry::new("c"),
        ]);
        let clock = FixedClusterTime(Timestamp::new(10, 0));
        let ctx = PlacementContext::new(&catalog, &clock);

        let pattern = hashed_pattern();
        let request = SplitRequest::new(pattern.clone(), "a", 3);
        let policy = SplitPointsPolicy::new(&pattern, 3, None);

        let chunks = policy.create_first_chunks(&ctx, &request).unwrap();
        assert_eq!(chunks.len(), 6);
        assert_contiguous_cover(&chunks, &pattern);
        assert_version_progression(&chunks);

        // Stride of two: consecutive chunk pairs stay on one shard.
        for pair in chunks.chunks(2) {
            assert_eq!(pair[0].shard, pair[1].shard);
        }
    }
}
