//! Placement from an operator-specified shard distribution: an ordered,
//! contiguous, gapless sequence of `(shard, min, max)` ranges covering the
//! whole key space, optionally cross-checked against zones.

use crate::catalog::{ShardCatalogReader, ShardId};
use crate::chunk::{ChunkBuilder, ChunkRecord};
use crate::error::{Error, Result};
use crate::key::{BoundaryKey, KeyPattern};
use crate::policy::{PlacementContext, SplitRequest};
use crate::zone::{zone_split_points, ShardZoneDirectory, ZoneIndex, ZoneRange};
use serde::{Deserialize, Serialize};

/// One operator-mandated partition: a shard and the key range it must own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardKeyRange {
    /// The shard owning the range.
    pub shard: ShardId,
    /// Inclusive lower bound.
    pub min: Option<BoundaryKey>,
    /// Exclusive upper bound.
    pub max: Option<BoundaryKey>,
}

impl ShardKeyRange {
    /// A range for `shard` with no bounds yet.
    pub fn new(shard: impl Into<ShardId>) -> Self {
        Self {
            shard: shard.into(),
            min: None,
            max: None,
        }
    }

    /// Set the lower bound.
    pub fn with_min(mut self, min: BoundaryKey) -> Self {
        self.min = Some(min);
        self
    }

    /// Set the upper bound.
    pub fn with_max(mut self, max: BoundaryKey) -> Self {
        self.max = Some(max);
        self
    }
}

/// Chunks carved from the operator's shard distribution, split further at
/// zone boundaries. Selected whenever a shard distribution is supplied.
#[derive(Debug)]
pub struct ShardDistributionPolicy {
    distribution: Vec<ShardKeyRange>,
    zones: Option<Vec<ZoneRange>>,
}

impl ShardDistributionPolicy {
    /// Create the policy. The distribution must be non-empty; contiguity
    /// and completeness are validated by the command layer upstream.
    pub fn new(
        distribution: Vec<ShardKeyRange>,
        zones: Option<Vec<ZoneRange>>,
    ) -> Result<Self> {
        if distribution.is_empty() {
            return Err(Error::InvalidConfig(
                "shard distribution should not be empty".to_string(),
            ));
        }
        Ok(Self {
            distribution,
            zones,
        })
    }

    pub(crate) fn create_first_chunks(
        &mut self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let pattern = &request.key_pattern;
        if let Some(zones) = self.zones.as_mut() {
            for zone in zones.iter_mut() {
                zone.min = pattern.extend_range_bound(&zone.min, false);
                zone.max = pattern.extend_range_bound(&zone.max, false);
            }
        }

        let split_points = zone_split_points(pattern, self.zones.as_deref());

        let first = self
            .distribution
            .first()
            .expect("constructor rejects an empty distribution");
        if first.min.is_none() {
            return Err(Error::InvalidConfig(
                "shard distribution without explicit min/max bounds is not supported".to_string(),
            ));
        }

        let timestamp = ctx.clock().now();
        let mut builder = ChunkBuilder::new(request.collection_id, timestamp);
        let mut idx = 0usize;
        for point in &split_points {
            self.append_chunks_up_to(pattern, point, &mut idx, &mut builder)?;
        }
        self.append_chunks_up_to(pattern, &pattern.global_max(), &mut idx, &mut builder)?;

        let chunks = builder.into_chunks();
        if let Some(zones) = self.zones.as_deref() {
            check_shards_match_zones(ctx.catalog(), &chunks, zones)?;
        }

        tracing::debug!(
            chunks = chunks.len(),
            ranges = self.distribution.len(),
            "Created chunks from the operator shard distribution"
        );
        Ok(chunks)
    }

    /// Emit chunks up to `split_point`, resuming at distribution entry
    /// `idx`. A defined shard range is either entirely left of the split
    /// point (emit it whole and advance), split by it (emit up to the
    /// point and resume here next time), or entirely right of it (stop).
    /// Relies on the distribution being contiguous and complete.
    fn append_chunks_up_to(
        &self,
        pattern: &KeyPattern,
        split_point: &BoundaryKey,
        idx: &mut usize,
        builder: &mut ChunkBuilder,
    ) -> Result<()> {
        while *idx < self.distribution.len() {
            let entry = &self.distribution[*idx];
            let (min, max) = entry_bounds(entry)?;
            let shard_min = pattern.extend_range_bound(min, false);
            let shard_max = pattern.extend_range_bound(max, false);
            let last_max = builder
                .last_max()
                .cloned()
                .unwrap_or_else(|| pattern.global_min());

            if shard_min >= *split_point {
                return Ok(());
            }
            if shard_max <= *split_point {
                builder.append(last_max, shard_max, entry.shard.clone());
                *idx += 1;
            } else {
                builder.append(last_max, split_point.clone(), entry.shard.clone());
                return Ok(());
            }
        }
        Ok(())
    }
}

fn entry_bounds(entry: &ShardKeyRange) -> Result<(&BoundaryKey, &BoundaryKey)> {
    match (&entry.min, &entry.max) {
        (Some(min), Some(max)) => Ok((min, max)),
        _ => Err(Error::InvalidConfig(
            "shard distribution without explicit min/max bounds is not supported".to_string(),
        )),
    }
}

/// Every chunk must lie inside a zone its owning shard is assigned to.
fn check_shards_match_zones(
    catalog: &dyn ShardCatalogReader,
    chunks: &[ChunkRecord],
    zones: &[ZoneRange],
) -> Result<()> {
    let index = ZoneIndex::new(zones);
    let directory = ShardZoneDirectory::load(catalog, zones)?;

    for chunk in chunks {
        match index.zone_for_range(&chunk.range) {
            Some(zone) => {
                let assigned = directory
                    .zones_for_shard(&chunk.shard)
                    .is_some_and(|set| set.contains(zone));
                if !assigned {
                    return Err(Error::InvalidConfig(format!(
                        "specified zones and shard distribution are conflicting: shard {} does \
                         not belong to zone {}",
                        chunk.shard, zone
                    )));
                }
            }
            None => {
                return Err(Error::InvalidConfig(format!(
                    "specified zones and shard distribution are conflicting: chunk {} is not \
                     covered by any zone",
                    chunk.range
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FixedClusterTime, InMemoryShardCatalog, ShardEntry};
    use crate::chunk::Timestamp;
    use crate::key::{KeyField, KeyValue};
    use crate::testing::{assert_contiguous_cover, assert_version_progression};

    fn key(v: i64) -> BoundaryKey {
        BoundaryKey::new(vec![KeyValue::Number(v)])
    }

    fn pattern() -> KeyPattern {
        KeyPattern::new(vec![KeyField::asc("x")])
    }

    fn clock() -> FixedClusterTime {
        FixedClusterTime(Timestamp::new(70, 0))
    }

    fn three_shard_distribution(pattern: &KeyPattern) -> Vec<ShardKeyRange> {
        vec![
            ShardKeyRange::new("a")
                .with_min(pattern.global_min())
                .with_max(key(5)),
            ShardKeyRange::new("b").with_min(key(5)).with_max(key(10)),
            ShardKeyRange::new("c")
                .with_min(key(10))
                .with_max(pattern.global_max()),
        ]
    }

    #[test]
    fn test_zone_split_point_inside_a_shard_range() {
        let catalog = InMemoryShardCatalog::new(vec![
            ShardEntry::new("a").with_zones(["low"]),
            ShardEntry::new("b").with_zones(["low", "high"]),
            ShardEntry::new("c").with_zones(["high"]),
        ]);
        let clock = clock();
        let ctx = PlacementContext::new(&catalog, &clock);
        let pattern = pattern();

        let zones = vec![
            ZoneRange::new("low", pattern.global_min(), key(7)),
            ZoneRange::new("high", key(7), pattern.global_max()),
        ];
        let mut policy =
            ShardDistributionPolicy::new(three_shard_distribution(&pattern), Some(zones)).unwrap();

        let request = SplitRequest::new(pattern.clone(), "a", 3);
        let chunks = policy.create_first_chunks(&ctx, &request).unwrap();

        assert_eq!(chunks.len(), 4);
        assert_contiguous_cover(&chunks, &pattern);
        assert_version_progression(&chunks);

        let expected = [
            (pattern.global_min(), key(5), ShardId::from("a")),
            (key(5), key(7), ShardId::from("b")),
            (key(7), key(10), ShardId::from("b")),
            (key(10), pattern.global_max(), ShardId::from("c")),
        ];
        for (chunk, (min, max, shard)) in chunks.iter().zip(expected) {
            assert_eq!(chunk.range.min, min);
            assert_eq!(chunk.range.max, max);
            assert_eq!(chunk.shard, shard);
        }
    }

    #[test]
    fn test_without_zones_each_range_is_one_chunk() {
        let catalog = InMemoryShardCatalog::new(vec![
            ShardEntry::new("a"),
            ShardEntry::new("b"),
            ShardEntry::new("c"),
        ]);
        let clock = clock();
        let ctx = PlacementContext::new(&catalog, &clock);
        let pattern = pattern();

        let mut policy =
            ShardDistributionPolicy::new(three_shard_distribution(&pattern), None).unwrap();
        let request = SplitRequest::new(pattern.clone(), "a", 3);
        let chunks = policy.create_first_chunks(&ctx, &request).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_contiguous_cover(&chunks, &pattern);
        assert_eq!(chunks[0].shard, ShardId::from("a"));
        assert_eq!(chunks[1].shard, ShardId::from("b"));
        assert_eq!(chunks[2].shard, ShardId::from("c"));
    }

    #[test]
    fn test_empty_distribution_is_rejected() {
        assert!(matches!(
            ShardDistributionPolicy::new(Vec::new(), None),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_bounds_are_rejected() {
        let catalog = InMemoryShardCatalog::new(vec![ShardEntry::new("a")]);
        let clock = clock();
        let ctx = PlacementContext::new(&catalog, &clock);
        let pattern = pattern();

        let mut policy =
            ShardDistributionPolicy::new(vec![ShardKeyRange::new("a")], None).unwrap();
        let request = SplitRequest::new(pattern, "a", 1);
        let err = policy.create_first_chunks(&ctx, &request).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zone_shard_mismatch_names_shard_and_zone() {
        // Shard "a" owns the whole range but the only zone belongs to "b".
        let catalog = InMemoryShardCatalog::new(vec![
            ShardEntry::new("a"),
            ShardEntry::new("b").with_zones(["pinned"]),
        ]);
        let clock = clock();
        let ctx = PlacementContext::new(&catalog, &clock);
        let pattern = pattern();

        let distribution = vec![ShardKeyRange::new("a")
            .with_min(pattern.global_min())
            .with_max(pattern.global_max())];
        let zones = vec![ZoneRange::new(
            "pinned",
            pattern.global_min(),
            pattern.global_max(),
        )];
        let mut policy = ShardDistributionPolicy::new(distribution, Some(zones)).unwrap();

        let request = SplitRequest::new(pattern, "a", 2);
        let err = policy.create_first_chunks(&ctx, &request).unwrap_err();
        match err {
            Error::InvalidConfig(msg) => {
                assert!(msg.contains("shard a"), "message names the shard: {}", msg);
                assert!(msg.contains("zone pinned"), "message names the zone: {}", msg);
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_chunk_outside_every_zone_is_rejected() {
        let catalog = InMemoryShardCatalog::new(vec![ShardEntry::new("a").with_zones(["pinned"])]);
        let clock = clock();
        let ctx = PlacementContext::new(&catalog, &clock);
        let pattern = pattern();

        let distribution = vec![ShardKeyRange::new("a")
            .with_min(pattern.global_min())
            .with_max(pattern.global_max())];
        // The zone leaves [20, max) uncovered.
        let zones = vec![ZoneRange::new("pinned", pattern.global_min(), key(20))];
        let mut policy = ShardDistributionPolicy::new(distribution, Some(zones)).unwrap();

        let request = SplitRequest::new(pattern, "a", 1);
        assert!(matches!(
            policy.create_first_chunks(&ctx, &request),
            Err(Error::InvalidConfig(_))
        ));
    }
}
