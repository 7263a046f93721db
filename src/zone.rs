//! Zone (key-range label) definitions and their resolution to shards.
//!
//! A zone pins a key range to the set of shards carrying its label. The
//! [`ZoneIndex`] answers "which zone fully contains this chunk range"; the
//! [`ShardZoneDirectory`] holds both directions of the zone/shard mapping,
//! built once per invocation from a catalog snapshot and immutable after
//! that.

use crate::catalog::{no_shard_documents, ShardCatalogReader, ShardId};
use crate::chunk::ChunkRange;
use crate::error::Result;
use crate::key::{BoundaryKey, KeyPattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A zone: a label plus the half-open key range `[min, max)` it pins.
///
/// Zones handed to the placement core never overlap; the command layer
/// validates that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRange {
    /// Zone label. Several ranges may carry the same label.
    pub zone: String,
    /// Inclusive lower bound.
    pub min: BoundaryKey,
    /// Exclusive upper bound.
    pub max: BoundaryKey,
}

impl ZoneRange {
    /// Create a zone range.
    pub fn new(zone: impl Into<String>, min: BoundaryKey, max: BoundaryKey) -> Self {
        Self {
            zone: zone.into(),
            min,
            max,
        }
    }
}

/// Range-to-zone lookup over a set of non-overlapping zone ranges.
#[derive(Debug, Clone, Default)]
pub struct ZoneIndex {
    /// Zone ranges keyed by lower bound.
    ranges: BTreeMap<BoundaryKey, ZoneRange>,
}

impl ZoneIndex {
    /// Build the index from zone ranges.
    pub fn new(zones: &[ZoneRange]) -> Self {
        let ranges = zones
            .iter()
            .map(|z| (z.min.clone(), z.clone()))
            .collect();
        Self { ranges }
    }

    /// The zone whose range fully contains `range`, if any. A range that
    /// only partially overlaps a zone, or spans several, belongs to none.
    pub fn zone_for_range(&self, range: &ChunkRange) -> Option<&str> {
        let (_, zone) = self.ranges.range(..=range.min.clone()).next_back()?;
        (range.min >= zone.min && range.max <= zone.max).then_some(zone.zone.as_str())
    }
}

/// Both directions of the zone/shard mapping, from one catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct ShardZoneDirectory {
    zone_to_shards: HashMap<String, Vec<ShardId>>,
    shard_to_zones: HashMap<ShardId, HashSet<String>>,
}

impl ShardZoneDirectory {
    /// Build the directory for the given zones by reading the shard
    /// catalog once. With no zones there is nothing to resolve and no
    /// catalog read happens.
    pub fn load(catalog: &dyn ShardCatalogReader, zones: &[ZoneRange]) -> Result<Self> {
        let mut directory = Self::default();
        if zones.is_empty() {
            return Ok(directory);
        }

        for zone in zones {
            directory
                .zone_to_shards
                .entry(zone.zone.clone())
                .or_default();
        }

        let shard_docs = catalog.shards_with_zones()?;
        if shard_docs.is_empty() {
            return Err(no_shard_documents());
        }

        for doc in shard_docs {
            let zone_set = directory.shard_to_zones.entry(doc.id.clone()).or_default();
            for label in doc.zones {
                directory
                    .zone_to_shards
                    .entry(label.clone())
                    .or_default()
                    .push(doc.id.clone());
                zone_set.insert(label);
            }
        }

        Ok(directory)
    }

    /// Shards hosting a zone label, in catalog order. `None` for a label
    /// the directory was not built for.
    pub fn shards_for_zone(&self, zone: &str) -> Option<&[ShardId]> {
        self.zone_to_shards.get(zone).map(Vec::as_slice)
    }

    /// Zone labels assigned to a shard.
    pub fn zones_for_shard(&self, shard: &ShardId) -> Option<&HashSet<String>> {
        self.shard_to_zones.get(shard)
    }
}

/// Mandatory split points implied by zone boundaries: every zone bound
/// except the global sentinels, deduplicated and ordered.
pub(crate) fn zone_split_points(
    pattern: &KeyPattern,
    zones: Option<&[ZoneRange]>,
) -> BTreeSet<BoundaryKey> {
    let mut points = BTreeSet::new();
    let Some(zones) = zones else {
        return points;
    };

    for zone in zones {
        points.insert(zone.min.clone());
        points.insert(zone.max.clone());
    }
    points.remove(&pattern.global_min());
    points.remove(&pattern.global_max());
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryShardCatalog, ShardEntry};
    use crate::key::{KeyField, KeyValue};

    fn key(v: i64) -> BoundaryKey {
        BoundaryKey::new(vec![KeyValue::Number(v)])
    }

    fn pattern() -> KeyPattern {
        KeyPattern::new(vec![KeyField::asc("x")])
    }

    #[test]
    fn test_zone_index_full_containment() {
        let index = ZoneIndex::new(&[
            ZoneRange::new("cold", key(0), key(10)),
            ZoneRange::new("hot", key(20), key(30)),
        ]);

        // Fully inside a zone.
        assert_eq!(
            index.zone_for_range(&ChunkRange::new(key(2), key(5))),
            Some("cold")
        );
        // Exactly the zone range.
        assert_eq!(
            index.zone_for_range(&ChunkRange::new(key(20), key(30))),
            Some("hot")
        );
        // In the gap between zones.
        assert_eq!(index.zone_for_range(&ChunkRange::new(key(12), key(15))), None);
        // Straddling a zone edge.
        assert_eq!(index.zone_for_range(&ChunkRange::new(key(5), key(15))), None);
        // Below every zone.
        assert_eq!(
            index.zone_for_range(&ChunkRange::new(pattern().global_min(), key(0))),
            None
        );
    }

    #[test]
    fn test_directory_resolves_both_directions() {
        let catalog = InMemoryShardCatalog::new(vec![
            ShardEntry::new("a").with_zones(["east", "west"]),
            ShardEntry::new("b").with_zones(["east"]),
            ShardEntry::new("c"),
        ]);
        let zones = [ZoneRange::new("east", key(0), key(10))];

        let directory = ShardZoneDirectory::load(&catalog, &zones).unwrap();

        assert_eq!(
            directory.shards_for_zone("east").unwrap(),
            &[ShardId::from("a"), ShardId::from("b")]
        );
        // Labels carried by shards are resolvable even when no requested
        // zone uses them.
        assert_eq!(directory.shards_for_zone("west").unwrap(), &[ShardId::from("a")]);
        assert!(directory.shards_for_zone("north").is_none());

        assert!(directory
            .zones_for_shard(&ShardId::from("a"))
            .unwrap()
            .contains("west"));
        assert!(directory
            .zones_for_shard(&ShardId::from("c"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_directory_requires_shard_documents() {
        let catalog = InMemoryShardCatalog::default();
        let zones = [ZoneRange::new("east", key(0), key(10))];
        assert!(ShardZoneDirectory::load(&catalog, &zones).is_err());

        // No zones: nothing to resolve, empty catalog is fine.
        assert!(ShardZoneDirectory::load(&catalog, &[]).is_ok());
    }

    #[test]
    fn test_zone_split_points_drop_global_sentinels() {
        let pattern = pattern();
        let zones = [
            ZoneRange::new("a", pattern.global_min(), key(10)),
            ZoneRange::new("b", key(10), key(20)),
            ZoneRange::new("c", key(30), pattern.global_max()),
        ];

        let points = zone_split_points(&pattern, Some(&zones));
        let expected: Vec<BoundaryKey> = vec![key(10), key(20), key(30)];
        assert_eq!(points.into_iter().collect::<Vec<_>>(), expected);

        assert!(zone_split_points(&pattern, None).is_empty());
    }
}
