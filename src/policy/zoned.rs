//! Zone-driven placement: one chunk per zone range, or hashed presplitting
//! inside each zone.
//!
//! Both strategies share the same walk over the zones in key order. Gaps
//! between zones (and before the first / after the last one) become "hole"
//! chunks handed out round-robin over the full shuffled shard list; the
//! zone ranges themselves are split according to the concrete strategy's
//! [`SplitInfo`].

use crate::catalog::{ShardCatalogReader, ShardId};
use crate::chunk::{ChunkBuilder, ChunkRecord};
use crate::error::{Error, Result};
use crate::key::{BoundaryKey, KeyPattern};
use crate::policy::hashed::calculate_hashed_split_points;
use crate::policy::{PlacementContext, SplitRequest};
use crate::zone::{ShardZoneDirectory, ZoneRange};
use std::collections::HashMap;

/// Output of a per-zone split computation: the ordered split points inside
/// the zone and how many of the resulting chunks land on each shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitInfo {
    /// Split points strictly inside the zone range, ascending.
    pub split_points: Vec<BoundaryKey>,
    /// `(shard, chunk count)` pairs consumed in order. Counts must sum to
    /// `split_points.len() + 1`.
    pub chunk_distribution: Vec<(ShardId, usize)>,
}

/// How one zone is split; the seam between the shared walk and the two
/// concrete strategies.
trait ZoneSplitter {
    fn split_info_for_zone(
        &mut self,
        zone: &ZoneRange,
        pattern: &KeyPattern,
        directory: &ShardZoneDirectory,
    ) -> SplitInfo;
}

/// Extend zone bounds to the full pattern width and order them by lower
/// bound, so the walk sees full-width, key-ordered ranges.
pub(crate) fn normalize_zones(pattern: &KeyPattern, mut zones: Vec<ZoneRange>) -> Vec<ZoneRange> {
    for zone in &mut zones {
        zone.min = pattern.extend_range_bound(&zone.min, false);
        zone.max = pattern.extend_range_bound(&zone.max, false);
    }
    zones.sort_by(|a, b| a.min.cmp(&b.min));
    zones
}

fn create_zone_chunks(
    ctx: &PlacementContext<'_>,
    request: &SplitRequest,
    zones: &[ZoneRange],
    directory: &ShardZoneDirectory,
    splitter: &mut dyn ZoneSplitter,
) -> Result<Vec<ChunkRecord>> {
    assert!(!zones.is_empty(), "zone walk requires at least one zone");

    let pattern = &request.key_pattern;
    let shard_ids = ctx.shuffled_shard_ids()?;
    let timestamp = ctx.clock().now();

    let mut builder = ChunkBuilder::new(request.collection_id, timestamp);
    let mut hole_index = 0usize;
    let mut next_hole_shard = || {
        let shard = shard_ids[hole_index % shard_ids.len()].clone();
        hole_index += 1;
        shard
    };

    let mut last_max = pattern.global_min();
    for zone in zones {
        // Chunk for the hole [last_max, zone.min), if the gap is non-empty.
        if zone.min > last_max {
            let shard = next_hole_shard();
            builder.append(last_max.clone(), zone.min.clone(), shard);
        }

        let shards = directory
            .shards_for_zone(&zone.zone)
            .expect("directory covers every requested zone");
        if shards.is_empty() {
            return Err(Error::ZoneSetup {
                zone: zone.zone.clone(),
                reason: "not assigned to any shard; assign the zone to a shard first".to_string(),
            });
        }

        let info = splitter.split_info_for_zone(zone, pattern, directory);

        // The walk emits one chunk more than there are split points; the
        // distribution must account for exactly that many.
        let total: usize = info.chunk_distribution.iter().map(|(_, n)| n).sum();
        assert_eq!(
            info.split_points.len() + 1,
            total,
            "split points do not match the chunk distribution"
        );

        let mut idx = 0usize;
        for (shard, count) in info.chunk_distribution {
            for _ in 0..count {
                let min = if idx == 0 {
                    zone.min.clone()
                } else {
                    info.split_points[idx - 1].clone()
                };
                let max = if idx == info.split_points.len() {
                    zone.max.clone()
                } else {
                    info.split_points[idx].clone()
                };
                builder.append(min, max, shard.clone());
                idx += 1;
            }
        }

        last_max = zone.max.clone();
    }

    // Chunk for the hole [last_max, global_max), if any key space remains.
    if last_max < pattern.global_max() {
        let shard = next_hole_shard();
        builder.append(last_max, pattern.global_max(), shard);
    }

    Ok(builder.into_chunks())
}

/// One chunk per zone range on a shard chosen round-robin among the zone's
/// shards, plus hole chunks for uncovered key space. Selected for an empty
/// collection with zones and no presplit flag.
#[derive(Debug)]
pub struct SingleChunkPerZonePolicy {
    zones: Vec<ZoneRange>,
    directory: ShardZoneDirectory,
    next_shard_index: HashMap<String, usize>,
}

impl SingleChunkPerZonePolicy {
    /// Build the zone directory from one catalog read.
    pub fn new(
        catalog: &dyn ShardCatalogReader,
        pattern: &KeyPattern,
        zones: Vec<ZoneRange>,
    ) -> Result<Self> {
        let directory = ShardZoneDirectory::load(catalog, &zones)?;
        Ok(Self {
            zones: normalize_zones(pattern, zones),
            directory,
            next_shard_index: HashMap::new(),
        })
    }

    pub(crate) fn create_first_chunks(
        &mut self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let Self {
            zones,
            directory,
            next_shard_index,
        } = self;
        let mut splitter = RoundRobinSplitter { next_shard_index };
        create_zone_chunks(ctx, request, zones, directory, &mut splitter)
    }
}

struct RoundRobinSplitter<'a> {
    /// Rotation slot per zone label; a label may own several ranges.
    next_shard_index: &'a mut HashMap<String, usize>,
}

impl ZoneSplitter for RoundRobinSplitter<'_> {
    fn split_info_for_zone(
        &mut self,
        zone: &ZoneRange,
        _pattern: &KeyPattern,
        directory: &ShardZoneDirectory,
    ) -> SplitInfo {
        let shards = directory
            .shards_for_zone(&zone.zone)
            .expect("directory covers every requested zone");
        let slot = self.next_shard_index.entry(zone.zone.clone()).or_insert(0);
        let shard = shards[*slot % shards.len()].clone();
        *slot += 1;

        // No split points: the zone becomes one chunk on the chosen shard.
        SplitInfo {
            split_points: Vec::new(),
            chunk_distribution: vec![(shard, 1)],
        }
    }
}

/// Hashed presplitting inside zones: each zone is carved into evenly
/// spaced hash intervals with at least one chunk on every shard hosting
/// it. Selected whenever the presplit flag is set, so that its validation
/// produces the diagnostic for bad requests.
#[derive(Debug)]
pub struct PresplitHashedZonesPolicy {
    zones: Vec<ZoneRange>,
    directory: ShardZoneDirectory,
    /// Number of requested zone ranges each shard hosts.
    zone_count_by_shard: HashMap<ShardId, usize>,
    num_chunks: usize,
}

impl PresplitHashedZonesPolicy {
    /// Build the zone directory and validate the zone setup for hashed
    /// presplitting. An unset chunk count defaults to two chunks per shard
    /// hosting zones.
    pub fn new(
        catalog: &dyn ShardCatalogReader,
        pattern: &KeyPattern,
        zones: Vec<ZoneRange>,
        num_initial_chunks: Option<usize>,
        collection_is_empty: bool,
    ) -> Result<Self> {
        let directory = ShardZoneDirectory::load(catalog, &zones)?;
        let zones = normalize_zones(pattern, zones);
        validate_presplit_zones(pattern, &zones, collection_is_empty)?;

        let mut zone_count_by_shard: HashMap<ShardId, usize> = HashMap::new();
        for zone in &zones {
            let shards = directory
                .shards_for_zone(&zone.zone)
                .expect("directory covers every requested zone");
            for shard in shards {
                *zone_count_by_shard.entry(shard.clone()).or_insert(0) += 1;
            }
        }
        if zone_count_by_shard.is_empty() {
            return Err(Error::ZoneSetup {
                zone: zones[0].zone.clone(),
                reason: "not assigned to any shard; assign the zone to a shard first".to_string(),
            });
        }

        let num_chunks = num_initial_chunks.unwrap_or(zone_count_by_shard.len() * 2);
        Ok(Self {
            zones,
            directory,
            zone_count_by_shard,
            num_chunks,
        })
    }

    pub(crate) fn create_first_chunks(
        &mut self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let Self {
            zones,
            directory,
            zone_count_by_shard,
            num_chunks,
        } = self;
        let mut splitter = PresplitSplitter {
            num_chunks: *num_chunks,
            zone_count_by_shard,
        };
        create_zone_chunks(ctx, request, zones, directory, &mut splitter)
    }
}

struct PresplitSplitter<'a> {
    num_chunks: usize,
    zone_count_by_shard: &'a HashMap<ShardId, usize>,
}

impl ZoneSplitter for PresplitSplitter<'_> {
    fn split_info_for_zone(
        &mut self,
        zone: &ZoneRange,
        pattern: &KeyPattern,
        directory: &ShardZoneDirectory,
    ) -> SplitInfo {
        // Rounding up on both levels keeps the cluster-wide total at or
        // above the requested chunk count and gives every shard hosting
        // the zone at least one chunk.
        let chunks_per_shard = ceil_div(self.num_chunks, self.zone_count_by_shard.len());

        let shards = directory
            .shards_for_zone(&zone.zone)
            .expect("directory covers every requested zone");
        let mut chunk_distribution = Vec::with_capacity(shards.len());
        let mut num_chunks_for_zone = 0usize;
        for shard in shards {
            let quota = ceil_div(chunks_per_shard, self.zone_count_by_shard[shard]);
            chunk_distribution.push((shard.clone(), quota));
            num_chunks_for_zone += quota;
        }

        let hashed_idx = pattern.hashed_field_index().expect("pattern is hashed");
        let prefix = &zone.min.values()[..hashed_idx];
        SplitInfo {
            split_points: calculate_hashed_split_points(pattern, prefix, num_chunks_for_zone),
            chunk_distribution,
        }
    }
}

fn ceil_div(x: usize, y: usize) -> usize {
    x / y + usize::from(x % y != 0)
}

/// Structural rules a zone must satisfy for hashed presplitting.
///
/// With a hashed prefix the only supported setup is a single zone covering
/// the whole key range. Otherwise, for every zone: the lower-bound fields
/// before the hashed field must be concrete values (no sentinels), at
/// least one of them must differ from its upper-bound counterpart, and the
/// hashed field plus everything after it must be `MinKey` in the lower
/// bound.
fn validate_presplit_zones(
    pattern: &KeyPattern,
    zones: &[ZoneRange],
    collection_is_empty: bool,
) -> Result<()> {
    if !collection_is_empty || zones.is_empty() || !pattern.is_hashed() {
        return Err(Error::InvalidConfig(
            "presplit_hashed_zones is only supported when the collection is empty, zones are \
             set up, and the shard key pattern has a hashed field"
                .to_string(),
        ));
    }

    if pattern.has_hashed_prefix() {
        let covers_everything = zones.len() == 1
            && zones[0].min == pattern.global_min()
            && zones[0].max == pattern.global_max();
        if !covers_everything {
            return Err(Error::InvalidConfig(
                "for hashed-prefix shard keys, presplit_hashed_zones is only supported with a \
                 single zone covering the entire shard key range"
                    .to_string(),
            ));
        }
        return Ok(());
    }

    let hashed_idx = pattern.hashed_field_index().expect("pattern is hashed");
    for zone in zones {
        let min = zone.min.values();
        let max = zone.max.values();

        let mut prefix_differs = false;
        for idx in 0..hashed_idx {
            if min[idx].is_min() || min[idx].is_max() {
                return Err(Error::ZoneSetup {
                    zone: zone.zone.clone(),
                    reason: "lower-bound fields preceding the hashed field must not be MinKey \
                             or MaxKey"
                        .to_string(),
                });
            }
            prefix_differs = prefix_differs || min[idx] != max[idx];
        }
        if !prefix_differs {
            return Err(Error::ZoneSetup {
                zone: zone.zone.clone(),
                reason: "the bound fields preceding the hashed field must differ between the \
                         lower and upper bound"
                    .to_string(),
            });
        }
        if !min[hashed_idx].is_min() {
            return Err(Error::ZoneSetup {
                zone: zone.zone.clone(),
                reason: "the hashed field of the lower bound must be MinKey".to_string(),
            });
        }
        for value in &min[hashed_idx + 1..] {
            if !value.is_min() {
                return Err(Error::ZoneSetup {
                    zone: zone.zone.clone(),
                    reason: "fields after the hashed field must be MinKey in the lower bound"
                        .to_string(),
                });
            }
        }
    }
    Ok(())
}
