//! Placement strategies and their selection.
//!
//! Five strategies sit behind the closed [`SplitPolicy`] enum:
//!
//! - [`SingleChunkOnPrimaryPolicy`] — the whole key space as one chunk on
//!   the primary shard.
//! - [`SplitPointsPolicy`] — evenly spaced hashed chunks for an empty
//!   collection with a hashed key prefix and no zones.
//! - [`SingleChunkPerZonePolicy`] and [`PresplitHashedZonesPolicy`] — the
//!   zone-driven family.
//! - [`SamplingPolicy`] — split points sampled from the collection when
//!   cardinality cannot be computed analytically.
//! - [`ShardDistributionPolicy`] — an operator-mandated shard-to-range
//!   mapping.
//!
//! [`create_first_chunks`] is the single entry point: it selects a
//! strategy from the request and runs it, yielding the ordered chunk
//! layout for the external catalog writer.

pub mod distribution;
pub mod hashed;
pub mod sampling;
pub mod zoned;

pub use distribution::{ShardDistributionPolicy, ShardKeyRange};
pub use hashed::{calculate_hashed_split_points, SplitPointsPolicy};
pub use sampling::{
    InMemorySampleSource, SampleSource, SamplingPolicy, SkippingSampleSource,
    DEFAULT_SAMPLES_PER_CHUNK,
};
pub use zoned::{PresplitHashedZonesPolicy, SingleChunkPerZonePolicy, SplitInfo};

use crate::catalog::{ClusterTimeSource, ShardCatalogReader, ShardId};
use crate::chunk::{ChunkBuilder, ChunkRecord, Timestamp};
use crate::error::{Error, Result};
use crate::key::{BoundaryKey, KeyPattern};
use crate::zone::ZoneRange;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Collaborators and run-wide knobs for one placement invocation.
///
/// The shuffle seed drives the randomized shard rotation; runs with the
/// same seed and inputs produce identical layouts.
pub struct PlacementContext<'a> {
    catalog: &'a dyn ShardCatalogReader,
    clock: &'a dyn ClusterTimeSource,
    shuffle_seed: u64,
}

impl<'a> PlacementContext<'a> {
    /// Create a context over the given collaborators, with seed 0.
    pub fn new(catalog: &'a dyn ShardCatalogReader, clock: &'a dyn ClusterTimeSource) -> Self {
        Self {
            catalog,
            clock,
            shuffle_seed: 0,
        }
    }

    /// Set the shard shuffle seed.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// The shard catalog snapshot.
    pub fn catalog(&self) -> &dyn ShardCatalogReader {
        self.catalog
    }

    /// The cluster time source.
    pub fn clock(&self) -> &dyn ClusterTimeSource {
        self.clock
    }

    /// All shard ids, shuffled with the context's seed.
    pub(crate) fn shuffled_shard_ids(&self) -> Result<Vec<ShardId>> {
        let mut shard_ids = self.catalog.shard_ids()?;
        if shard_ids.is_empty() {
            return Err(Error::Metadata("shard catalog returned no shards".to_string()));
        }
        let mut rng = StdRng::seed_from_u64(self.shuffle_seed);
        shard_ids.shuffle(&mut rng);
        Ok(shard_ids)
    }
}

impl fmt::Debug for PlacementContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementContext")
            .field("shuffle_seed", &self.shuffle_seed)
            .finish_non_exhaustive()
    }
}

/// Everything one placement invocation needs to know about the collection
/// being sharded.
pub struct SplitRequest {
    /// The collection's shard key.
    pub key_pattern: KeyPattern,
    /// Identity of the collection.
    pub collection_id: Uuid,
    /// The collection's primary shard.
    pub primary_shard: ShardId,
    /// Number of shards in the cluster.
    pub num_shards: usize,
    /// Zone definitions, possibly empty.
    pub zones: Vec<ZoneRange>,
    /// Operator-mandated shard-to-range mapping, if any.
    pub shard_distribution: Option<Vec<ShardKeyRange>>,
    /// Sorted shard-key sample stream, if placement should be derived by
    /// sampling.
    pub sample_source: Option<Box<dyn SampleSource>>,
    /// Requested initial chunk count, if any.
    pub num_initial_chunks: Option<usize>,
    /// Samples drawn per chunk on the sampling path.
    pub samples_per_chunk: usize,
    /// Whether to presplit hashed zones.
    pub presplit_hashed_zones: bool,
    /// Whether the collection currently holds no documents.
    pub collection_is_empty: bool,
}

impl SplitRequest {
    /// Create a request for an empty collection with no zones, a fresh
    /// collection id, and default sampling density.
    pub fn new(
        key_pattern: KeyPattern,
        primary_shard: impl Into<ShardId>,
        num_shards: usize,
    ) -> Self {
        Self {
            key_pattern,
            collection_id: Uuid::new_v4(),
            primary_shard: primary_shard.into(),
            num_shards,
            zones: Vec::new(),
            shard_distribution: None,
            sample_source: None,
            num_initial_chunks: None,
            samples_per_chunk: DEFAULT_SAMPLES_PER_CHUNK,
            presplit_hashed_zones: false,
            collection_is_empty: true,
        }
    }

    /// Set the collection id.
    pub fn with_collection_id(mut self, id: Uuid) -> Self {
        self.collection_id = id;
        self
    }

    /// Set the zone definitions.
    pub fn with_zones(mut self, zones: Vec<ZoneRange>) -> Self {
        self.zones = zones;
        self
    }

    /// Set an operator-mandated shard distribution.
    pub fn with_shard_distribution(mut self, distribution: Vec<ShardKeyRange>) -> Self {
        self.shard_distribution = Some(distribution);
        self
    }

    /// Derive placement from a sorted shard-key sample stream.
    pub fn with_sample_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.sample_source = Some(source);
        self
    }

    /// Set the requested initial chunk count.
    pub fn with_num_initial_chunks(mut self, num_chunks: usize) -> Self {
        self.num_initial_chunks = Some(num_chunks);
        self
    }

    /// Set the number of samples drawn per chunk.
    pub fn with_samples_per_chunk(mut self, samples_per_chunk: usize) -> Self {
        self.samples_per_chunk = samples_per_chunk;
        self
    }

    /// Enable presplitting of hashed zones.
    pub fn with_presplit_hashed_zones(mut self, presplit: bool) -> Self {
        self.presplit_hashed_zones = presplit;
        self
    }

    /// Record whether the collection holds documents already.
    pub fn with_collection_empty(mut self, empty: bool) -> Self {
        self.collection_is_empty = empty;
        self
    }
}

impl fmt::Debug for SplitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitRequest")
            .field("key_pattern", &self.key_pattern)
            .field("collection_id", &self.collection_id)
            .field("primary_shard", &self.primary_shard)
            .field("num_shards", &self.num_shards)
            .field("zones", &self.zones)
            .field("shard_distribution", &self.shard_distribution)
            .field("has_sample_source", &self.sample_source.is_some())
            .field("num_initial_chunks", &self.num_initial_chunks)
            .field("samples_per_chunk", &self.samples_per_chunk)
            .field("presplit_hashed_zones", &self.presplit_hashed_zones)
            .field("collection_is_empty", &self.collection_is_empty)
            .finish()
    }
}

/// The whole key space as one chunk on the primary shard.
#[derive(Debug, Default)]
pub struct SingleChunkOnPrimaryPolicy;

impl SingleChunkOnPrimaryPolicy {
    pub(crate) fn create_first_chunks(
        &self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let timestamp = ctx.clock().now();
        let pattern = &request.key_pattern;
        let mut builder = ChunkBuilder::new(request.collection_id, timestamp);
        builder.append(
            pattern.global_min(),
            pattern.global_max(),
            request.primary_shard.clone(),
        );
        Ok(builder.into_chunks())
    }
}

/// The closed strategy family. Obtain one through [`SplitPolicy::select`]
/// (or build a concrete policy directly) and run it with
/// [`SplitPolicy::create_first_chunks`].
#[derive(Debug)]
pub enum SplitPolicy {
    /// One chunk on the primary shard.
    SingleChunkOnPrimary(SingleChunkOnPrimaryPolicy),
    /// Evenly spaced hashed chunks.
    SplitPoints(SplitPointsPolicy),
    /// One chunk per zone range.
    SingleChunkPerZone(SingleChunkPerZonePolicy),
    /// Hashed presplitting inside zones.
    PresplitHashedZones(PresplitHashedZonesPolicy),
    /// Split points sampled from the collection.
    Sampling(SamplingPolicy),
    /// Operator-specified shard-to-range mapping.
    ShardDistribution(ShardDistributionPolicy),
}

impl SplitPolicy {
    /// Pick the strategy for a request, first match wins:
    ///
    /// 1. A supplied shard distribution, then a supplied sample source,
    ///    each with its own validation.
    /// 2. Request validation: a chunk count needs an empty collection and
    ///    a hashed key, and additionally the presplit flag when the hashed
    ///    field is not the first component.
    /// 3. The presplit flag, unconditionally, so its stricter validation
    ///    produces the diagnostic.
    /// 4. Hashed prefix, no zones, empty collection: evenly spaced hashed
    ///    chunks.
    /// 5. Zones: one chunk per zone when empty; a single chunk on the
    ///    primary shard when the collection has data (zones are not
    ///    applied retroactively).
    /// 6. Otherwise a single chunk on the primary shard.
    ///
    /// Takes the sample source and shard distribution out of the request
    /// when the corresponding strategy is chosen.
    pub fn select(ctx: &PlacementContext<'_>, request: &mut SplitRequest) -> Result<Self> {
        if let Some(distribution) = request.shard_distribution.take() {
            let zones = zones_if_any(&request.zones);
            return ShardDistributionPolicy::new(distribution, zones)
                .map(Self::ShardDistribution);
        }

        if let Some(samples) = request.sample_source.take() {
            let num_chunks = request.num_initial_chunks.unwrap_or(request.num_shards);
            let zones = zones_if_any(&request.zones);
            return SamplingPolicy::new(num_chunks, zones, samples, request.samples_per_chunk)
                .map(Self::Sampling);
        }

        let pattern = &request.key_pattern;

        if let Some(num_chunks) = request.num_initial_chunks {
            if num_chunks == 0 {
                return Err(Error::InvalidConfig(
                    "num_initial_chunks must be greater than zero".to_string(),
                ));
            }
            if !(pattern.is_hashed() && request.collection_is_empty) {
                return Err(Error::InvalidConfig(
                    "num_initial_chunks is only supported when the collection is empty and has \
                     a hashed field in the shard key pattern"
                        .to_string(),
                ));
            }
            if !pattern.has_hashed_prefix() && !request.presplit_hashed_zones {
                return Err(Error::InvalidConfig(
                    "when the prefix of the hashed shard key is a range field, \
                     num_initial_chunks can only be used when presplit_hashed_zones is set"
                        .to_string(),
                ));
            }
        }

        if request.presplit_hashed_zones {
            return PresplitHashedZonesPolicy::new(
                ctx.catalog(),
                pattern,
                request.zones.clone(),
                request.num_initial_chunks,
                request.collection_is_empty,
            )
            .map(Self::PresplitHashedZones);
        }

        if request.zones.is_empty() && pattern.has_hashed_prefix() && request.collection_is_empty {
            return Ok(Self::SplitPoints(SplitPointsPolicy::new(
                pattern,
                request.num_shards,
                request.num_initial_chunks,
            )));
        }

        if !request.zones.is_empty() {
            if request.collection_is_empty {
                return SingleChunkPerZonePolicy::new(
                    ctx.catalog(),
                    pattern,
                    request.zones.clone(),
                )
                .map(Self::SingleChunkPerZone);
            }
            tracing::debug!(
                zones = request.zones.len(),
                "Zones are defined but the collection has data; creating a single chunk on the \
                 primary shard"
            );
        }

        Ok(Self::SingleChunkOnPrimary(SingleChunkOnPrimaryPolicy))
    }

    /// Run the strategy, yielding the ordered chunk layout.
    pub fn create_first_chunks(
        &mut self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        match self {
            Self::SingleChunkOnPrimary(p) => p.create_first_chunks(ctx, request),
            Self::SplitPoints(p) => p.create_first_chunks(ctx, request),
            Self::SingleChunkPerZone(p) => p.create_first_chunks(ctx, request),
            Self::PresplitHashedZones(p) => p.create_first_chunks(ctx, request),
            Self::Sampling(p) => p.create_first_chunks(ctx, request),
            Self::ShardDistribution(p) => p.create_first_chunks(ctx, request),
        }
    }

    /// Strategy name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleChunkOnPrimary(_) => "single_chunk_on_primary",
            Self::SplitPoints(_) => "split_points",
            Self::SingleChunkPerZone(_) => "single_chunk_per_zone",
            Self::PresplitHashedZones(_) => "presplit_hashed_zones",
            Self::Sampling(_) => "sampling",
            Self::ShardDistribution(_) => "shard_distribution",
        }
    }
}

fn zones_if_any(zones: &[ZoneRange]) -> Option<Vec<ZoneRange>> {
    (!zones.is_empty()).then(|| zones.to_vec())
}

/// Select the strategy for `request` and run it.
///
/// This is the one entry point of the crate: the returned chunks are
/// contiguous, non-overlapping, cover the whole key space exactly once,
/// and carry strictly increasing minor versions in emission order.
pub fn create_first_chunks(
    ctx: &PlacementContext<'_>,
    mut request: SplitRequest,
) -> Result<Vec<ChunkRecord>> {
    let mut policy = SplitPolicy::select(ctx, &mut request)?;
    tracing::info!(policy = policy.name(), "Selected initial split policy");

    let chunks = policy.create_first_chunks(ctx, &request)?;
    tracing::info!(
        policy = policy.name(),
        chunks = chunks.len(),
        "Created initial chunk layout"
    );
    Ok(chunks)
}

/// Assemble a contiguous chunk sequence from split points: the points are
/// deduplicated and sorted (duplicates collapse silently), chunk `i` spans
/// `(points[i-1] | global_min, points[i] | global_max)`, and its shard is
/// `shards[(i / chunks_per_shard) % shards.len()]`.
pub(crate) fn chunks_from_split_points(
    collection_id: Uuid,
    pattern: &KeyPattern,
    timestamp: Timestamp,
    split_points: impl IntoIterator<Item = BoundaryKey>,
    shards: &[ShardId],
    chunks_per_shard: usize,
) -> Vec<ChunkRecord> {
    assert!(!shards.is_empty(), "no shards to place chunks on");
    assert!(chunks_per_shard > 0, "chunk stride must be positive");

    let points: Vec<BoundaryKey> = split_points
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut builder = ChunkBuilder::new(collection_id, timestamp);
    for i in 0..=points.len() {
        let min = if i == 0 {
            pattern.global_min()
        } else {
            points[i - 1].clone()
        };
        let max = if i < points.len() {
            points[i].clone()
        } else {
            pattern.global_max()
        };
        let shard = shards[(i / chunks_per_shard) % shards.len()].clone();
        builder.append(min, max, shard);
    }
    builder.into_chunks()
}
