//! Initial chunk placement for sharded collections.
//!
//! Given a shard-key pattern, optional zone definitions, and a target
//! chunk count, this crate computes the first chunk layout of a newly
//! sharded collection: an ordered, non-overlapping partitioning of the
//! key space into chunk ranges, each assigned to a shard and stamped with
//! a monotonically increasing version. Persisting the chunks and routing
//! traffic are the surrounding system's concern; this crate only decides
//! where the cuts go and who gets each piece.
//!
//! # Example
//!
//! ```rust
//! use presplit::{
//!     create_first_chunks, FixedClusterTime, InMemoryShardCatalog, KeyField, KeyPattern,
//!     PlacementContext, ShardEntry, SplitRequest, Timestamp,
//! };
//!
//! # fn main() -> presplit::Result<()> {
//! let catalog = InMemoryShardCatalog::new(vec![
//!     ShardEntry::new("shard-a"),
//!     ShardEntry::new("shard-b"),
//! ]);
//! let clock = FixedClusterTime(Timestamp::new(1_700_000_000, 1));
//! let ctx = PlacementContext::new(&catalog, &clock);
//!
//! // An empty collection with a hashed shard key: four evenly spaced
//! // hash-range chunks rotated across both shards.
//! let pattern = KeyPattern::new(vec![KeyField::hashed("user_id")]);
//! let request = SplitRequest::new(pattern, "shard-a", 2).with_num_initial_chunks(4);
//!
//! let chunks = create_first_chunks(&ctx, request)?;
//! assert_eq!(chunks.len(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! # Strategy selection
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SplitRequest                         │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//!       shard distribution supplied ───► ShardDistribution
//!       sample source supplied ────────► Sampling
//!       presplit flag set ─────────────► PresplitHashedZones
//!       hashed prefix, empty, no zones ► SplitPoints
//!       zones, empty collection ───────► SingleChunkPerZone
//!       otherwise ─────────────────────► SingleChunkOnPrimary
//! ```
//!
//! Every strategy produces the same shape of result: a contiguous chunk
//! sequence covering `[global_min, global_max)` exactly once, minor
//! versions increasing by one per chunk.
//!
//! # Collaborators
//!
//! The placement core is a synchronous, single-pass computation. Its only
//! external touchpoints are the [`ShardCatalogReader`] snapshot (read
//! once per invocation), the [`ClusterTimeSource`] (read exactly once),
//! and, for the sampling strategy, a pull-based [`SampleSource`] stream.

pub mod catalog;
pub mod chunk;
pub mod error;
pub mod key;
pub mod policy;
pub mod testing;
pub mod zone;

// Re-export the main types for convenience.
pub use catalog::{
    ClusterTimeSource, FixedClusterTime, InMemoryShardCatalog, ShardCatalogReader, ShardEntry,
    ShardId, SystemClusterTime,
};
pub use chunk::{ChunkBuilder, ChunkHistory, ChunkRange, ChunkRecord, ChunkVersion, Timestamp};
pub use error::{Error, Result};
pub use key::{BoundaryKey, FieldSpec, KeyField, KeyPattern, KeyValue};
pub use policy::{
    calculate_hashed_split_points, create_first_chunks, InMemorySampleSource, PlacementContext,
    PresplitHashedZonesPolicy, SampleSource, SamplingPolicy, ShardDistributionPolicy,
    ShardKeyRange, SingleChunkOnPrimaryPolicy, SingleChunkPerZonePolicy, SkippingSampleSource,
    SplitInfo, SplitPointsPolicy, SplitPolicy, SplitRequest, DEFAULT_SAMPLES_PER_CHUNK,
};
pub use zone::{ShardZoneDirectory, ZoneIndex, ZoneRange};
