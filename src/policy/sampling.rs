//! Sampling-based placement for collections whose shard-key cardinality
//! cannot be computed analytically.
//!
//! The strategy pulls a pre-sorted random sample of shard-key values from
//! the collection, promotes zone boundaries to mandatory split points, and
//! fills the remainder by keeping every k-th sample. Chunks are then
//! assigned greedily to the least-loaded shard eligible for their zone;
//! that is not globally optimal but guarantees zone compliance and a
//! reasonable one-shot balance.

use crate::catalog::ShardId;
use crate::chunk::{ChunkBuilder, ChunkRange, ChunkRecord};
use crate::error::{Error, Result};
use crate::key::{BoundaryKey, KeyPattern};
use crate::policy::{PlacementContext, SplitRequest};
use crate::zone::{zone_split_points, ShardZoneDirectory, ZoneIndex, ZoneRange};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Default number of samples drawn per requested chunk.
pub const DEFAULT_SAMPLES_PER_CHUNK: usize = 10;

/// Pull-based source of shard-key samples.
///
/// The stream is lazy, finite, non-restartable, and strictly sequential:
/// keys arrive in ascending key order (hashed fields already folded to
/// their hash, see [`KeyPattern::key_for_document`]), `Ok(None)` is
/// returned exactly once at exhaustion, and the source is not called again
/// after that. A cancelled operation surfaces as an error and aborts the
/// whole placement.
pub trait SampleSource {
    /// The next sample key, or `None` once the sample is exhausted.
    fn next_key(&mut self) -> Result<Option<BoundaryKey>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_key(&mut self) -> Result<Option<BoundaryKey>> {
        (**self).next_key()
    }
}

/// In-memory sample source. Sorts its input so the stream honors the
/// ascending-order contract.
#[derive(Debug, Clone)]
pub struct InMemorySampleSource {
    keys: std::vec::IntoIter<BoundaryKey>,
}

impl InMemorySampleSource {
    /// Create a source over the given sample keys.
    pub fn new(mut keys: Vec<BoundaryKey>) -> Self {
        keys.sort();
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl SampleSource for InMemorySampleSource {
    fn next_key(&mut self) -> Result<Option<BoundaryKey>> {
        Ok(self.keys.next())
    }
}

/// Adapter yielding every `skip + 1`-th key of an underlying source: after
/// pulling one key it discards `skip` more, keeping the last key available
/// when the stream runs dry mid-skip.
pub struct SkippingSampleSource<S> {
    inner: S,
    skip: usize,
    done: bool,
}

impl<S: SampleSource> SkippingSampleSource<S> {
    /// Wrap a source, discarding `skip` keys after each yielded one.
    pub fn new(inner: S, skip: usize) -> Self {
        Self {
            inner,
            skip,
            done: false,
        }
    }
}

impl<S: SampleSource> SampleSource for SkippingSampleSource<S> {
    fn next_key(&mut self) -> Result<Option<BoundaryKey>> {
        if self.done {
            return Ok(None);
        }
        let Some(mut current) = self.inner.next_key()? else {
            self.done = true;
            return Ok(None);
        };
        for _ in 0..self.skip {
            match self.inner.next_key()? {
                Some(key) => current = key,
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        Ok(Some(current))
    }
}

impl<S> fmt::Debug for SkippingSampleSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkippingSampleSource")
            .field("skip", &self.skip)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Split points sampled from the collection, chunks assigned to the
/// least-loaded eligible shard.
pub struct SamplingPolicy {
    num_chunks: usize,
    zones: Option<Vec<ZoneRange>>,
    samples: SkippingSampleSource<Box<dyn SampleSource>>,
}

impl SamplingPolicy {
    /// Create the policy over a raw, sorted sample stream. The stream
    /// should carry `num_chunks * samples_per_chunk` keys.
    pub fn new(
        num_chunks: usize,
        zones: Option<Vec<ZoneRange>>,
        samples: Box<dyn SampleSource>,
        samples_per_chunk: usize,
    ) -> Result<Self> {
        if num_chunks == 0 {
            return Err(Error::InvalidConfig(
                "num_initial_chunks should be greater than zero".to_string(),
            ));
        }
        if samples_per_chunk == 0 {
            return Err(Error::InvalidConfig(
                "samples_per_chunk should be greater than zero".to_string(),
            ));
        }
        if zones.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::InvalidConfig(
                "provided zones should not be empty".to_string(),
            ));
        }
        Ok(Self {
            num_chunks,
            zones,
            samples: SkippingSampleSource::new(samples, samples_per_chunk - 1),
        })
    }

    /// Zone boundaries first, then sampled keys until `num_chunks - 1`
    /// distinct split points exist.
    fn first_split_points(&mut self, pattern: &KeyPattern) -> Result<Vec<BoundaryKey>> {
        if let Some(zones) = self.zones.as_mut() {
            for zone in zones.iter_mut() {
                zone.min = pattern.extend_range_bound(&zone.min, false);
                zone.max = pattern.extend_range_bound(&zone.max, false);
            }
        }

        let mut points = zone_split_points(pattern, self.zones.as_deref());
        if points.len() + 1 < self.num_chunks {
            let needed = self.num_chunks - points.len() - 1;
            append_split_points_from_sample(&mut points, &mut self.samples, needed)?;
        }

        if points.len() + 1 < self.num_chunks {
            return Err(Error::InsufficientCardinality {
                requested: self.num_chunks,
                achievable: points.len() + 1,
            });
        }
        Ok(points.into_iter().collect())
    }

    pub(crate) fn create_first_chunks(
        &mut self,
        ctx: &PlacementContext<'_>,
        request: &SplitRequest,
    ) -> Result<Vec<ChunkRecord>> {
        let pattern = &request.key_pattern;
        let split_points = self.first_split_points(pattern)?;

        let zone_index = ZoneIndex::new(self.zones.as_deref().unwrap_or(&[]));
        let directory = match self.zones.as_deref() {
            Some(zones) => ShardZoneDirectory::load(ctx.catalog(), zones)?,
            None => ShardZoneDirectory::default(),
        };

        let all_shards = ctx.shuffled_shard_ids()?;
        let mut chunk_counts: BTreeMap<ShardId, usize> =
            all_shards.iter().cloned().map(|s| (s, 0)).collect();

        let timestamp = ctx.clock().now();
        let mut builder = ChunkBuilder::new(request.collection_id, timestamp);
        let mut last_max = pattern.global_min();

        for point in split_points.into_iter().chain([pattern.global_max()]) {
            let range = ChunkRange::new(last_max, point.clone());
            let shard =
                select_least_loaded_shard(&chunk_counts, &zone_index, &directory, &all_shards, &range)?;
            *chunk_counts
                .get_mut(&shard)
                .expect("every candidate shard is counted") += 1;
            builder.append(range.min, range.max, shard);
            last_max = point;
        }

        tracing::debug!(
            chunks = builder.len(),
            "Assigned sampled chunks to least-loaded shards"
        );
        Ok(builder.into_chunks())
    }
}

impl fmt::Debug for SamplingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingPolicy")
            .field("num_chunks", &self.num_chunks)
            .field("zones", &self.zones)
            .field("samples", &self.samples)
            .finish()
    }
}

/// The shard with the fewest chunks so far among those eligible for the
/// range's zone; ties go to the earliest shard in list order, and the
/// zone-less candidate list is the pre-shuffled full shard list.
fn select_least_loaded_shard(
    chunk_counts: &BTreeMap<ShardId, usize>,
    zone_index: &ZoneIndex,
    directory: &ShardZoneDirectory,
    unzoned_shards: &[ShardId],
    range: &ChunkRange,
) -> Result<ShardId> {
    let (zone, candidates) = match zone_index.zone_for_range(range) {
        Some(zone) => (
            Some(zone),
            directory.shards_for_zone(zone).unwrap_or_default(),
        ),
        None => (None, unzoned_shards),
    };
    if candidates.is_empty() {
        return Err(Error::ZoneSetup {
            zone: zone.unwrap_or_default().to_string(),
            reason: format!(
                "no shards found for the zone while creating initial chunks for range {}",
                range
            ),
        });
    }

    let best = candidates
        .iter()
        .min_by_key(|shard| chunk_counts[*shard])
        .expect("candidates are non-empty");
    Ok(best.clone())
}

fn append_split_points_from_sample(
    points: &mut BTreeSet<BoundaryKey>,
    samples: &mut dyn SampleSource,
    mut remaining: usize,
) -> Result<()> {
    // Keys arriving already hashed and sorted, duplicates collapse into
    // the set without consuming the budget.
    let mut next = samples.next_key()?;
    while remaining > 0 {
        let Some(key) = next else { break };
        if points.insert(key) {
            remaining -= 1;
        }
        next = samples.next_key()?;
    }
    Ok(())
}
