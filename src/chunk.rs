//! Chunk records, version stamps, and the builder every placement strategy
//! emits through.

use crate::catalog::ShardId;
use crate::error::Result;
use crate::key::BoundaryKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A cluster timestamp: seconds since the epoch plus an ordering increment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Seconds component.
    pub secs: u64,
    /// Increment distinguishing timestamps within one second.
    pub inc: u32,
}

impl Timestamp {
    /// Create a timestamp.
    pub fn new(secs: u64, inc: u32) -> Self {
        Self { secs, inc }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.inc)
    }
}

/// Version stamp carried by every chunk.
///
/// All chunks of one placement run share the epoch, timestamp, and major
/// version; the minor version increases by exactly one per emitted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkVersion {
    /// Identity of this chunk layout generation.
    pub epoch: Uuid,
    /// Cluster timestamp the run was stamped with.
    pub timestamp: Timestamp,
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
}

impl ChunkVersion {
    /// First version of a new layout: `major.minor = 1.0`.
    pub fn initial(epoch: Uuid, timestamp: Timestamp) -> Self {
        Self {
            epoch,
            timestamp,
            major: 1,
            minor: 0,
        }
    }

    /// Advance the minor component by one.
    pub fn inc_minor(&mut self) {
        self.minor += 1;
    }
}

impl fmt::Display for ChunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.major, self.minor, self.timestamp)
    }
}

/// A half-open interval `[min, max)` over the shard-key space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// Inclusive lower bound.
    pub min: BoundaryKey,
    /// Exclusive upper bound.
    pub max: BoundaryKey,
}

impl ChunkRange {
    /// Create a range. `min` must sort strictly below `max`.
    pub fn new(min: BoundaryKey, max: BoundaryKey) -> Self {
        assert!(min < max, "chunk range min {} must be below max {}", min, max);
        Self { min, max }
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// One entry of a chunk's placement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHistory {
    /// When the chunk landed on the shard.
    pub valid_after: Timestamp,
    /// The shard it landed on.
    pub shard: ShardId,
}

/// A chunk ready for the external catalog writer: a key range, its owning
/// shard, and the version stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Collection the chunk belongs to.
    pub collection_id: Uuid,
    /// The chunk's key range.
    pub range: ChunkRange,
    /// Owning shard.
    pub shard: ShardId,
    /// Version stamp.
    pub version: ChunkVersion,
    /// When the chunk arrived on its current shard.
    pub on_current_shard_since: Timestamp,
    /// Placement history, newest first.
    pub history: Vec<ChunkHistory>,
}

impl ChunkRecord {
    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| crate::error::Error::Metadata(format!("chunk encode failed: {}", e)))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| crate::error::Error::Metadata(format!("chunk decode failed: {}", e)))
    }
}

/// Emits the chunks of one placement run, advancing the shared version's
/// minor component on every append.
#[derive(Debug)]
pub struct ChunkBuilder {
    collection_id: Uuid,
    version: ChunkVersion,
    chunks: Vec<ChunkRecord>,
}

impl ChunkBuilder {
    /// Start a run: fresh epoch, version `1.0`, the given cluster timestamp.
    pub fn new(collection_id: Uuid, timestamp: Timestamp) -> Self {
        Self {
            collection_id,
            version: ChunkVersion::initial(Uuid::new_v4(), timestamp),
            chunks: Vec::new(),
        }
    }

    /// Append a chunk `[min, max)` on `shard`, stamped with the current
    /// version, then bump the minor version.
    pub fn append(&mut self, min: BoundaryKey, max: BoundaryKey, shard: ShardId) {
        let since = self.version.timestamp;
        self.chunks.push(ChunkRecord {
            collection_id: self.collection_id,
            range: ChunkRange::new(min, max),
            shard: shard.clone(),
            version: self.version,
            on_current_shard_since: since,
            history: vec![ChunkHistory {
                valid_after: since,
                shard,
            }],
        });
        self.version.inc_minor();
    }

    /// Upper bound of the last appended chunk, if any.
    pub fn last_max(&self) -> Option<&BoundaryKey> {
        self.chunks.last().map(|c| &c.range.max)
    }

    /// Number of chunks appended so far.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Finish the run and take the chunks, in emission order.
    pub fn into_chunks(self) -> Vec<ChunkRecord> {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyField, KeyPattern, KeyValue};

    fn pattern() -> KeyPattern {
        KeyPattern::new(vec![KeyField::asc("x")])
    }

    fn key(v: i64) -> BoundaryKey {
        BoundaryKey::new(vec![KeyValue::Number(v)])
    }

    #[test]
    fn test_builder_stamps_strictly_increasing_minor_versions() {
        let ts = Timestamp::new(100, 3);
        let mut builder = ChunkBuilder::new(Uuid::new_v4(), ts);

        builder.append(pattern().global_min(), key(0), ShardId::from("a"));
        builder.append(key(0), key(10), ShardId::from("b"));
        builder.append(key(10), pattern().global_max(), ShardId::from("a"));

        let chunks = builder.into_chunks();
        assert_eq!(chunks.len(), 3);

        let epoch = chunks[0].version.epoch;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.version.epoch, epoch);
            assert_eq!(chunk.version.timestamp, ts);
            assert_eq!(chunk.version.major, 1);
            assert_eq!(chunk.version.minor, i as u32);
            assert_eq!(chunk.on_current_shard_since, ts);
            assert_eq!(chunk.history.len(), 1);
            assert_eq!(chunk.history[0].shard, chunk.shard);
        }
    }

    #[test]
    fn test_last_max_tracks_emission() {
        let mut builder = ChunkBuilder::new(Uuid::new_v4(), Timestamp::default());
        assert!(builder.last_max().is_none());

        builder.append(pattern().global_min(), key(5), ShardId::from("a"));
        assert_eq!(builder.last_max(), Some(&key(5)));
    }

    #[test]
    fn test_chunk_record_byte_roundtrip() {
        let mut builder = ChunkBuilder::new(Uuid::new_v4(), Timestamp::new(9, 1));
        builder.append(key(1), key(2), ShardId::from("rs0"));
        let chunk = builder.into_chunks().pop().unwrap();

        let bytes = chunk.to_bytes().unwrap();
        let decoded = ChunkRecord::from_bytes(&bytes).unwrap();
        assert_eq!(chunk, decoded);
    }

    #[test]
    #[should_panic(expected = "chunk range min")]
    fn test_inverted_range_is_rejected() {
        ChunkRange::new(key(5), key(1));
    }
}
