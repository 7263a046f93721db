//! Collaborator contracts: the shard catalog snapshot and the cluster time
//! source, plus in-memory implementations for embedding and tests.

use crate::chunk::Timestamp;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque shard identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    /// Create a shard id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The shard name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShardId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ShardId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One shard document from the catalog: the shard and the zones assigned
/// to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    /// The shard.
    pub id: ShardId,
    /// Zone labels assigned to the shard.
    pub zones: Vec<String>,
}

impl ShardEntry {
    /// A shard with no zone assignments.
    pub fn new(id: impl Into<ShardId>) -> Self {
        Self {
            id: id.into(),
            zones: Vec::new(),
        }
    }

    /// Assign zone labels to the shard.
    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zones = zones.into_iter().map(Into::into).collect();
        self
    }
}

/// Read access to a point-in-time snapshot of the shard catalog.
///
/// Both reads must reflect the same snapshot; the placement core never
/// retries a conflicting read. A failed read aborts the whole computation
/// and retry policy stays with the caller.
pub trait ShardCatalogReader {
    /// All shard ids, in catalog order. The core shuffles them itself.
    fn shard_ids(&self) -> Result<Vec<ShardId>>;

    /// All shard documents with their zone assignments.
    fn shards_with_zones(&self) -> Result<Vec<ShardEntry>>;
}

/// Source of the cluster timestamp used to stamp chunk versions.
///
/// Called exactly once per placement invocation.
pub trait ClusterTimeSource {
    /// The current cluster timestamp.
    fn now(&self) -> Timestamp;
}

/// In-memory shard catalog, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShardCatalog {
    entries: Vec<ShardEntry>,
}

impl InMemoryShardCatalog {
    /// Create a catalog holding the given shard documents.
    pub fn new(entries: Vec<ShardEntry>) -> Self {
        Self { entries }
    }
}

impl ShardCatalogReader for InMemoryShardCatalog {
    fn shard_ids(&self) -> Result<Vec<ShardId>> {
        Ok(self.entries.iter().map(|e| e.id.clone()).collect())
    }

    fn shards_with_zones(&self) -> Result<Vec<ShardEntry>> {
        Ok(self.entries.clone())
    }
}

/// Fixed cluster time, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClusterTime(pub Timestamp);

impl ClusterTimeSource for FixedClusterTime {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Wall-clock time source for standalone embedding, seconds since the Unix
/// epoch with a zero increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClusterTime;

impl ClusterTimeSource for SystemClusterTime {
    fn now(&self) -> Timestamp {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(elapsed.as_secs(), 0)
    }
}

/// Catalog-read failure helper shared by the directory builders.
pub(crate) fn no_shard_documents() -> Error {
    Error::Metadata("could not find any shard documents".to_string())
}
