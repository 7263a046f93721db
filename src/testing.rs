//! Test support: layout assertions shared by the strategy tests.

use crate::chunk::ChunkRecord;
use crate::key::KeyPattern;

/// Assert the chunks are contiguous, non-overlapping, and cover the whole
/// key space `[global_min, global_max)` exactly once.
pub fn assert_contiguous_cover(chunks: &[ChunkRecord], pattern: &KeyPattern) {
    assert!(!chunks.is_empty(), "no chunks were produced");
    assert_eq!(
        chunks.first().unwrap().range.min,
        pattern.global_min(),
        "the first chunk starts at the global minimum"
    );
    assert_eq!(
        chunks.last().unwrap().range.max,
        pattern.global_max(),
        "the last chunk ends at the global maximum"
    );
    for pair in chunks.windows(2) {
        assert_eq!(
            pair[0].range.max, pair[1].range.min,
            "chunk {} is not contiguous with chunk {}",
            pair[0].range, pair[1].range
        );
    }
}

/// Assert all chunks share one epoch, timestamp, and major version, and
/// that minor versions increase by exactly one in emission order.
pub fn assert_version_progression(chunks: &[ChunkRecord]) {
    assert!(!chunks.is_empty(), "no chunks were produced");
    let first = &chunks[0].version;
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.version.epoch, first.epoch, "epoch differs");
        assert_eq!(chunk.version.timestamp, first.timestamp, "timestamp differs");
        assert_eq!(chunk.version.major, first.major, "major version differs");
        assert_eq!(
            chunk.version.minor,
            first.minor + i as u32,
            "minor versions do not increase by one"
        );
        assert_eq!(
            chunk.on_current_shard_since, chunk.version.timestamp,
            "on_current_shard_since is stamped from the version timestamp"
        );
    }
}
