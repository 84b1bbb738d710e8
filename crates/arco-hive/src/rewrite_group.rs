//! Rewrite file groups: compaction bookkeeping carried between checkpoints.
//!
//! A group accumulates the delta manifests produced by several small commits
//! so they can later be rewritten together. Groups are persisted with a
//! versioned binary layout (all integers big-endian):
//!
//! ```text
//! group v1  := i64 latest_sequence_number
//!              i64 latest_snapshot_id
//!              i32 files_count
//!              i64 files_size
//!              i32 manifest_count
//!              manifest_count × (i32 length, versioned(delta manifests))
//! versioned := i32 version, i32 length, payload
//! ```
//!
//! Delta manifests payload v1 is JSON.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from encoding or decoding rewrite groups.
#[derive(Debug, Error)]
pub enum RewriteGroupError {
    /// The payload was written by a serializer version this build does not know.
    #[error("Unknown serialize version: {0}")]
    UnknownVersion(i32),

    /// The input ended before a field could be read.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the next field.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// A length or count field was negative.
    #[error("invalid length field: {0}")]
    InvalidLength(i32),

    /// A length does not fit the 32-bit layout.
    #[error("payload of {0} bytes exceeds the 32-bit length field")]
    TooLarge(usize),

    /// The manifests payload could not be encoded or decoded.
    #[error("manifests payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result alias for rewrite group codecs.
pub type RewriteGroupResult<T> = Result<T, RewriteGroupError>;

/// Kind of entries a manifest tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestContent {
    /// Data files.
    Data,
    /// Delete files.
    Deletes,
}

/// Reference to a written manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Manifest location.
    pub path: String,
    /// File length in bytes.
    pub length: i64,
    /// Partition spec the manifest was written with.
    pub partition_spec_id: i32,
    /// What the manifest tracks.
    pub content: ManifestContent,
    /// Snapshot that added the manifest, if committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_snapshot_id: Option<i64>,
}

/// Manifests produced by one delta commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaManifests {
    /// Manifest of added data files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_manifest: Option<ManifestFile>,
    /// Manifest of added delete files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_manifest: Option<ManifestFile>,
    /// Data files referenced by the delete files.
    #[serde(default)]
    pub referenced_data_files: Vec<String>,
}

impl DeltaManifests {
    /// Iterates the manifests that are present, data first.
    pub fn manifests(&self) -> impl Iterator<Item = &ManifestFile> {
        self.data_manifest.iter().chain(self.delete_manifest.iter())
    }

    /// Returns `true` when neither manifest is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_manifest.is_none() && self.delete_manifest.is_none()
    }
}

/// Delta manifests awaiting a combined rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteFileGroup {
    latest_sequence_number: i64,
    latest_snapshot_id: i64,
    files_count: i32,
    files_size: i64,
    manifests: Vec<DeltaManifests>,
}

impl RewriteFileGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number appended so far.
    #[must_use]
    pub const fn latest_sequence_number(&self) -> i64 {
        self.latest_sequence_number
    }

    /// Snapshot that produced [`Self::latest_sequence_number`].
    #[must_use]
    pub const fn latest_snapshot_id(&self) -> i64 {
        self.latest_snapshot_id
    }

    /// Number of data files covered.
    #[must_use]
    pub const fn files_count(&self) -> i32 {
        self.files_count
    }

    /// Total size of covered data files in bytes.
    #[must_use]
    pub const fn files_size(&self) -> i64 {
        self.files_size
    }

    /// Appended delta manifests, in append order.
    #[must_use]
    pub fn manifests(&self) -> &[DeltaManifests] {
        &self.manifests
    }

    /// Iterates every manifest file across all appended deltas.
    pub fn manifest_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.manifests.iter().flat_map(DeltaManifests::manifests)
    }

    /// Adds one commit's manifests to the group.
    ///
    /// Empty deltas are ignored. The latest sequence number and snapshot id
    /// only move forward.
    pub fn append(
        &mut self,
        files_count: i32,
        files_size: i64,
        sequence_number: i64,
        snapshot_id: i64,
        manifests: DeltaManifests,
    ) {
        if manifests.is_empty() {
            return;
        }
        if sequence_number > self.latest_sequence_number {
            self.latest_sequence_number = sequence_number;
            self.latest_snapshot_id = snapshot_id;
        }
        self.files_count = self.files_count.saturating_add(files_count);
        self.files_size = self.files_size.saturating_add(files_size);
        self.manifests.push(manifests);
    }

    /// Encodes the group with a leading version tag.
    ///
    /// # Errors
    ///
    /// Returns an error when a manifests payload cannot be encoded.
    pub fn serialize_versioned(&self) -> RewriteGroupResult<Bytes> {
        write_versioned(&RewriteFileGroupSerializer, self)
    }

    /// Decodes a group written by [`Self::serialize_versioned`].
    ///
    /// # Errors
    ///
    /// Returns [`RewriteGroupError::UnknownVersion`] for unsupported versions
    /// and [`RewriteGroupError::Truncated`] for short input.
    pub fn deserialize_versioned(data: &[u8]) -> RewriteGroupResult<Self> {
        read_versioned(&RewriteFileGroupSerializer, data)
    }
}

// ============================================================================
// Versioned serialization
// ============================================================================

/// A serializer whose output can evolve across versions.
pub trait VersionedSerializer<T> {
    /// Version written by [`Self::serialize`].
    fn version(&self) -> i32;

    /// Encodes `value` in the current version.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be encoded.
    fn serialize(&self, value: &T) -> RewriteGroupResult<Bytes>;

    /// Decodes `data` written by serializer `version`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown versions or malformed input.
    fn deserialize(&self, version: i32, data: &[u8]) -> RewriteGroupResult<T>;
}

/// Writes `i32 version, i32 length, payload`.
///
/// # Errors
///
/// Propagates serializer failures.
pub fn write_versioned<T, S: VersionedSerializer<T>>(
    serializer: &S,
    value: &T,
) -> RewriteGroupResult<Bytes> {
    let payload = serializer.serialize(value)?;
    let mut out = BytesMut::with_capacity(8 + payload.len());
    out.put_i32(serializer.version());
    out.put_i32(length_field(payload.len())?);
    out.put_slice(&payload);
    Ok(out.freeze())
}

/// Reads data written by [`write_versioned`].
///
/// # Errors
///
/// Returns an error for truncated input or serializer failures.
pub fn read_versioned<T, S: VersionedSerializer<T>>(
    serializer: &S,
    mut data: &[u8],
) -> RewriteGroupResult<T> {
    let version = read_i32(&mut data)?;
    let payload = read_block(&mut data)?;
    serializer.deserialize(version, payload)
}

/// JSON codec for [`DeltaManifests`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaManifestsSerializer;

impl VersionedSerializer<DeltaManifests> for DeltaManifestsSerializer {
    fn version(&self) -> i32 {
        1
    }

    fn serialize(&self, value: &DeltaManifests) -> RewriteGroupResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(&self, version: i32, data: &[u8]) -> RewriteGroupResult<DeltaManifests> {
        match version {
            1 => Ok(serde_json::from_slice(data)?),
            other => Err(RewriteGroupError::UnknownVersion(other)),
        }
    }
}

/// Binary codec for [`RewriteFileGroup`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteFileGroupSerializer;

impl VersionedSerializer<RewriteFileGroup> for RewriteFileGroupSerializer {
    fn version(&self) -> i32 {
        1
    }

    fn serialize(&self, group: &RewriteFileGroup) -> RewriteGroupResult<Bytes> {
        let mut out = BytesMut::new();
        out.put_i64(group.latest_sequence_number);
        out.put_i64(group.latest_snapshot_id);
        out.put_i32(group.files_count);
        out.put_i64(group.files_size);
        out.put_i32(length_field(group.manifests.len())?);
        for manifests in &group.manifests {
            let data = write_versioned(&DeltaManifestsSerializer, manifests)?;
            out.put_i32(length_field(data.len())?);
            out.put_slice(&data);
        }
        Ok(out.freeze())
    }

    fn deserialize(&self, version: i32, data: &[u8]) -> RewriteGroupResult<RewriteFileGroup> {
        if version != 1 {
            return Err(RewriteGroupError::UnknownVersion(version));
        }

        let mut data = data;
        let latest_sequence_number = read_i64(&mut data)?;
        let latest_snapshot_id = read_i64(&mut data)?;
        let files_count = read_i32(&mut data)?;
        let files_size = read_i64(&mut data)?;
        let count = read_len(&mut data)?;

        // Each manifest needs at least its 4-byte length prefix.
        let mut manifests = Vec::with_capacity(count.min(data.len() / 4));
        for _ in 0..count {
            let block = read_block(&mut data)?;
            manifests.push(read_versioned(&DeltaManifestsSerializer, block)?);
        }

        Ok(RewriteFileGroup {
            latest_sequence_number,
            latest_snapshot_id,
            files_count,
            files_size,
            manifests,
        })
    }
}

fn length_field(len: usize) -> RewriteGroupResult<i32> {
    i32::try_from(len).map_err(|_| RewriteGroupError::TooLarge(len))
}

fn ensure(data: &[u8], needed: usize) -> RewriteGroupResult<()> {
    if data.remaining() < needed {
        return Err(RewriteGroupError::Truncated {
            needed,
            remaining: data.remaining(),
        });
    }
    Ok(())
}

fn read_i32(data: &mut &[u8]) -> RewriteGroupResult<i32> {
    ensure(data, 4)?;
    Ok(data.get_i32())
}

fn read_i64(data: &mut &[u8]) -> RewriteGroupResult<i64> {
    ensure(data, 8)?;
    Ok(data.get_i64())
}

fn read_len(data: &mut &[u8]) -> RewriteGroupResult<usize> {
    let raw = read_i32(data)?;
    usize::try_from(raw).map_err(|_| RewriteGroupError::InvalidLength(raw))
}

fn read_block<'a>(data: &mut &'a [u8]) -> RewriteGroupResult<&'a [u8]> {
    let len = read_len(data)?;
    let input: &'a [u8] = *data;
    ensure(input, len)?;
    let (block, rest) = input.split_at(len);
    *data = rest;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manifest(path: &str, content: ManifestContent) -> ManifestFile {
        ManifestFile {
            path: path.to_string(),
            length: 4096,
            partition_spec_id: 0,
            content,
            added_snapshot_id: None,
        }
    }

    fn delta(data: &str) -> DeltaManifests {
        DeltaManifests {
            data_manifest: Some(manifest(data, ManifestContent::Data)),
            delete_manifest: None,
            referenced_data_files: Vec::new(),
        }
    }

    #[test]
    fn test_append_ignores_empty_and_tracks_latest() {
        let mut group = RewriteFileGroup::new();
        group.append(3, 300, 5, 50, delta("m1.avro"));
        group.append(9, 900, 7, 70, DeltaManifests::default());
        group.append(2, 200, 4, 40, delta("m2.avro"));

        assert_eq!(group.files_count(), 5);
        assert_eq!(group.files_size(), 500);
        assert_eq!(group.latest_sequence_number(), 5);
        assert_eq!(group.latest_snapshot_id(), 50);
        let paths: Vec<&str> = group.manifest_files().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["m1.avro", "m2.avro"]);
    }

    #[test]
    fn test_layout_is_big_endian_with_version_prefix() {
        let mut group = RewriteFileGroup::new();
        group.append(1, 10, 2, 3, delta("m.avro"));

        let bytes = group.serialize_versioned().expect("serialize");
        let mut cursor = &bytes[..];
        assert_eq!(cursor.get_i32(), 1, "outer version");
        let body_len = usize::try_from(cursor.get_i32()).expect("len");
        assert_eq!(body_len, cursor.len());
        assert_eq!(cursor.get_i64(), 2);
        assert_eq!(cursor.get_i64(), 3);
        assert_eq!(cursor.get_i32(), 1);
        assert_eq!(cursor.get_i64(), 10);
        assert_eq!(cursor.get_i32(), 1, "manifest count");
        let block_len = usize::try_from(cursor.get_i32()).expect("block len");
        assert_eq!(block_len, cursor.len());
        assert_eq!(cursor.get_i32(), 1, "delta manifests version");
    }

    #[test]
    fn test_unknown_versions_are_rejected() {
        let mut outer = BytesMut::new();
        outer.put_i32(2);
        outer.put_i32(0);
        let err = RewriteFileGroup::deserialize_versioned(&outer).expect_err("v2");
        assert!(matches!(err, RewriteGroupError::UnknownVersion(2)));
        assert_eq!(err.to_string(), "Unknown serialize version: 2");

        let err = DeltaManifestsSerializer
            .deserialize(0, b"{}")
            .expect_err("v0");
        assert!(matches!(err, RewriteGroupError::UnknownVersion(0)));
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut group = RewriteFileGroup::new();
        group.append(1, 10, 2, 3, delta("m.avro"));
        let bytes = group.serialize_versioned().expect("serialize");

        for cut in [0, 3, 8, 20, bytes.len() - 1] {
            let err = RewriteFileGroup::deserialize_versioned(&bytes[..cut]).expect_err("short");
            assert!(
                matches!(err, RewriteGroupError::Truncated { .. }),
                "cut at {cut}: {err}"
            );
        }
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut body = BytesMut::new();
        body.put_i64(0);
        body.put_i64(0);
        body.put_i32(0);
        body.put_i64(0);
        body.put_i32(-1);
        let err = RewriteFileGroupSerializer
            .deserialize(1, &body)
            .expect_err("negative");
        assert!(matches!(err, RewriteGroupError::InvalidLength(-1)));
    }

    proptest! {
        #[test]
        fn prop_decode_restores_group(
            entries in proptest::collection::vec((0_i32..100, 0_i64..1 << 40, 0_i64..1000, any::<i64>()), 0..8),
        ) {
            let mut group = RewriteFileGroup::new();
            for (i, (count, size, seq, snapshot)) in entries.into_iter().enumerate() {
                group.append(count, size, seq, snapshot, delta(&format!("m{i}.avro")));
            }
            let bytes = group.serialize_versioned().expect("serialize");
            let decoded = RewriteFileGroup::deserialize_versioned(&bytes).expect("deserialize");
            prop_assert_eq!(decoded, group);
        }
    }
}
