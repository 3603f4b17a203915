use crate::FileErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// A file or directory found under one comparison root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Unix mode bits (`0o7777` mask); synthesized from the read-only flag elsewhere.
    pub permissions: u32,
    pub is_dir: bool,
}

/// SHA-256 digest (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Whether a file looked like text or binary when it was hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Text,
    Binary,
}

/// Status of a path in a content comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonStatus {
    /// Same size and same digest on both sides
    Identical,
    /// Present on both sides with different size or digest
    Modified,
    /// Present only on the right side
    Added,
    /// Present only on the left side
    Removed,
    /// Walking or hashing this path failed
    Error,
}

/// One classified path in a content comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub relative_path: PathBuf,
    pub status: ComparisonStatus,
    pub left: Option<FileEntry>,
    pub right: Option<FileEntry>,
    pub left_hash: Option<Sha256Digest>,
    pub right_hash: Option<Sha256Digest>,
    /// Set when both sides were hashed; `Binary` if either side is binary.
    pub content_kind: Option<ContentKind>,
    pub error: Option<EntryError>,
}

impl ComparisonEntry {
    pub fn added(entry: FileEntry) -> Self {
        Self::one_sided(ComparisonStatus::Added, None, Some(entry))
    }

    pub fn removed(entry: FileEntry) -> Self {
        Self::one_sided(ComparisonStatus::Removed, Some(entry), None)
    }

    fn one_sided(status: ComparisonStatus, left: Option<FileEntry>, right: Option<FileEntry>) -> Self {
        let relative_path = left
            .as_ref()
            .or(right.as_ref())
            .map(|e| e.relative_path.clone())
            .unwrap_or_default();
        Self {
            relative_path,
            status,
            left,
            right,
            left_hash: None,
            right_hash: None,
            content_kind: None,
            error: None,
        }
    }

    pub fn failed(
        relative_path: PathBuf,
        left: Option<FileEntry>,
        right: Option<FileEntry>,
        error: EntryError,
    ) -> Self {
        Self {
            relative_path,
            status: ComparisonStatus::Error,
            left,
            right,
            left_hash: None,
            right_hash: None,
            content_kind: None,
            error: Some(error),
        }
    }

    /// Both sides exist and their permission bits disagree.
    ///
    /// Such entries are still classified by content only.
    pub fn permissions_differ(&self) -> bool {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => l.permissions != r.permissions,
            _ => false,
        }
    }

    /// A line diff can be produced for this entry on request.
    pub fn is_diffable(&self) -> bool {
        self.status == ComparisonStatus::Modified && self.content_kind != Some(ContentKind::Binary)
    }
}

/// Which side of the comparison a failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// A per-path failure recorded instead of aborting the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub side: Side,
    pub kind: FileErrorKind,
    pub message: String,
}

/// A per-entry failure met while walking one root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkError {
    pub relative_path: PathBuf,
    pub kind: FileErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub identical: usize,
    pub modified: usize,
    pub added: usize,
    pub removed: usize,
    pub errors: usize,
}

impl ComparisonSummary {
    pub fn from_entries(entries: &[ComparisonEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.status {
                ComparisonStatus::Identical => summary.identical += 1,
                ComparisonStatus::Modified => summary.modified += 1,
                ComparisonStatus::Added => summary.added += 1,
                ComparisonStatus::Removed => summary.removed += 1,
                ComparisonStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.identical + self.modified + self.added + self.removed + self.errors
    }

    pub fn differences(&self) -> usize {
        self.modified + self.added + self.removed
    }
}

/// How a run ended, for callers that need to tell the cases apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    CompletedWithErrors(usize),
    Cancelled,
}

/// Result of a content comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub run_id: RunId,
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    /// Sorted by relative path
    pub entries: Vec<ComparisonEntry>,
    pub summary: ComparisonSummary,
    /// Number of candidate paths known when classification started
    pub total_candidates: usize,
    pub cancelled: bool,
    /// At least one root stopped early at `max_files`
    pub partial: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ComparisonResult {
    pub fn outcome(&self) -> RunOutcome {
        if self.cancelled {
            RunOutcome::Cancelled
        } else if self.summary.errors > 0 {
            RunOutcome::CompletedWithErrors(self.summary.errors)
        } else {
            RunOutcome::Completed
        }
    }

    pub fn entry(&self, relative_path: impl AsRef<std::path::Path>) -> Option<&ComparisonEntry> {
        let relative_path = relative_path.as_ref();
        self.entries
            .binary_search_by(|e| e.relative_path.as_path().cmp(relative_path))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn with_status(&self, status: ComparisonStatus) -> impl Iterator<Item = &ComparisonEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }
}

/// Status of a directory in a structure comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureStatus {
    /// Directory exists only on the right side
    Added,
    /// Directory exists only on the left side
    Removed,
    Common,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub relative_path: PathBuf,
    pub status: StructureStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub added: usize,
    pub removed: usize,
    pub common: usize,
}

impl StructureSummary {
    pub fn from_entries(entries: &[StructureEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.status {
                StructureStatus::Added => summary.added += 1,
                StructureStatus::Removed => summary.removed += 1,
                StructureStatus::Common => summary.common += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.common
    }
}

/// Result of a structure-only comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureResult {
    pub run_id: RunId,
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    /// Sorted by relative path
    pub entries: Vec<StructureEntry>,
    pub summary: StructureSummary,
    pub total_candidates: usize,
    pub left_errors: Vec<WalkError>,
    pub right_errors: Vec<WalkError>,
    pub cancelled: bool,
    pub partial: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StructureResult {
    pub fn outcome(&self) -> RunOutcome {
        let errors = self.left_errors.len() + self.right_errors.len();
        if self.cancelled {
            RunOutcome::Cancelled
        } else if errors > 0 {
            RunOutcome::CompletedWithErrors(errors)
        } else {
            RunOutcome::Completed
        }
    }

    pub fn status_of(&self, relative_path: impl AsRef<std::path::Path>) -> Option<StructureStatus> {
        let relative_path = relative_path.as_ref();
        self.entries
            .iter()
            .find(|e| e.relative_path == relative_path)
            .map(|e| e.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    Scanning,
    Comparing,
}

/// Immutable progress notification handed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: ProgressPhase,
    pub processed: usize,
    pub total: usize,
    pub current_path: PathBuf,
}

/// Identifier of one comparison run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, permissions: u32) -> FileEntry {
        FileEntry {
            relative_path: PathBuf::from(path),
            absolute_path: PathBuf::from("/root").join(path),
            size: 1,
            modified: SystemTime::UNIX_EPOCH,
            permissions,
            is_dir: false,
        }
    }

    #[test]
    fn test_one_sided_constructors() {
        let added = ComparisonEntry::added(entry("b.txt", 0o644));
        assert_eq!(added.status, ComparisonStatus::Added);
        assert!(added.left.is_none());
        assert_eq!(added.relative_path, PathBuf::from("b.txt"));

        let removed = ComparisonEntry::removed(entry("a.txt", 0o644));
        assert_eq!(removed.status, ComparisonStatus::Removed);
        assert!(removed.right.is_none());
    }

    #[test]
    fn test_permissions_differ() {
        let mut e = ComparisonEntry::added(entry("x", 0o644));
        assert!(!e.permissions_differ());
        e.left = Some(entry("x", 0o600));
        assert!(e.permissions_differ());
    }

    #[test]
    fn test_summary_counts() {
        let entries = vec![
            ComparisonEntry::added(entry("a", 0)),
            ComparisonEntry::added(entry("b", 0)),
            ComparisonEntry::removed(entry("c", 0)),
        ];
        let summary = ComparisonSummary::from_entries(&entries);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.differences(), 3);
    }

    #[test]
    fn test_digest_hex() {
        let digest = Sha256Digest([0xab; 32]);
        assert_eq!(digest.to_hex().len(), 64);
        assert!(digest.to_string().starts_with("abab"));
    }
}
