use crate::hasher::{FileDigest, HashEngine, HashOutcome};
use crate::progress::{announce, NoProgress, ProgressObserver, ProgressTracker};
use crate::scanner::{check_root, DirectoryWalker, Inventory, WalkMode};
use chrono::Utc;
use drivediff_common::{
    CancellationToken, ComparisonEntry, ComparisonResult, ComparisonStatus, ComparisonSummary,
    ContentKind, DriveDiffError, EntryError, FileEntry, FileErrorKind, ProgressPhase, RunId,
    ScanConfiguration, Side, WalkError,
};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, info_span};

/// Same-size pair whose contents must be hashed to classify
#[derive(Debug)]
struct HashTask {
    relative_path: PathBuf,
    left: FileEntry,
    right: FileEntry,
}

/// Content comparison of two directory trees
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    config: ScanConfiguration,
    walker: DirectoryWalker,
    hasher: HashEngine,
}

impl ComparisonEngine {
    /// Validate the configuration and compile its patterns.
    pub fn new(config: ScanConfiguration) -> Result<Self, DriveDiffError> {
        config.validate()?;
        let walker = DirectoryWalker::new(&config, WalkMode::Files)?;
        let hasher = HashEngine::new(config.performance.hash_chunk_size);
        Ok(Self {
            config,
            walker,
            hasher,
        })
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    pub fn compare(&self, left_root: &Path, right_root: &Path) -> Result<ComparisonResult, DriveDiffError> {
        self.compare_with(left_root, right_root, &NoProgress, &CancellationToken::new())
    }

    /// Compare two roots, reporting progress and honoring cancellation.
    ///
    /// Per-file failures become `Error` entries. Only an unusable root or a
    /// worker pool that cannot be built fails the whole run.
    pub fn compare_with(
        &self,
        left_root: &Path,
        right_root: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<ComparisonResult, DriveDiffError> {
        let run_id = RunId::new();
        let span = info_span!("compare", run_id = %run_id);
        let _enter = span.enter();
        let started_at = Utc::now();

        info!("Comparing {} with {}", left_root.display(), right_root.display());

        let workers = self.config.performance.worker_threads;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("drivediff-hash-{}", i))
            .build()
            .map_err(|e| DriveDiffError::Pool(e.to_string()))?;

        announce(observer, ProgressPhase::Scanning, 0, left_root);
        let (mut left, mut right) = walk_both(&self.walker, left_root, right_root, cancel)?;
        for (side, inventory) in [("Left", &left), ("Right", &right)] {
            let summary = inventory.summary();
            debug!(
                "{} tree: {} files, {} bytes, {} unreadable",
                side, summary.files, summary.total_size, summary.errors
            );
        }

        let (mut entries, tasks) = plan(&mut left, &mut right);
        let total = entries.len() + tasks.len();
        let scheduled = tasks.len();
        debug!("{} entries classified without hashing, {} to hash", entries.len(), scheduled);

        announce(observer, ProgressPhase::Comparing, total, left_root);
        let tracker = ProgressTracker::new(observer, ProgressPhase::Comparing, total);
        for entry in &entries {
            tracker.advance(&entry.relative_path);
        }

        let hashed: Vec<ComparisonEntry> = pool.install(|| {
            tasks
                .into_par_iter()
                .filter_map(|task| self.hash_pair(task, cancel, &tracker))
                .collect()
        });
        let skipped = scheduled - hashed.len();

        entries.extend(hashed);
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let summary = ComparisonSummary::from_entries(&entries);
        let cancelled = left.cancelled || right.cancelled || skipped > 0;
        if cancelled {
            info!("Comparison cancelled after {} of {} entries", entries.len(), total);
        }
        info!(
            "Comparison finished: {} identical, {} modified, {} added, {} removed, {} errors",
            summary.identical, summary.modified, summary.added, summary.removed, summary.errors
        );

        Ok(ComparisonResult {
            run_id,
            left_root: left_root.to_path_buf(),
            right_root: right_root.to_path_buf(),
            entries,
            summary,
            total_candidates: total,
            cancelled,
            partial: left.partial || right.partial,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Hash both sides of a same-size pair. `None` means the task was cancelled.
    fn hash_pair(
        &self,
        task: HashTask,
        cancel: &CancellationToken,
        tracker: &ProgressTracker<'_>,
    ) -> Option<ComparisonEntry> {
        if cancel.is_cancelled() {
            return None;
        }

        let left = match self.hasher.hash_file(&task.left.absolute_path, cancel) {
            HashOutcome::Hashed(digest) => digest,
            HashOutcome::Failed(failure) => {
                let entry = hash_failure(task, Side::Left, failure.kind, failure.message);
                tracker.advance(&entry.relative_path);
                return Some(entry);
            }
            HashOutcome::Cancelled => return None,
        };

        let right = match self.hasher.hash_file(&task.right.absolute_path, cancel) {
            HashOutcome::Hashed(digest) => digest,
            HashOutcome::Failed(failure) => {
                let entry = hash_failure(task, Side::Right, failure.kind, failure.message);
                tracker.advance(&entry.relative_path);
                return Some(entry);
            }
            HashOutcome::Cancelled => return None,
        };

        let entry = hashed_entry(task, left, right);
        tracker.advance(&entry.relative_path);
        Some(entry)
    }
}

/// Walk both roots at the same time.
///
/// Both roots are checked up front so a bad root fails before any walking.
pub(crate) fn walk_both(
    walker: &DirectoryWalker,
    left_root: &Path,
    right_root: &Path,
    cancel: &CancellationToken,
) -> Result<(Inventory, Inventory), DriveDiffError> {
    check_root(left_root)?;
    check_root(right_root)?;

    thread::scope(|scope| -> Result<(Inventory, Inventory), DriveDiffError> {
        let right_walk = scope.spawn(|| walker.walk_with_cancel(right_root, cancel));
        let left = walker.walk_with_cancel(left_root, cancel);
        let right = right_walk
            .join()
            .map_err(|_| DriveDiffError::Pool("right-hand walk panicked".to_string()))?;
        Ok((left?, right?))
    })
}

/// Split the union of both inventories into finished entries and hash work.
///
/// An interrupted walk leaves one side incomplete, so nothing is classified.
/// A path under a directory one side could not read is an `Error` entry for
/// that side rather than `Added` or `Removed`.
fn plan(left: &mut Inventory, right: &mut Inventory) -> (Vec<ComparisonEntry>, Vec<HashTask>) {
    if left.cancelled || right.cancelled {
        debug!("Walk interrupted, classifying nothing");
        return (Vec::new(), Vec::new());
    }

    let paths: BTreeSet<PathBuf> = left
        .entries
        .keys()
        .chain(right.entries.keys())
        .chain(left.errors.keys())
        .chain(right.errors.keys())
        .cloned()
        .collect();

    let mut entries = Vec::new();
    let mut tasks = Vec::new();

    for path in paths {
        let left_entry = left.entries.remove(&path);
        let right_entry = right.entries.remove(&path);

        let walk_error = match (left.errors.get(&path), right.errors.get(&path)) {
            (Some(err), _) => Some((Side::Left, err)),
            (None, Some(err)) => Some((Side::Right, err)),
            (None, None) => match (&left_entry, &right_entry) {
                (None, Some(_)) => unreadable_ancestor(left, &path).map(|err| (Side::Left, err)),
                (Some(_), None) => unreadable_ancestor(right, &path).map(|err| (Side::Right, err)),
                _ => None,
            },
        };
        if let Some((side, err)) = walk_error {
            entries.push(ComparisonEntry::failed(
                path,
                left_entry,
                right_entry,
                EntryError {
                    side,
                    kind: err.kind,
                    message: err.message.clone(),
                },
            ));
            continue;
        }

        match (left_entry, right_entry) {
            (Some(l), None) => entries.push(ComparisonEntry::removed(l)),
            (None, Some(r)) => entries.push(ComparisonEntry::added(r)),
            (Some(l), Some(r)) if l.size != r.size => {
                debug!("Size differs: {}", path.display());
                entries.push(paired(path, ComparisonStatus::Modified, l, r));
            }
            (Some(l), Some(r)) => tasks.push(HashTask {
                relative_path: path,
                left: l,
                right: r,
            }),
            (None, None) => {}
        }
    }

    (entries, tasks)
}

/// The walk error of the nearest enclosing directory, if one was recorded.
fn unreadable_ancestor<'a>(inventory: &'a Inventory, path: &Path) -> Option<&'a WalkError> {
    path.ancestors()
        .skip(1)
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .find_map(|ancestor| inventory.errors.get(ancestor))
}

fn paired(relative_path: PathBuf, status: ComparisonStatus, left: FileEntry, right: FileEntry) -> ComparisonEntry {
    ComparisonEntry {
        relative_path,
        status,
        left: Some(left),
        right: Some(right),
        left_hash: None,
        right_hash: None,
        content_kind: None,
        error: None,
    }
}

fn hashed_entry(task: HashTask, left: FileDigest, right: FileDigest) -> ComparisonEntry {
    let status = if left.digest == right.digest {
        ComparisonStatus::Identical
    } else {
        ComparisonStatus::Modified
    };
    let content_kind = if left.content_kind == ContentKind::Binary || right.content_kind == ContentKind::Binary {
        ContentKind::Binary
    } else {
        ContentKind::Text
    };

    let mut entry = paired(task.relative_path, status, task.left, task.right);
    entry.left_hash = Some(left.digest);
    entry.right_hash = Some(right.digest);
    entry.content_kind = Some(content_kind);
    entry
}

fn hash_failure(
    task: HashTask,
    side: Side,
    kind: FileErrorKind,
    message: String,
) -> ComparisonEntry {
    ComparisonEntry::failed(
        task.relative_path,
        Some(task.left),
        Some(task.right),
        EntryError { side, kind, message },
    )
}
