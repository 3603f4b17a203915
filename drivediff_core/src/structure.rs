use crate::comparison::walk_both;
use crate::progress::{announce, NoProgress, ProgressObserver, ProgressTracker};
use crate::scanner::{DirectoryWalker, WalkMode};
use chrono::Utc;
use drivediff_common::{
    CancellationToken, DriveDiffError, ProgressPhase, RunId, ScanConfiguration, StructureEntry,
    StructureResult, StructureStatus, StructureSummary,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

/// Directory-only comparison of two trees. Nothing is hashed.
#[derive(Debug, Clone)]
pub struct StructureComparer {
    walker: DirectoryWalker,
}

impl StructureComparer {
    pub fn new(config: ScanConfiguration) -> Result<Self, DriveDiffError> {
        config.validate()?;
        Ok(Self {
            walker: DirectoryWalker::new(&config, WalkMode::Directories)?,
        })
    }

    pub fn compare_structure(
        &self,
        left_root: &Path,
        right_root: &Path,
    ) -> Result<StructureResult, DriveDiffError> {
        self.compare_structure_with(left_root, right_root, &NoProgress, &CancellationToken::new())
    }

    pub fn compare_structure_with(
        &self,
        left_root: &Path,
        right_root: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<StructureResult, DriveDiffError> {
        let run_id = RunId::new();
        let span = info_span!("compare_structure", run_id = %run_id);
        let _enter = span.enter();
        let started_at = Utc::now();

        info!(
            "Comparing directory structure of {} with {}",
            left_root.display(),
            right_root.display()
        );

        announce(observer, ProgressPhase::Scanning, 0, left_root);
        let (left, right) = walk_both(&self.walker, left_root, right_root, cancel)?;

        let paths: BTreeSet<&PathBuf> = left.entries.keys().chain(right.entries.keys()).collect();
        let total = paths.len();
        let tracker = ProgressTracker::new(observer, ProgressPhase::Comparing, total);

        let mut entries = Vec::with_capacity(total);
        let mut cancelled = left.cancelled || right.cancelled;
        for path in paths {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let status = match (left.entries.contains_key(path), right.entries.contains_key(path)) {
                (true, true) => StructureStatus::Common,
                (true, false) => StructureStatus::Removed,
                _ => StructureStatus::Added,
            };
            entries.push(StructureEntry {
                relative_path: path.clone(),
                status,
            });
            tracker.advance(path);
        }

        let summary = StructureSummary::from_entries(&entries);
        info!(
            "Structure comparison finished: {} common, {} added, {} removed{}",
            summary.common,
            summary.added,
            summary.removed,
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(StructureResult {
            run_id,
            left_root: left_root.to_path_buf(),
            right_root: right_root.to_path_buf(),
            entries,
            summary,
            total_candidates: total,
            left_errors: left.errors.into_values().collect(),
            right_errors: right.errors.into_values().collect(),
            cancelled,
            partial: left.partial || right.partial,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
