pub mod comparison;
pub mod handle;
pub mod hasher;
pub mod path_matcher;
pub mod progress;
pub mod scanner;
pub mod source;
pub mod structure;
pub mod text_diff;

pub use comparison::ComparisonEngine;
pub use handle::{spawn_compare, spawn_compare_structure, ComparisonHandle, RunHandle, StructureHandle};
pub use hasher::{FileDigest, HashEngine, HashOutcome};
pub use path_matcher::PathMatcher;
pub use progress::{progress_channel, ChannelObserver, NoProgress, ProgressObserver};
pub use scanner::{DirectoryWalker, Inventory, InventorySummary, WalkMode};
pub use source::LocalFile;
pub use structure::StructureComparer;
pub use text_diff::{DiffLine, LineChange, LineDiff, TextDiffConfig, TextDiffEngine, WhitespaceMode};

use drivediff_common::{ComparisonResult, DriveDiffError, ScanConfiguration, StructureResult};
use std::path::Path;

/// Compare two trees by content and wait for the result.
pub fn compare(
    left_root: &Path,
    right_root: &Path,
    config: &ScanConfiguration,
) -> Result<ComparisonResult, DriveDiffError> {
    ComparisonEngine::new(config.clone())?.compare(left_root, right_root)
}

/// Compare the directory layout of two trees and wait for the result.
pub fn compare_structure(
    left_root: &Path,
    right_root: &Path,
    config: &ScanConfiguration,
) -> Result<StructureResult, DriveDiffError> {
    StructureComparer::new(config.clone())?.compare_structure(left_root, right_root)
}
