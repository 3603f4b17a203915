use crate::hasher::{sniff_file, DEFAULT_SNIFF_LEN};
use drivediff_common::{ComparisonEntry, ContentKind, DriveDiffError};
use similar::{Algorithm, ChangeTag, TextDiff};
use std::fs;
use std::path::Path;
use tracing::debug;

/// One line of a line-level diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub line_number_left: Option<usize>,
    pub line_number_right: Option<usize>,
    /// Line text without its terminator, after preprocessing
    pub content: String,
    pub change: LineChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    Kept,
    Added,
    Removed,
}

/// Whitespace handling options for text comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitespaceMode {
    /// Compare whitespace exactly
    #[default]
    Exact,
    /// Ignore all whitespace changes
    IgnoreAll,
    /// Ignore leading whitespace
    IgnoreLeading,
    /// Ignore trailing whitespace
    IgnoreTrailing,
    /// Ignore changes in amount of whitespace
    IgnoreChanges,
}

/// Configuration for text comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiffConfig {
    pub ignore_case: bool,
    pub whitespace_mode: WhitespaceMode,
    /// Treat CRLF and lone CR as LF
    pub normalize_line_endings: bool,
    /// Unchanged lines shown around each hunk in unified output
    pub context_lines: usize,
}

impl Default for TextDiffConfig {
    fn default() -> Self {
        Self {
            ignore_case: false,
            whitespace_mode: WhitespaceMode::Exact,
            normalize_line_endings: true,
            context_lines: 3,
        }
    }
}

impl TextDiffConfig {
    pub fn ignore_all_whitespace() -> Self {
        Self {
            whitespace_mode: WhitespaceMode::IgnoreAll,
            ..Default::default()
        }
    }

    pub fn ignore_case() -> Self {
        Self {
            ignore_case: true,
            ..Default::default()
        }
    }
}

/// Line diff of two texts, with the preprocessed inputs kept for rendering
#[derive(Debug, Clone)]
pub struct LineDiff {
    pub lines: Vec<DiffLine>,
    left: String,
    right: String,
    context_lines: usize,
}

impl LineDiff {
    pub fn added_count(&self) -> usize {
        self.count(LineChange::Added)
    }

    pub fn removed_count(&self) -> usize {
        self.count(LineChange::Removed)
    }

    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.change != LineChange::Kept)
    }

    fn count(&self, change: LineChange) -> usize {
        self.lines.iter().filter(|l| l.change == change).count()
    }

    /// Render as a unified diff with `a/<name>` and `b/<name>` headers.
    ///
    /// Returns an empty string when nothing changed.
    pub fn to_unified(&self, name: &str) -> String {
        if !self.has_changes() {
            return String::new();
        }
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Lcs)
            .diff_lines(&self.left, &self.right);
        let mut unified = diff.unified_diff();
        unified
            .context_radius(self.context_lines)
            .header(&format!("a/{name}"), &format!("b/{name}"));
        unified.to_string()
    }
}

/// Line-level text diff engine (LCS)
#[derive(Debug, Clone, Default)]
pub struct TextDiffEngine {
    config: TextDiffConfig,
}

impl TextDiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TextDiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TextDiffConfig {
        &self.config
    }

    /// Preprocess text according to configuration options
    fn preprocess_text(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.normalize_line_endings {
            result = result.replace("\r\n", "\n").replace('\r', "\n");
        }

        if self.config.ignore_case {
            result = result.to_lowercase();
        }

        let had_final_newline = result.ends_with('\n');
        let mut processed = match self.config.whitespace_mode {
            WhitespaceMode::Exact => return result,
            WhitespaceMode::IgnoreAll => result
                .lines()
                .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n"),
            WhitespaceMode::IgnoreLeading => result
                .lines()
                .map(|line| line.trim_start())
                .collect::<Vec<_>>()
                .join("\n"),
            WhitespaceMode::IgnoreTrailing => result
                .lines()
                .map(|line| line.trim_end())
                .collect::<Vec<_>>()
                .join("\n"),
            WhitespaceMode::IgnoreChanges => result
                .lines()
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if had_final_newline {
            processed.push('\n');
        }
        processed
    }

    /// Diff two texts line by line.
    pub fn diff(&self, left: &str, right: &str) -> LineDiff {
        let left = self.preprocess_text(left);
        let right = self.preprocess_text(right);

        let lines = {
            let diff = TextDiff::configure()
                .algorithm(Algorithm::Lcs)
                .diff_lines(&left, &right);

            diff.iter_all_changes()
                .map(|change| DiffLine {
                    line_number_left: change.old_index().map(|i| i + 1),
                    line_number_right: change.new_index().map(|i| i + 1),
                    content: change
                        .value()
                        .trim_end_matches(|c| c == '\n' || c == '\r')
                        .to_string(),
                    change: match change.tag() {
                        ChangeTag::Equal => LineChange::Kept,
                        ChangeTag::Insert => LineChange::Added,
                        ChangeTag::Delete => LineChange::Removed,
                    },
                })
                .collect()
        };

        LineDiff {
            lines,
            left,
            right,
            context_lines: self.config.context_lines,
        }
    }

    /// Read two files and diff them. Invalid UTF-8 is replaced, not rejected.
    pub fn diff_files(&self, left_path: &Path, right_path: &Path) -> Result<LineDiff, DriveDiffError> {
        let left = fs::read(left_path)?;
        let right = fs::read(right_path)?;
        Ok(self.diff(
            &String::from_utf8_lossy(&left),
            &String::from_utf8_lossy(&right),
        ))
    }

    /// Diff a Modified text entry from a finished comparison.
    ///
    /// Both files are read now, not when the comparison ran. Returns `None`
    /// for entries that are not Modified or where either side is binary.
    pub fn diff_entry(&self, entry: &ComparisonEntry) -> Result<Option<LineDiff>, DriveDiffError> {
        if !entry.is_diffable() {
            return Ok(None);
        }
        let (Some(left), Some(right)) = (&entry.left, &entry.right) else {
            return Ok(None);
        };

        // Entries short-circuited on size were never classified
        if entry.content_kind.is_none() {
            let left_kind = sniff_file(&left.absolute_path, DEFAULT_SNIFF_LEN)?;
            let right_kind = sniff_file(&right.absolute_path, DEFAULT_SNIFF_LEN)?;
            if left_kind == ContentKind::Binary || right_kind == ContentKind::Binary {
                debug!("Skipping diff of binary file {}", entry.relative_path.display());
                return Ok(None);
            }
        }

        self.diff_files(&left.absolute_path, &right.absolute_path)
            .map(Some)
    }
}
