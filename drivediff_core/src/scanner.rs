use crate::path_matcher::PathMatcher;
use drivediff_common::{
    CancellationToken, DriveDiffError, FileEntry, FileErrorKind, ScanConfiguration, WalkError,
};
use jwalk::WalkDir;
use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// What a walk records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Regular files (and links to them); directories are only traversed
    Files,
    /// Directories only; files are never inspected
    Directories,
}

/// Everything found under one root, keyed by relative path
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub root: PathBuf,
    pub entries: BTreeMap<PathBuf, FileEntry>,
    pub errors: BTreeMap<PathBuf, WalkError>,
    /// Enumeration stopped at `max_files`
    pub partial: bool,
    pub cancelled: bool,
}

impl Inventory {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative_path: &Path) -> Option<&FileEntry> {
        self.entries.get(relative_path)
    }

    pub fn summary(&self) -> InventorySummary {
        let mut summary = InventorySummary {
            errors: self.errors.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            if entry.is_dir {
                summary.directories += 1;
            } else {
                summary.files += 1;
                summary.total_size += entry.size;
            }
        }
        summary
    }

    fn record_error(&mut self, relative_path: PathBuf, kind: FileErrorKind, message: String) {
        warn!("Walk error at {}: {}", relative_path.display(), message);
        self.errors.insert(
            relative_path.clone(),
            WalkError {
                relative_path,
                kind,
                message,
            },
        );
    }
}

/// Counts over one inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub files: usize,
    pub directories: usize,
    /// Sum of file sizes in bytes
    pub total_size: u64,
    pub errors: usize,
}

impl InventorySummary {
    /// Every entry under the root could be read.
    pub fn is_accessible(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Parallel directory walker using jwalk
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    matcher: Arc<PathMatcher>,
    scan_paths: Vec<String>,
    max_files: Option<usize>,
    mode: WalkMode,
}

impl DirectoryWalker {
    pub fn new(config: &ScanConfiguration, mode: WalkMode) -> Result<Self, DriveDiffError> {
        Ok(Self {
            matcher: Arc::new(PathMatcher::new(config)?),
            scan_paths: config.scan_paths.clone(),
            max_files: config.performance.max_files_limit(),
            mode,
        })
    }

    pub fn mode(&self) -> WalkMode {
        self.mode
    }

    /// Walk a root and return its inventory
    pub fn walk(&self, root: &Path) -> Result<Inventory, DriveDiffError> {
        self.walk_with_cancel(root, &CancellationToken::new())
    }

    /// Walk a root, checking the token between entries.
    ///
    /// Only an unusable root is an error; everything that fails below it is
    /// recorded in the inventory and the walk goes on.
    pub fn walk_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Inventory, DriveDiffError> {
        check_root(root)?;

        let mut inventory = Inventory::new(root);

        for start in self.start_points(root) {
            if cancel.is_cancelled() {
                inventory.cancelled = true;
                break;
            }

            let metadata = match fs::symlink_metadata(&start) {
                Ok(metadata) => metadata,
                Err(_) => {
                    debug!("Scan path not found, skipping: {}", start.display());
                    continue;
                }
            };

            let relative = relative_to(root, &start);
            if !relative.as_os_str().is_empty()
                && self.matcher.should_exclude_entry(&start, &relative)
            {
                continue;
            }

            let flow = if metadata.is_dir() {
                self.walk_tree(root, &start, cancel, &mut inventory)
            } else if self.mode == WalkMode::Files {
                self.record_file(&start, relative, &mut inventory)
            } else {
                Flow::Continue
            };

            if flow == Flow::Stop {
                break;
            }
        }

        info!(
            "Walked {}: {} entries, {} errors{}{}",
            root.display(),
            inventory.entries.len(),
            inventory.errors.len(),
            if inventory.partial { " (partial)" } else { "" },
            if inventory.cancelled { " (cancelled)" } else { "" }
        );
        Ok(inventory)
    }

    fn start_points(&self, root: &Path) -> Vec<PathBuf> {
        if self.scan_paths.is_empty() {
            return vec![root.to_path_buf()];
        }

        let mut starts: Vec<PathBuf> = Vec::with_capacity(self.scan_paths.len());
        for scan_path in &self.scan_paths {
            let relative = scan_path.trim_start_matches('/');
            let start = if relative.is_empty() {
                root.to_path_buf()
            } else {
                root.join(relative)
            };
            if !starts.contains(&start) {
                starts.push(start);
            }
        }
        starts
    }

    fn walk_tree(
        &self,
        root: &Path,
        start: &Path,
        cancel: &CancellationToken,
        inventory: &mut Inventory,
    ) -> Flow {
        let matcher = Arc::clone(&self.matcher);
        let prune_root = root.to_path_buf();
        let prune_cancel = cancel.clone();
        let mode = self.mode;

        // Excluded children are dropped before jwalk reads them, so pruned
        // directories are never opened.
        let walker = WalkDir::new(start)
            .follow_links(false)
            .skip_hidden(false)
            .sort(true)
            .process_read_dir(move |_depth, dir_path, _state, children| {
                if prune_cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                children.retain(|child| match child {
                    Ok(child) => {
                        if mode == WalkMode::Directories && !child.file_type().is_dir() {
                            return false;
                        }
                        let absolute = dir_path.join(child.file_name());
                        let relative = absolute.strip_prefix(&prune_root).unwrap_or(&absolute);
                        !matcher.should_exclude_entry(&absolute, relative)
                    }
                    Err(_) => true,
                });
            });

        for item in walker {
            if cancel.is_cancelled() {
                inventory.cancelled = true;
                return Flow::Stop;
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    record_walk_error(root, start, &err, inventory);
                    continue;
                }
            };

            let absolute = entry.path();
            let relative = relative_to(root, &absolute);

            if let Some(err) = &entry.read_children_error {
                record_walk_error(root, &absolute, err, inventory);
            }

            // The root itself is not an entry
            if relative.as_os_str().is_empty() {
                continue;
            }

            if entry.file_type().is_dir() {
                if self.mode == WalkMode::Directories {
                    let flow = match entry.metadata() {
                        Ok(metadata) => {
                            self.record(inventory, file_entry(relative, absolute, &metadata))
                        }
                        Err(err) => {
                            record_walk_error(root, &absolute, &err, inventory);
                            Flow::Continue
                        }
                    };
                    if flow == Flow::Stop {
                        return flow;
                    }
                }
                continue;
            }

            if self.mode == WalkMode::Files
                && self.record_file(&absolute, relative, inventory) == Flow::Stop
            {
                return Flow::Stop;
            }
        }

        Flow::Continue
    }

    /// Record a regular file, or a symlink to one with the target's metadata.
    fn record_file(&self, absolute: &Path, relative: PathBuf, inventory: &mut Inventory) -> Flow {
        if !self.matcher.is_included_file(&relative) {
            debug!("Not included: {}", relative.display());
            return Flow::Continue;
        }

        match fs::metadata(absolute) {
            Ok(metadata) if metadata.is_file() => {
                self.record(inventory, file_entry(relative, absolute.to_path_buf(), &metadata))
            }
            Ok(metadata) if metadata.is_dir() => {
                debug!("Not following directory link: {}", absolute.display());
                Flow::Continue
            }
            Ok(_) => {
                debug!("Skipping special file: {}", absolute.display());
                Flow::Continue
            }
            Err(e) => {
                inventory.record_error(relative, FileErrorKind::from(&e), e.to_string());
                Flow::Continue
            }
        }
    }

    fn record(&self, inventory: &mut Inventory, entry: FileEntry) -> Flow {
        if let Some(limit) = self.max_files {
            if inventory.entries.len() >= limit {
                info!("Reached max_files limit of {} in {}", limit, inventory.root.display());
                inventory.partial = true;
                return Flow::Stop;
            }
        }
        inventory.entries.insert(entry.relative_path.clone(), entry);
        Flow::Continue
    }
}

/// Fail unless `root` is an existing, listable directory.
pub fn check_root(root: &Path) -> Result<(), DriveDiffError> {
    let metadata = fs::metadata(root).map_err(|e| DriveDiffError::access(root, e))?;
    if !metadata.is_dir() {
        return Err(DriveDiffError::access(root, "not a directory"));
    }
    fs::read_dir(root).map_err(|e| DriveDiffError::access(root, e))?;
    Ok(())
}

fn record_walk_error(root: &Path, fallback: &Path, err: &jwalk::Error, inventory: &mut Inventory) {
    let path = err.path().unwrap_or(fallback);
    let (kind, message) = match err.io_error() {
        Some(io) => (FileErrorKind::from(io), io.to_string()),
        None => (FileErrorKind::Other, err.to_string()),
    };
    inventory.record_error(relative_to(root, path), kind, message);
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn file_entry(relative_path: PathBuf, absolute_path: PathBuf, metadata: &Metadata) -> FileEntry {
    FileEntry {
        relative_path,
        absolute_path,
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        permissions: permission_bits(metadata),
        is_dir: metadata.is_dir(),
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
