use drivediff_common::{DriveDiffError, ScanConfiguration};
use glob::{MatchOptions, Pattern};
use std::path::Path;
use tracing::debug;

/// Directories under which each child is a mounted volume.
const MOUNT_ROOTS: [&str; 3] = ["/Volumes", "/mnt", "/media"];

/// `*` crosses `/`, like shell `fnmatch`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled exclusion and inclusion rules for one scan configuration.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    exclude_paths: Vec<String>,
    exclude_patterns: Vec<Pattern>,
    include_patterns: Vec<Pattern>,
}

impl PathMatcher {
    pub fn new(config: &ScanConfiguration) -> Result<Self, DriveDiffError> {
        let exclude_paths = config
            .exclude_paths
            .iter()
            .filter_map(|p| normalize_exclude_path(p))
            .collect();

        Ok(Self {
            exclude_paths,
            exclude_patterns: compile_patterns(&config.exclude_patterns)?,
            include_patterns: compile_patterns(&config.include_patterns)?,
        })
    }

    /// Check an absolute path against the configured exclude paths.
    ///
    /// Both the path as given and its mount-stripped form are tested, so
    /// `/usr/share` also excludes `/Volumes/rootfs/usr/share`.
    pub fn should_exclude(&self, absolute_path: &Path) -> bool {
        if self.exclude_paths.is_empty() {
            return false;
        }

        let original = to_slash(absolute_path);
        let stripped = strip_mount_prefix(&original);

        self.exclude_paths.iter().any(|exclude| {
            is_under(&original, exclude)
                || stripped.as_deref().map_or(false, |s| is_under(s, exclude))
        })
    }

    /// Exclude paths OR exclude patterns.
    pub fn should_exclude_entry(&self, absolute_path: &Path, relative_path: &Path) -> bool {
        if self.should_exclude(absolute_path) {
            debug!("Excluded by path rule: {}", absolute_path.display());
            return true;
        }
        if matches_any_pattern(relative_path, &self.exclude_patterns) {
            debug!("Excluded by pattern: {}", relative_path.display());
            return true;
        }
        false
    }

    /// Include allow-list for files. Directories are never filtered by it.
    pub fn is_included_file(&self, relative_path: &Path) -> bool {
        self.include_patterns.is_empty() || matches_any_pattern(relative_path, &self.include_patterns)
    }

    pub fn has_include_patterns(&self) -> bool {
        !self.include_patterns.is_empty()
    }
}

/// Test a root-relative path against glob patterns.
///
/// Each pattern sees the bare name, the path itself, `/<path>/` and
/// `<path>/`, so `tmp`, `*/tmp/*` and `tmp/*` all catch a directory named
/// `tmp` and `*/tmp/*` also catches everything beneath it.
pub fn matches_any_pattern(relative_path: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let path = to_slash(relative_path);
    let path = path.trim_matches('/');
    if path.is_empty() {
        return false;
    }

    let name = path.rsplit('/').next().unwrap_or(path);
    let wrapped = format!("/{path}/");
    let trailing = format!("{path}/");
    let forms = [name, path, wrapped.as_str(), trailing.as_str()];

    patterns
        .iter()
        .any(|pattern| forms.iter().any(|form| pattern.matches_with(form, MATCH_OPTIONS)))
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, DriveDiffError> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw)
                .map_err(|e| DriveDiffError::Config(format!("Invalid pattern '{}': {}", raw, e)))
        })
        .collect()
}

/// Remove a mount root and its volume-name segment from an absolute path.
///
/// `/Volumes/rootfs/usr/share` becomes `/usr/share`; `/mnt/disk1` becomes `/`.
/// Returns `None` when the path does not live under a known mount root.
pub fn strip_mount_prefix(path: &str) -> Option<String> {
    MOUNT_ROOTS.iter().find_map(|root| {
        let rest = path.strip_prefix(root)?.strip_prefix('/')?;
        let (name, remainder) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if name.is_empty() {
            return None;
        }
        let remainder = remainder.trim_end_matches('/');
        Some(if remainder.is_empty() {
            "/".to_string()
        } else {
            remainder.to_string()
        })
    })
}

fn normalize_exclude_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_trailing = trimmed.trim_end_matches('/');
    Some(if without_trailing.is_empty() {
        "/".to_string()
    } else {
        without_trailing.to_string()
    })
}

/// Segment-bounded prefix test: `/usr/share` covers `/usr/share/x`, not `/usr/share2`.
fn is_under(path: &str, exclude: &str) -> bool {
    if exclude == "/" {
        return path.starts_with('/');
    }
    path == exclude
        || path
            .strip_prefix(exclude)
            .map_or(false, |rest| rest.starts_with('/'))
}

fn to_slash(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if cfg!(windows) {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn matcher(exclude_paths: &[&str], exclude_patterns: &[&str], include: &[&str]) -> PathMatcher {
        let config = ScanConfiguration {
            exclude_paths: exclude_paths.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: exclude_patterns.iter().map(|s| s.to_string()).collect(),
            include_patterns: include.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        PathMatcher::new(&config).unwrap()
    }

    fn patterns(raw: &[&str]) -> Vec<Pattern> {
        compile_patterns(&raw.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_strip_mount_prefix() {
        assert_eq!(strip_mount_prefix("/Volumes/rootfs/usr/share").as_deref(), Some("/usr/share"));
        assert_eq!(strip_mount_prefix("/mnt/disk1").as_deref(), Some("/"));
        assert_eq!(strip_mount_prefix("/media/backup/var/cache/").as_deref(), Some("/var/cache"));
        assert_eq!(strip_mount_prefix("/usr/share"), None);
        assert_eq!(strip_mount_prefix("/mntx/disk/usr"), None);
        assert_eq!(strip_mount_prefix("/Volumes/"), None);
    }

    #[test]
    fn test_mounted_volume_exclusion_equivalence() {
        let m = matcher(&["/usr/share"], &[], &[]);

        assert!(m.should_exclude(Path::new("/usr/share/x")));
        assert!(m.should_exclude(Path::new("/Volumes/anyname/usr/share/x")));
        assert!(m.should_exclude(Path::new("/mnt/backup/usr/share")));
        assert!(m.should_exclude(Path::new("/media/disk/usr/share/doc/package")));
        assert!(!m.should_exclude(Path::new("/usr/share2/x")));
        assert!(!m.should_exclude(Path::new("/Volumes/anyname/usr/share2/x")));
        assert!(!m.should_exclude(Path::new("/Volumes/rootfs/usr/bin")));
    }

    #[test]
    fn test_exclude_path_trailing_separator_ignored() {
        let m = matcher(&["/var/cache/"], &[], &[]);
        assert!(m.should_exclude(Path::new("/var/cache")));
        assert!(m.should_exclude(Path::new("/var/cache/apt")));
        assert!(!m.should_exclude(Path::new("/var/cached")));
    }

    #[test]
    fn test_bare_name_pattern_matches_any_depth() {
        let p = patterns(&["tmp"]);
        assert!(matches_any_pattern(Path::new("tmp"), &p));
        assert!(matches_any_pattern(Path::new("a/b/tmp"), &p));
        assert!(!matches_any_pattern(Path::new("a/tmpfile"), &p));
    }

    #[test]
    fn test_wrapped_pattern_matches_directory_and_descendants() {
        let p = patterns(&["*/tmp/*"]);
        assert!(matches_any_pattern(Path::new("tmp"), &p));
        assert!(matches_any_pattern(Path::new("tmp/cache"), &p));
        assert!(matches_any_pattern(Path::new("var/tmp/x.txt"), &p));
        assert!(!matches_any_pattern(Path::new("var/tmpx/x.txt"), &p));
    }

    #[test]
    fn test_trailing_wildcard_pattern() {
        let p = patterns(&["node_modules/*"]);
        assert!(matches_any_pattern(Path::new("node_modules"), &p));
        assert!(matches_any_pattern(Path::new("node_modules/pkg"), &p));
    }

    #[test]
    fn test_extension_pattern() {
        let p = patterns(&["*.pyc"]);
        assert!(matches_any_pattern(Path::new("code/__pycache__/x.pyc"), &p));
        assert!(!matches_any_pattern(Path::new("code/x.py"), &p));
    }

    #[test]
    fn test_include_patterns_only_restrict_files() {
        let m = matcher(&[], &[], &["*.conf"]);
        assert!(m.is_included_file(Path::new("etc/app.conf")));
        assert!(!m.is_included_file(Path::new("etc/app.bin")));

        let open = matcher(&[], &[], &[]);
        assert!(open.is_included_file(Path::new("anything")));
    }

    #[test]
    fn test_entry_exclusion_combines_rules() {
        let m = matcher(&["/srv/data"], &["*.log"], &[]);
        let root = PathBuf::from("/srv");
        assert!(m.should_exclude_entry(&root.join("data"), Path::new("data")));
        assert!(m.should_exclude_entry(&root.join("app/run.log"), Path::new("app/run.log")));
        assert!(!m.should_exclude_entry(&root.join("app/run.txt"), Path::new("app/run.txt")));
    }

    #[test]
    fn test_malformed_pattern_is_config_error() {
        let config = ScanConfiguration {
            exclude_patterns: vec!["[unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(PathMatcher::new(&config), Err(DriveDiffError::Config(_))));
    }

    #[test]
    fn test_default_rules_skip_vcs_and_finder_metadata() {
        let config = drivediff_common::AppConfig::default().structure_config();
        let matcher = PathMatcher::new(&config).unwrap();
        let excluded = |rel: &str| {
            let absolute = PathBuf::from("/data/root").join(rel);
            matcher.should_exclude_entry(&absolute, Path::new(rel))
        };

        assert!(excluded(".svn"));
        assert!(excluded("project/.hg"));
        assert!(excluded("project/.hg/store/data"));
        assert!(excluded(".DS_Store"));
        assert!(excluded("photos/.DS_Store"));
        assert!(!excluded("project/src/main.rs"));
        assert!(!excluded("svn/notes.txt"));
    }
}
