use crate::DriveDiffError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "drivediff.toml";

pub const DEFAULT_WORKER_THREADS: usize = 4;
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 64 * 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Rules and limits for a single comparison run.
///
/// One instance drives content comparison and another drives structure
/// comparison; the engine never merges them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfiguration {
    /// Subtrees to scan, relative to each root. Empty scans everything.
    #[serde(default)]
    pub scan_paths: Vec<String>,

    /// Absolute path prefixes that are never entered.
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// File allow-list globs (content comparison only). Empty includes all.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl ScanConfiguration {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), DriveDiffError> {
        self.performance.validate()
    }

    pub fn with_performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,

    /// Stop enumerating after this many entries per root. 0 means unlimited.
    #[serde(default)]
    pub max_files: usize,
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

fn default_hash_chunk_size() -> usize {
    DEFAULT_HASH_CHUNK_SIZE
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            hash_chunk_size: DEFAULT_HASH_CHUNK_SIZE,
            max_files: 0,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<(), DriveDiffError> {
        if self.worker_threads == 0 {
            return Err(DriveDiffError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.hash_chunk_size == 0 {
            return Err(DriveDiffError::Config(
                "hash_chunk_size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_files_limit(&self) -> Option<usize> {
        (self.max_files > 0).then_some(self.max_files)
    }
}

/// Scan rules of one comparison section in the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRules {
    #[serde(default)]
    pub scan_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl ComparisonRules {
    fn to_scan_configuration(&self, performance: PerformanceConfig) -> ScanConfiguration {
        ScanConfiguration {
            scan_paths: self.scan_paths.clone(),
            exclude_paths: self.exclude_paths.clone(),
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            performance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The configuration document consumed by front ends.
///
/// Sections missing from a file fall back to [`AppConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub directory_comparison: ComparisonRules,
    pub structure_comparison: ComparisonRules,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let system_excludes = ["/proc", "/sys", "/dev", "/run", "/tmp", "/var/tmp", "/var/cache"];
        let common_patterns = [
            "*/tmp/*",
            "*/temp/*",
            "*/.git/*",
            "*/.svn/*",
            "*/.hg/*",
            "*/node_modules/*",
            "*/__pycache__/*",
            ".DS_Store",
        ];

        let directory_comparison = ComparisonRules {
            scan_paths: Vec::new(),
            exclude_paths: to_strings(&system_excludes),
            include_patterns: to_strings(&[
                "*.conf", "*.config", "*.cfg", "*.ini", "*.json", "*.yaml", "*.yml", "*.xml",
                "*.txt", "*.log",
            ]),
            exclude_patterns: to_strings(&common_patterns)
                .into_iter()
                .chain(to_strings(&["*.pyc", "*.pyo"]))
                .collect(),
        };

        let structure_comparison = ComparisonRules {
            scan_paths: Vec::new(),
            exclude_paths: to_strings(&system_excludes)
                .into_iter()
                .chain(to_strings(&["/var/log", "/var/spool"]))
                .collect(),
            include_patterns: Vec::new(),
            exclude_patterns: to_strings(&common_patterns)
                .into_iter()
                .chain(to_strings(&["*/venv/*", "*/cache/*"]))
                .collect(),
        };

        Self {
            directory_comparison,
            structure_comparison,
            performance: PerformanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Rules for content comparison combined with the shared performance section.
    pub fn directory_config(&self) -> ScanConfiguration {
        self.directory_comparison.to_scan_configuration(self.performance)
    }

    /// Rules for structure comparison combined with the shared performance section.
    pub fn structure_config(&self) -> ScanConfiguration {
        self.structure_comparison.to_scan_configuration(self.performance)
    }

    /// Collect every problem in the document into one error.
    pub fn validate(&self) -> Result<(), DriveDiffError> {
        let mut problems = Vec::new();

        if let Err(DriveDiffError::Config(msg)) = self.performance.validate() {
            problems.push(msg);
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            problems.push(format!(
                "invalid logging level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DriveDiffError::Config(problems.join("; ")))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

/// Load the configuration document, falling back to defaults when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, DriveDiffError> {
    let (path, portable) = config_path(explicit)?;
    let exists = path.exists();

    let config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| DriveDiffError::Serialization(e.to_string()))?
    } else {
        AppConfig::default()
    };
    config.validate()?;

    Ok(LoadedConfig {
        config,
        path,
        exists,
        portable,
    })
}

pub fn ensure_config(explicit: Option<&Path>) -> Result<LoadedConfig, DriveDiffError> {
    let loaded = load_config(explicit)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), DriveDiffError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, render_config(config)?)?;
    Ok(())
}

/// Render the document as it would be written to disk.
pub fn render_config(config: &AppConfig) -> Result<String, DriveDiffError> {
    toml::to_string_pretty(config).map_err(|e| DriveDiffError::Serialization(e.to_string()))
}

/// Where the document lives: the explicit path, else the portable file, else
/// the platform config directory. The flag reports portable mode.
pub fn config_path(explicit: Option<&Path>) -> Result<(PathBuf, bool), DriveDiffError> {
    match explicit {
        Some(path) => Ok((path.to_path_buf(), false)),
        None => resolve_config_path(),
    }
}

fn resolve_config_path() -> Result<(PathBuf, bool), DriveDiffError> {
    if let Some(portable_path) = portable_config_path() {
        if portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "drivediff", "drivediff")
        .ok_or_else(|| DriveDiffError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
