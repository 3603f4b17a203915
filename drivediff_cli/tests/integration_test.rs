use filetime::{set_file_mtime, FileTime};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Rules with nothing excluded; the default document excludes /tmp, where
/// the fixtures live.
const OPEN_CONFIG: &str = r#"
[directory_comparison]

[structure_comparison]

[performance]
worker_threads = 2

[logging]
level = "warn"
"#;

/// Helper struct to manage test directories
struct TestFixture {
    temp_dir: TempDir,
    left_dir: PathBuf,
    right_dir: PathBuf,
    config_path: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        Self::with_config(OPEN_CONFIG)
    }

    /// Create left and right directories plus a configuration file
    fn with_config(config: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let left_dir = temp_dir.path().join("left");
        let right_dir = temp_dir.path().join("right");
        let config_path = temp_dir.path().join("drivediff.toml");

        fs::create_dir(&left_dir).expect("Failed to create left dir");
        fs::create_dir(&right_dir).expect("Failed to create right dir");
        fs::write(&config_path, config).expect("Failed to write config");

        TestFixture {
            temp_dir,
            left_dir,
            right_dir,
            config_path,
        }
    }

    fn create_left_file<P: AsRef<Path>>(&self, path: P, content: &str) -> PathBuf {
        create_file(&self.left_dir, path, content)
    }

    fn create_right_file<P: AsRef<Path>>(&self, path: P, content: &str) -> PathBuf {
        create_file(&self.right_dir, path, content)
    }

    fn create_both<P: AsRef<Path>>(&self, path: P, content: &str) {
        self.create_left_file(path.as_ref(), content);
        self.create_right_file(path.as_ref(), content);
    }

    fn left(&self) -> &str {
        self.left_dir.to_str().expect("utf-8 path")
    }

    fn right(&self) -> &str {
        self.right_dir.to_str().expect("utf-8 path")
    }

    fn config(&self) -> &str {
        self.config_path.to_str().expect("utf-8 path")
    }

    /// Run a subcommand against the fixture's roots and configuration
    fn run(&self, subcommand: &str, extra: &[&str]) -> Output {
        let mut args = vec!["--config", self.config(), subcommand, self.left(), self.right()];
        args.extend_from_slice(extra);
        run_cli(self.temp_dir.path(), &args)
    }

    fn run_json(&self, subcommand: &str, extra: &[&str]) -> Value {
        let mut args = vec!["--json"];
        args.extend_from_slice(extra);
        let output = self.run(subcommand, &args);
        assert_success(&output);
        let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
        serde_json::from_str(&stdout).expect("invalid json output")
    }
}

fn create_file<P: AsRef<Path>>(base: &Path, path: P, content: &str) -> PathBuf {
    let file_path = base.join(path.as_ref());
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(&file_path, content).expect("Failed to write file");
    file_path
}

/// Helper to run the CLI binary with an isolated home directory
fn run_cli(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drivediff_cli"))
        .args(args)
        .env("XDG_CONFIG_HOME", home)
        .env("APPDATA", home)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run drivediff_cli")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed: {}\nstdout:\n{}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn status_of<'a>(report: &'a Value, path: &str) -> Option<&'a str> {
    report["entries"]
        .as_array()?
        .iter()
        .find(|e| e["path"] == path)
        .and_then(|e| e["status"].as_str())
}

#[test]
fn test_compare_identical_directories() {
    let fixture = TestFixture::new();
    fixture.create_both("file1.txt", "content1");
    fixture.create_both("nested/file2.txt", "content2");

    let output = fixture.run("compare", &[]);
    assert_success(&output);

    let stdout = stdout_of(&output);
    assert!(stdout.contains("Comparison Results"));
    assert!(stdout.contains("Identical:       2"));
    assert!(stdout.contains("Modified:        0"));
}

#[test]
fn test_compare_modified_and_added_json() {
    let fixture = TestFixture::new();
    fixture.create_left_file("a.txt", "X");
    fixture.create_right_file("a.txt", "Y");
    fixture.create_right_file("b.txt", "new file");
    fixture.create_left_file("c.txt", "left only");

    let report = fixture.run_json("compare", &[]);

    assert_eq!(status_of(&report, "a.txt"), Some("Modified"));
    assert_eq!(status_of(&report, "b.txt"), Some("Added"));
    assert_eq!(status_of(&report, "c.txt"), Some("Removed"));
    assert_eq!(report["summary"]["modified"], 1);
    assert_eq!(report["summary"]["added"], 1);
    assert_eq!(report["summary"]["removed"], 1);
    assert_eq!(report["outcome"], "Completed");

    let a = report["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["path"] == "a.txt")
        .unwrap();
    assert_eq!(a["left_hash"].as_str().unwrap().len(), 64);
    assert_ne!(a["left_hash"], a["right_hash"]);
    assert_eq!(a["content_kind"], "Text");
}

#[test]
fn test_diff_only_hides_identical() {
    let fixture = TestFixture::new();
    fixture.create_both("same.txt", "same");
    fixture.create_left_file("changed.txt", "one");
    fixture.create_right_file("changed.txt", "two");

    let report = fixture.run_json("compare", &["--diff-only"]);
    let entries = report["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["path"], "changed.txt");
    // Summary still counts everything
    assert_eq!(report["summary"]["identical"], 1);
}

#[test]
fn test_show_diff_prints_unified_diff() {
    let fixture = TestFixture::new();
    fixture.create_left_file("notes.txt", "keep\nold line\nkeep too\n");
    fixture.create_right_file("notes.txt", "keep\nnew line\nkeep too\n");

    let output = fixture.run("compare", &["--show-diff"]);
    assert_success(&output);

    let stdout = stdout_of(&output);
    assert!(stdout.contains("--- a/notes.txt"));
    assert!(stdout.contains("+++ b/notes.txt"));
    assert!(stdout.contains("-old line"));
    assert!(stdout.contains("+new line"));
}

#[test]
fn test_show_diff_skips_binary_files() {
    let fixture = TestFixture::new();
    fs::write(fixture.left_dir.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
    fs::write(fixture.right_dir.join("blob.bin"), [0u8, 1, 2, 4]).unwrap();

    let output = fixture.run("compare", &["--show-diff"]);
    assert_success(&output);
    assert!(!stdout_of(&output).contains("--- a/blob.bin"));
}

#[test]
fn test_mtime_only_difference_is_identical() {
    let fixture = TestFixture::new();
    fixture.create_left_file("stamp.txt", "same bytes");
    let right = fixture.create_right_file("stamp.txt", "same bytes");
    set_file_mtime(&right, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let report = fixture.run_json("compare", &[]);
    assert_eq!(status_of(&report, "stamp.txt"), Some("Identical"));
}

#[test]
fn test_thread_count_does_not_change_output() {
    let fixture = TestFixture::new();
    for i in 0..30 {
        let name = format!("d{}/f{:02}.txt", i % 3, i);
        fixture.create_left_file(&name, &format!("value {}", i));
        let right = if i % 4 == 0 {
            format!("VALUE {}", i)
        } else {
            format!("value {}", i)
        };
        fixture.create_right_file(&name, &right);
    }

    let single = fixture.run_json("compare", &["--threads", "1"]);
    let many = fixture.run_json("compare", &["--threads", "8"]);
    assert_eq!(single["entries"], many["entries"]);
    assert_eq!(single["summary"]["modified"], 8);
}

#[test]
fn test_exclude_flag_and_pattern_equivalence() {
    let fixture = TestFixture::new();
    fixture.create_both("keep.txt", "k");
    fixture.create_left_file("tmp/scratch.txt", "left scratch");
    fixture.create_right_file("build/tmp/other.txt", "right scratch");

    let bare = fixture.run_json("compare", &["--exclude", "tmp"]);
    let wrapped = fixture.run_json("compare", &["--exclude", "*/tmp/*"]);

    assert_eq!(bare["entries"], wrapped["entries"]);
    assert_eq!(bare["entries"].as_array().unwrap().len(), 1);
    assert_eq!(status_of(&bare, "keep.txt"), Some("Identical"));
}

#[test]
fn test_include_patterns_from_config() {
    let fixture = TestFixture::with_config(
        r#"
[directory_comparison]
include_patterns = ["*.conf"]

[structure_comparison]

[logging]
level = "warn"
"#,
    );
    fixture.create_both("app.conf", "a=1");
    fixture.create_left_file("binary.dat", "ignored");
    fixture.create_left_file("etc/nested.conf", "b=2");

    let report = fixture.run_json("compare", &[]);
    let paths: Vec<&str> = report["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["app.conf", "etc/nested.conf"]);
}

#[test]
fn test_max_files_marks_partial() {
    let fixture = TestFixture::new();
    for i in 0..5 {
        fixture.create_both(format!("f{}.txt", i), "x");
    }

    let report = fixture.run_json("compare", &["--max-files", "2"]);
    assert_eq!(report["partial"], true);
    assert_eq!(report["entries"].as_array().unwrap().len(), 2);
}

#[test]
fn test_structure_comparison() {
    let fixture = TestFixture::new();
    fs::create_dir_all(fixture.left_dir.join("docs")).unwrap();
    fs::create_dir_all(fixture.left_dir.join("src/core")).unwrap();
    fs::create_dir_all(fixture.right_dir.join("src/core")).unwrap();
    fs::create_dir_all(fixture.right_dir.join("assets")).unwrap();
    fixture.create_left_file("src/main.rs", "fn main() {}");

    let report = fixture.run_json("structure", &[]);
    assert_eq!(status_of(&report, "docs"), Some("Removed"));
    assert_eq!(status_of(&report, "src"), Some("Common"));
    assert_eq!(status_of(&report, "src/core"), Some("Common"));
    assert_eq!(status_of(&report, "assets"), Some("Added"));
    assert_eq!(status_of(&report, "src/main.rs"), None);
    assert_eq!(report["summary"]["common"], 2);

    let text = fixture.run("structure", &["--diff-only"]);
    assert_success(&text);
    let stdout = stdout_of(&text);
    assert!(stdout.contains("docs/"));
    assert!(!stdout.contains("src/core/"));
}

#[test]
fn test_missing_root_fails() {
    let fixture = TestFixture::new();
    let missing = fixture.temp_dir.path().join("missing");
    let output = run_cli(
        fixture.temp_dir.path(),
        &[
            "--config",
            fixture.config(),
            "compare",
            missing.to_str().unwrap(),
            fixture.right(),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot access root"));
}

#[test]
fn test_invalid_configuration_fails() {
    let fixture = TestFixture::with_config(
        r#"
[performance]
worker_threads = 0
"#,
    );
    let output = fixture.run("compare", &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("worker_threads"));
}

#[test]
fn test_malformed_pattern_fails() {
    let fixture = TestFixture::new();
    let output = fixture.run("compare", &["--exclude", "[broken"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid pattern"));
}

#[test]
fn test_init_and_show_config() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("conf/drivediff.toml");
    let path_str = path.to_str().unwrap();

    let first = run_cli(temp.path(), &["--config", path_str, "init-config"]);
    assert_success(&first);
    assert!(stdout_of(&first).contains("Wrote default configuration"));
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[directory_comparison]"));
    assert!(written.contains("/var/cache"));

    let second = run_cli(temp.path(), &["--config", path_str, "init-config"]);
    assert_success(&second);
    assert!(stdout_of(&second).contains("already exists"));

    fs::write(&path, "[performance]\nworker_threads = 3\n").unwrap();
    let shown = run_cli(temp.path(), &["--config", path_str, "show-config"]);
    assert_success(&shown);
    assert!(stdout_of(&shown).contains("worker_threads = 3"));

    let forced = run_cli(temp.path(), &["--config", path_str, "init-config", "--force"]);
    assert_success(&forced);
    assert!(fs::read_to_string(&path).unwrap().contains("worker_threads = 4"));
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_reported_as_error_entry() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TestFixture::new();
    fixture.create_both("ok.txt", "fine");
    let locked = fixture.create_left_file("locked.txt", "secret");
    fixture.create_right_file("locked.txt", "secret");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read it anyway; nothing to observe then
    if fs::File::open(&locked).is_ok() {
        return;
    }

    let report = fixture.run_json("compare", &[]);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(status_of(&report, "locked.txt"), Some("Error"));
    assert_eq!(status_of(&report, "ok.txt"), Some("Identical"));
    assert_eq!(report["outcome"]["CompletedWithErrors"], 1);
}
