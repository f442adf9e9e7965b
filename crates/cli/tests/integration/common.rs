//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding a `keel.toml`.
pub struct TestEnv {
  pub temp: TempDir,
  pub definition_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file.
  pub fn from_fixture(name: &str) -> Self {
    Self::from_content(&fixture_content(name))
  }

  pub fn from_content(content: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let definition_path = temp.path().join("keel.toml");
    std::fs::write(&definition_path, content).unwrap();
    Self { temp, definition_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Get a pre-configured Command for the keel binary.
  ///
  /// Runs inside the temp directory with the host forced to `terminal`, so
  /// CI variables of the machine running the tests do not change the output.
  pub fn keel_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("keel");
    cmd.current_dir(self.temp.path());
    cmd.env("KEEL_HOST", "terminal");
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("RUST_LOG");
    for name in ["APIKEY", "API_KEY", "KEEL_APIKEY", "KEEL_API_KEY", "CONFIGURATION", "KEEL_CONFIGURATION"] {
      cmd.env_remove(name);
    }
    cmd
  }
}
