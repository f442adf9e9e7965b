//! Run command integration tests.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
fn run_default_target_with_dependencies() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .arg("run")
    .assert()
    .success()
    .stdout(predicate::str::contains("✓ Clean"))
    .stdout(predicate::str::contains("compiling Release"))
    .stdout(predicate::str::contains("✓ Pack"))
    .stdout(predicate::str::contains("Publish").not());
}

#[test]
fn run_in_dependency_order() {
  let env = TestEnv::from_fixture("build.toml");

  let output = env.keel_cmd().args(["run", "Pack"]).output().unwrap();
  assert!(output.status.success());

  let stdout = String::from_utf8_lossy(&output.stdout);
  let clean = stdout.find("→ Clean").unwrap();
  let compile = stdout.find("→ Compile").unwrap();
  let pack = stdout.find("→ Pack").unwrap();
  assert!(clean < compile && compile < pack, "unexpected order:\n{stdout}");
}

#[test]
fn command_line_parameter_overrides_default() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["run", "Compile", "-p", "Configuration=Debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains("compiling Debug"));
}

#[test]
#[serial]
fn environment_parameter_is_used() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .env("KEEL_CONFIGURATION", "Staging")
    .args(["run", "Compile"])
    .assert()
    .success()
    .stdout(predicate::str::contains("compiling Staging"));
}

#[test]
fn parameters_file_is_read_from_definition_directory() {
  let env = TestEnv::from_fixture("build.toml");
  env.write_file(".keel/parameters.json", r#"{ "Configuration": "FromFile" }"#);

  env
    .keel_cmd()
    .args(["run", "Compile"])
    .assert()
    .success()
    .stdout(predicate::str::contains("compiling FromFile"));
}

#[test]
fn missing_required_parameter_is_config_error() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["run", "Publish"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("ApiKey"))
    .stdout(predicate::str::contains("→").not());
}

#[test]
fn secret_value_never_reaches_output() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["run", "Publish", "-p", "ApiKey=s3cr3t-value", "-v"])
    .assert()
    .success()
    .stdout(predicate::str::contains("pushing with key [REDACTED]"))
    .stdout(predicate::str::contains("s3cr3t-value").not())
    .stderr(predicate::str::contains("s3cr3t-value").not());
}

#[test]
fn failure_aborts_dependents_and_exits_one() {
  let env = TestEnv::from_fixture("failing.toml");

  env
    .keel_cmd()
    .args(["run", "Publish", "Test"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("✗ Compile failed"))
    .stdout(predicate::str::contains("✗ Publish aborted"))
    .stdout(predicate::str::contains("should-not-run").not())
    .stdout(predicate::str::contains("testing").not())
    .stderr(predicate::str::contains("compile error CS1002"))
    .stderr(predicate::str::contains("Not run: Test"));
}

#[test]
fn continue_runs_independent_targets() {
  let env = TestEnv::from_fixture("failing.toml");

  env
    .keel_cmd()
    .args(["run", "Publish", "Test", "--continue"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("testing"))
    .stdout(predicate::str::contains("✗ Publish aborted"));
}

#[test]
fn skip_named_target() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["run", "Pack", "--skip=Clean"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean skipped"))
    .stdout(predicate::str::contains("cleaning").not())
    .stdout(predicate::str::contains("✓ Compile"));
}

#[test]
fn bare_skip_runs_only_requested_targets() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["run", "Pack", "--skip"])
    .assert()
    .success()
    .stdout(predicate::str::contains("✓ Pack"))
    .stdout(predicate::str::contains("Clean skipped"))
    .stdout(predicate::str::contains("Compile skipped"));
}

#[test]
fn github_actions_host_groups_output() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["--host", "github-actions", "run", "Clean"])
    .assert()
    .success()
    .stdout(predicate::str::contains("::group::Clean"))
    .stdout(predicate::str::contains("::endgroup::"));
}
