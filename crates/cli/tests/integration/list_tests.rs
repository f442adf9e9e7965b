//! List and host command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn list_shows_targets_and_parameters() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("Pack (default): Create packages"))
    .stdout(predicate::str::contains("ApiKey (secret): Package feed API key"));
}

#[test]
fn list_with_explicit_file() {
  let env = TestEnv::from_fixture("build.toml");
  let other = env.temp.path().join("other.toml");
  std::fs::write(&other, "[[targets]]\nname = \"Lint\"\n").unwrap();

  env
    .keel_cmd()
    .arg("--file")
    .arg(&other)
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("Lint"))
    .stdout(predicate::str::contains("Pack").not());
}

#[test]
fn host_honors_override() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .env("KEEL_HOST", "gitlab")
    .arg("host")
    .assert()
    .success()
    .stdout(predicate::str::contains("Type: gitlab"))
    .stdout(predicate::str::contains("CI: yes"));
}

#[test]
fn unknown_host_flag_is_rejected() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["--host", "mainframe", "host"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("mainframe"));
}
