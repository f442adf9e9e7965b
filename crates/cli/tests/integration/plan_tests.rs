//! Plan command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_lists_execution_order() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["plan", "Pack"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Plan: 3 target(s) on terminal"))
    .stdout(predicate::str::contains("1. • Clean"))
    .stdout(predicate::str::contains("3. → Pack <- Compile"));
}

#[test]
fn plan_marks_skipped_targets() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["plan", "Pack", "--skip=Clean"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean (skipped: skip requested)"));
}

#[test]
fn plan_redacts_secret_parameters() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["plan", "Publish", "-p", "ApiKey=s3cr3t-value"])
    .assert()
    .success()
    .stdout(predicate::str::contains("[REDACTED]"))
    .stdout(predicate::str::contains("s3cr3t-value").not());
}

#[test]
fn plan_json_output() {
  let env = TestEnv::from_fixture("build.toml");

  let output = env.keel_cmd().args(["plan", "Pack", "--json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = json["targets"]
    .as_array()
    .unwrap()
    .iter()
    .map(|t| t["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, ["Clean", "Compile", "Pack"]);
  assert_eq!(json["targets"][2]["invoked"], true);
  assert_eq!(json["targets"][2]["depends_on"][0], "Compile");
}

#[test]
fn plan_reports_cycle() {
  let env = TestEnv::from_fixture("cycle.toml");

  env
    .keel_cmd()
    .args(["plan", "A"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("A").and(predicate::str::contains("B")))
    .stderr(predicate::str::contains("cycle"));
}

#[test]
fn plan_unknown_target() {
  let env = TestEnv::from_fixture("build.toml");

  env
    .keel_cmd()
    .args(["plan", "Deploy"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Deploy"));
}
