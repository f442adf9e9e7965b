//! Implementation of the `keel run` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use keel_lib::execute::{Engine, FailurePolicy};
use keel_lib::output::{format_duration, select_sink};
use keel_lib::plan::{ExecutionStatus, build_plan};

use super::Session;
use crate::Selection;
use crate::output::{print_error, print_success, print_warning};

/// Run the selected targets; returns the process exit code.
pub fn cmd_run(file: &Path, host: Option<&str>, selection: &Selection, continue_on_failure: bool) -> Result<i32> {
  let session = Session::load(file, host, &selection.params)?;
  let registry = session.registry()?;

  let policy = if continue_on_failure {
    FailurePolicy::ContinueOnFailure
  } else {
    FailurePolicy::StopOnFirstFailure
  };
  let invocation = selection.invocation().policy(policy);
  let plan = build_plan(&registry, &invocation, &session.params).context("Failed to build execution plan")?;

  info!(host = %session.host, "running build");
  let sink = select_sink(session.host, session.secrets.clone());
  let report = Engine::new(&session.params, sink.as_ref(), session.host).run(plan);

  let elapsed = format_duration(report.elapsed());
  if report.is_success() {
    print_success(&format!("Build succeeded in {elapsed}"));
  } else {
    let failed = report.with_status(ExecutionStatus::Failed);
    print_error(&format!("Build failed in {elapsed}: {}", failed.join(", ")));
  }

  let not_run = report.with_status(ExecutionStatus::NotRun);
  if !not_run.is_empty() {
    print_warning(&format!("Not run: {}", not_run.join(", ")));
  }
  Ok(report.exit_code())
}
