//! Target execution.
//!
//! The [`Engine`] walks an [`ExecutionPlan`] in order on the caller's thread:
//! - planned skips are reported and left alone
//! - a target whose dependency ended Failed or Aborted is Aborted
//! - a target whose dependency never ran (halted) stays NotRun
//! - otherwise the dynamic conditions are checked and the action runs
//!
//! Under [`FailurePolicy::StopOnFirstFailure`] the first failure halts the
//! plan; only targets flagged `assured_after_failure` still start.

mod capture;
pub mod fanout;
pub mod types;

use std::any::Any;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::host::HostType;
use crate::output::{OutputSink, Severity};
use crate::params::Parameters;
use crate::plan::{ExecutionPlan, ExecutionStatus, SkipReason};
use crate::target::TargetContext;
use crate::tool::ToolError;

pub use fanout::{FanOut, FanOutReport};
pub use types::{ExecuteError, FailurePolicy, RunReport};

/// Runs plans against one parameter set, sink and host.
pub struct Engine<'a> {
  params: &'a Parameters,
  sink: &'a dyn OutputSink,
  host: HostType,
}

/// How the engine got past one plan position.
enum Visit {
  /// Reported as skipped, aborted, or left alone.
  Settled,
  /// The action ran and failed.
  Failed { proceed: bool },
  /// The action ran and succeeded.
  Succeeded,
}

impl<'a> Engine<'a> {
  pub fn new(params: &'a Parameters, sink: &'a dyn OutputSink, host: HostType) -> Self {
    Self { params, sink, host }
  }

  /// Execute `plan` to completion and report the final states.
  pub fn run<R>(&self, mut plan: ExecutionPlan<R>) -> RunReport<R> {
    let policy = plan.policy();
    let started = Instant::now();
    let mut halted = false;

    info!(targets = plan.len(), ?policy, "starting execution");

    for pos in 0..plan.len() {
      match self.visit(&mut plan, pos, halted) {
        Visit::Failed { proceed } if !proceed && policy == FailurePolicy::StopOnFirstFailure && !halted => {
          warn!(target_name = %plan.targets()[pos].name(), "halting after failure");
          halted = true;
        }
        Visit::Failed { .. } | Visit::Settled | Visit::Succeeded => {}
      }
    }

    let report = RunReport::new(plan, started.elapsed());
    self.sink.summary(&report.summary());

    info!(
      succeeded = report.with_status(ExecutionStatus::Succeeded).len(),
      failed = report.with_status(ExecutionStatus::Failed).len(),
      aborted = report.with_status(ExecutionStatus::Aborted).len(),
      skipped = report.with_status(ExecutionStatus::Skipped).len(),
      not_run = report.with_status(ExecutionStatus::NotRun).len(),
      "execution complete"
    );
    report
  }

  fn visit<R>(&self, plan: &mut ExecutionPlan<R>, pos: usize, halted: bool) -> Visit {
    let current = &plan.targets()[pos];
    let name = current.name().to_string();

    if current.status() == ExecutionStatus::Skipped {
      debug!(target_name = %name, reason = ?current.skip_reason(), "skipping target");
      self.sink.target_finished(&name, ExecutionStatus::Skipped, None);
      return Visit::Settled;
    }

    let failed_dependency = current
      .dependencies()
      .iter()
      .map(|&d| &plan.targets()[d])
      .find(|dep| dep.status().is_failure())
      .map(|dep| dep.name().to_string());

    if let Some(dependency) = failed_dependency {
      warn!(target_name = %name, dependency = %dependency, "aborting target after failed dependency");
      plan.targets_mut()[pos].fail(
        ExecutionStatus::Aborted,
        ExecuteError::DependencyFailed {
          target: name.clone(),
          dependency,
        },
      );
      self.sink.target_finished(&name, ExecutionStatus::Aborted, None);
      return Visit::Settled;
    }

    let waiting = current
      .dependencies()
      .iter()
      .any(|&d| plan.targets()[d].status() == ExecutionStatus::NotRun);
    if waiting {
      debug!(target_name = %name, "dependency did not run, leaving target unvisited");
      return Visit::Settled;
    }

    let target = current.shared();
    if halted && !target.is_assured_after_failure() {
      debug!(target_name = %name, "execution halted, leaving target unvisited");
      return Visit::Settled;
    }

    if !target.dynamic_conditions_hold(self.params) {
      debug!(target_name = %name, "condition false at execution time");
      plan.targets_mut()[pos].skip(SkipReason::Condition);
      self.sink.target_finished(&name, ExecutionStatus::Skipped, None);
      return Visit::Settled;
    }

    plan.targets_mut()[pos].set_status(ExecutionStatus::Running);
    self.sink.target_started(&name);
    info!(target_name = %name, "running target");

    let ctx = TargetContext::new(&name, self.params, self.sink, self.host);
    let start = Instant::now();
    let outcome = capture::catch_quietly(|| target.invoke(&ctx));
    let duration = start.elapsed();

    let entry = &mut plan.targets_mut()[pos];
    entry.set_duration(duration);

    let failure = match outcome {
      Ok(Ok(())) => None,
      Ok(Err(err)) => Some(classify(&name, err)),
      Err(payload) => Some(ExecuteError::Panicked {
        target: name.clone(),
        message: panic_message(&*payload),
      }),
    };

    match failure {
      None => {
        entry.set_status(ExecutionStatus::Succeeded);
        info!(target_name = %name, ?duration, "target succeeded");
        self.sink.target_finished(&name, ExecutionStatus::Succeeded, Some(duration));
        Visit::Succeeded
      }
      Some(err) => {
        let message = self.params.secrets().redact(&err.to_string()).into_owned();
        error!(target_name = %name, error = %message, "target failed");
        self.sink.log(Severity::Error, &message);
        entry.fail(ExecutionStatus::Failed, err);
        self.sink.target_finished(&name, ExecutionStatus::Failed, Some(duration));
        Visit::Failed {
          proceed: target.is_proceed_after_failure(),
        }
      }
    }
  }
}

/// Keep structured errors the action propagated; wrap everything else.
fn classify(target: &str, err: anyhow::Error) -> ExecuteError {
  let err = match err.downcast::<ExecuteError>() {
    Ok(inner) => return inner,
    Err(err) => err,
  };
  match err.downcast::<ToolError>() {
    Ok(source) => ExecuteError::Tool {
      target: target.to_string(),
      source,
    },
    Err(err) => ExecuteError::ActionFailed {
      target: target.to_string(),
      message: format!("{err:#}"),
    },
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::testing::{Event, RecordingSink};
  use crate::params::ParameterSpec;
  use crate::plan::{Invocation, SkipList, build_plan};
  use crate::target::{Target, TargetRegistry};
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Counts action invocations per registered target.
  struct Harness {
    registry: TargetRegistry<&'static str>,
    calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
  }

  impl Harness {
    fn new() -> Self {
      Self {
        registry: TargetRegistry::new(),
        calls: Arc::default(),
      }
    }

    fn ok(mut self, name: &'static str, deps: &[&'static str]) -> Self {
      let calls = self.calls.clone();
      let target = Target::new(name, name).depends_on(deps.iter().copied()).executes(move |_| {
        calls.lock().unwrap().push(name);
        Ok(())
      });
      self.registry.add(target).unwrap();
      self
    }

    fn failing(mut self, name: &'static str, deps: &[&'static str]) -> Self {
      self.registry.add(failing_target(name, deps, self.calls.clone())).unwrap();
      self
    }

    fn with(mut self, target: Target<&'static str>) -> Self {
      self.registry.add(target).unwrap();
      self
    }

    fn run(&self, invocation: Invocation) -> (RunReport<&'static str>, RecordingSink) {
      self.run_with(&Parameters::default(), invocation)
    }

    fn run_with(&self, params: &Parameters, invocation: Invocation) -> (RunReport<&'static str>, RecordingSink) {
      let plan = build_plan(&self.registry, &invocation, params).unwrap();
      let sink = RecordingSink::default();
      let report = Engine::new(params, &sink, HostType::Terminal).run(plan);
      (report, sink)
    }

    fn calls(&self) -> Vec<&'static str> {
      self.calls.lock().unwrap().clone()
    }
  }

  fn failing_target(
    name: &'static str,
    deps: &[&'static str],
    calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
  ) -> Target<&'static str> {
    Target::new(name, name).depends_on(deps.iter().copied()).executes(move |_| {
      calls.lock().unwrap().push(name);
      anyhow::bail!("{name} exploded")
    })
  }

  #[test]
  fn runs_every_target_once_in_plan_order() {
    let h = Harness::new()
      .ok("Clean", &[])
      .ok("Compile", &["Clean"])
      .ok("Test", &["Compile", "Clean"]);
    let (report, _) = h.run(Invocation::new(["Test"]));

    assert_eq!(h.calls(), ["Clean", "Compile", "Test"]);
    assert!(report.is_success());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.with_status(ExecutionStatus::Succeeded).len(), 3);
  }

  #[test]
  fn failed_dependency_aborts_dependents() {
    let h = Harness::new()
      .ok("Clean", &[])
      .failing("Compile", &["Clean"])
      .ok("Pack", &["Compile"])
      .ok("Publish", &["Pack"]);
    let (report, _) = h.run(Invocation::new(["Publish"]));

    assert_eq!(h.calls(), ["Clean", "Compile"]);
    assert_eq!(report.status("Clean"), Some(ExecutionStatus::Succeeded));
    assert_eq!(report.status("Compile"), Some(ExecutionStatus::Failed));
    assert_eq!(report.status("Pack"), Some(ExecutionStatus::Aborted));
    assert_eq!(report.status("Publish"), Some(ExecutionStatus::Aborted));
    assert_eq!(report.exit_code(), 1);
  }

  #[test]
  fn stop_policy_leaves_independent_targets_not_run() {
    let h = Harness::new().failing("Lint", &[]).ok("Docs", &[]);
    let (report, _) = h.run(Invocation::new(["Lint", "Docs"]));

    assert_eq!(report.status("Lint"), Some(ExecutionStatus::Failed));
    assert_eq!(report.status("Docs"), Some(ExecutionStatus::NotRun));
    assert_eq!(h.calls(), ["Lint"]);
  }

  #[test]
  #[tracing_test::traced_test]
  fn halt_is_logged() {
    let h = Harness::new().failing("Lint", &[]).ok("Docs", &[]);
    h.run(Invocation::new(["Lint", "Docs"]));

    assert!(logs_contain("halting after failure"));
    assert!(logs_contain("Lint exploded"));
  }

  #[test]
  fn continue_policy_runs_independent_targets() {
    let h = Harness::new().failing("Lint", &[]).ok("Docs", &[]).ok("Site", &["Lint"]);
    let (report, _) = h.run(Invocation::new(["Lint", "Docs", "Site"]).policy(FailurePolicy::ContinueOnFailure));

    assert_eq!(report.status("Docs"), Some(ExecutionStatus::Succeeded));
    assert_eq!(report.status("Site"), Some(ExecutionStatus::Aborted));
    assert_eq!(report.exit_code(), 1);
  }

  #[test]
  fn proceed_after_failure_does_not_halt() {
    let calls = Arc::default();
    let h = Harness {
      registry: TargetRegistry::new(),
      calls: Arc::clone(&calls),
    }
    .with(failing_target("Coverage", &[], calls).proceed_after_failure())
    .ok("Pack", &[]);
    let (report, _) = h.run(Invocation::new(["Coverage", "Pack"]));

    assert_eq!(report.status("Coverage"), Some(ExecutionStatus::Failed));
    assert_eq!(report.status("Pack"), Some(ExecutionStatus::Succeeded));
  }

  #[test]
  fn assured_target_runs_after_halt() {
    let cleaned = Arc::new(AtomicUsize::new(0));
    let counter = cleaned.clone();
    let h = Harness::new()
      .failing("Compile", &[])
      .ok("Test", &[])
      .with(
        Target::new("Teardown", "Teardown")
          .assured_after_failure()
          .executes(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
          }),
      );
    let (report, _) = h.run(Invocation::new(["Compile", "Test", "Teardown"]));

    assert_eq!(report.status("Test"), Some(ExecutionStatus::NotRun));
    assert_eq!(report.status("Teardown"), Some(ExecutionStatus::Succeeded));
    assert_eq!(cleaned.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn dependent_of_halted_target_stays_not_run() {
    let h = Harness::new()
      .failing("Lint", &[])
      .ok("Compile", &[])
      .with(Target::new("Report", "Report").depends_on(["Compile"]).assured_after_failure());
    let (report, _) = h.run(Invocation::new(["Lint", "Report"]));

    assert_eq!(report.status("Compile"), Some(ExecutionStatus::NotRun));
    assert_eq!(report.status("Report"), Some(ExecutionStatus::NotRun));
  }

  #[test]
  fn explicit_skip_does_not_cascade() {
    let h = Harness::new().ok("Clean", &[]).ok("Compile", &["Clean"]);
    let (report, sink) = h.run(Invocation::new(["Compile"]).skip(SkipList::Only(vec!["Clean".to_string()])));

    assert_eq!(h.calls(), ["Compile"]);
    assert_eq!(report.status("Clean"), Some(ExecutionStatus::Skipped));
    assert_eq!(report.status("Compile"), Some(ExecutionStatus::Succeeded));
    assert_eq!(report.skipped(), [&"Clean"]);
    assert!(
      sink
        .events()
        .contains(&Event::Finished("Clean".to_string(), ExecutionStatus::Skipped))
    );
  }

  #[test]
  fn dynamic_condition_skips_at_execution_time() {
    let h = Harness::new()
      .with(Target::new("Sign", "Sign").only_when_dynamic(|p| p.is_set("Certificate")))
      .ok("Pack", &["Sign"]);
    let (report, _) = h.run(Invocation::new(["Pack"]));

    let sign = report.plan().get("Sign").unwrap();
    assert_eq!(sign.status(), ExecutionStatus::Skipped);
    assert_eq!(sign.skip_reason(), Some(SkipReason::Condition));
    assert_eq!(report.status("Pack"), Some(ExecutionStatus::Succeeded));
  }

  #[test]
  fn panicking_action_is_recorded_as_failed() {
    let h = Harness::new()
      .with(Target::new("Boom", "Boom").executes(|_| panic!("kaboom")))
      .ok("After", &["Boom"]);
    let (report, sink) = h.run(Invocation::new(["After"]));

    let boom = report.plan().get("Boom").unwrap();
    assert_eq!(boom.status(), ExecutionStatus::Failed);
    assert!(matches!(boom.failure(), Some(ExecuteError::Panicked { message, .. }) if message == "kaboom"));
    assert_eq!(report.status("After"), Some(ExecutionStatus::Aborted));
    assert!(sink.messages().iter().any(|(s, m)| *s == Severity::Error && m.contains("kaboom")));
  }

  fn publish_key() -> Parameters {
    Parameters::default()
      .declare(ParameterSpec::new("ApiKey").secret())
      .inject("ApiKey", "s3cr3t-XYZ")
  }

  #[test]
  #[tracing_test::traced_test]
  fn secret_in_failure_is_redacted_in_logs_and_sink() {
    let h = Harness::new().with(Target::new("Publish", "Publish").requires(["ApiKey"]).executes(|ctx| {
      let key: String = ctx.params().require("ApiKey")?;
      anyhow::bail!("push rejected for key {key}")
    }));
    let (report, sink) = h.run_with(&publish_key(), Invocation::new(["Publish"]));

    assert_eq!(report.status("Publish"), Some(ExecutionStatus::Failed));
    assert!(logs_contain("push rejected for key [REDACTED]"));
    assert!(!logs_contain("s3cr3t-XYZ"));
    assert!(sink.messages().iter().all(|(_, m)| !m.contains("s3cr3t-XYZ")));
  }

  #[test]
  #[tracing_test::traced_test]
  fn secret_in_panic_is_not_logged() {
    let h = Harness::new().with(Target::new("Publish", "Publish").executes(|ctx| {
      let key: String = ctx.params().require("ApiKey")?;
      panic!("push rejected for key {key}")
    }));
    let (report, sink) = h.run_with(&publish_key(), Invocation::new(["Publish"]));

    assert_eq!(report.status("Publish"), Some(ExecutionStatus::Failed));
    assert!(logs_contain("panic captured"));
    assert!(!logs_contain("s3cr3t-XYZ"));
    assert!(sink.messages().iter().any(|(s, m)| *s == Severity::Error && m.contains("[REDACTED]")));
  }

  #[test]
  fn tool_errors_keep_their_type() {
    let h = Harness::new().with(
      Target::new("Zip", "Zip").executes(|_| Err(ToolError::NotFound("zip".to_string()).into())),
    );
    let (report, _) = h.run(Invocation::new(["Zip"]));

    assert!(matches!(
      report.plan().get("Zip").unwrap().failure(),
      Some(ExecuteError::Tool { .. })
    ));
  }

  #[test]
  fn summary_covers_every_plan_target() {
    let h = Harness::new().failing("Compile", &[]).ok("Pack", &["Compile"]);
    let (_, sink) = h.run(Invocation::new(["Pack"]));

    let rows = sink
      .events()
      .into_iter()
      .find_map(|e| match e {
        Event::Summary(rows) => Some(rows),
        _ => None,
      })
      .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].status, ExecutionStatus::Aborted);
    assert!(rows[1].note.as_deref().unwrap().contains("Compile"));
  }

  #[test]
  fn lifecycle_events_bracket_the_action() {
    let h = Harness::new().ok("Compile", &[]);
    let (_, sink) = h.run(Invocation::new(["Compile"]));

    let events = sink.events();
    assert_eq!(events[0], Event::Started("Compile".to_string()));
    assert_eq!(
      events[1],
      Event::Finished("Compile".to_string(), ExecutionStatus::Succeeded)
    );
  }
}
