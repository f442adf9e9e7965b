//! Sink decorators.

use std::time::Duration;

use super::{Channel, OutputSink, Severity, TargetSummary};
use crate::params::SecretStore;
use crate::plan::ExecutionStatus;

/// Forwards everything to `inner` and additionally copies messages at or
/// above the threshold to a secondary channel (stderr by default).
pub struct Escalating {
  inner: Box<dyn OutputSink>,
  secondary: Channel,
  threshold: Severity,
}

impl Escalating {
  pub fn new(inner: Box<dyn OutputSink>, secondary: Channel) -> Self {
    Self {
      inner,
      secondary,
      threshold: Severity::Error,
    }
  }

  pub fn with_threshold(mut self, threshold: Severity) -> Self {
    self.threshold = threshold;
    self
  }
}

impl OutputSink for Escalating {
  fn target_started(&self, name: &str) {
    self.inner.target_started(name);
  }

  fn target_finished(&self, name: &str, status: ExecutionStatus, duration: Option<Duration>) {
    self.inner.target_finished(name, status, duration);
  }

  fn log(&self, severity: Severity, message: &str) {
    self.inner.log(severity, message);
    if severity >= self.threshold {
      self.secondary.line(&format!("{}: {message}", severity.as_str()));
    }
  }

  fn summary(&self, rows: &[TargetSummary]) {
    self.inner.summary(rows);
  }
}

/// Replaces registered secret values before anything reaches `inner`.
///
/// Secrets registered after construction are honored as well, since the
/// store is shared.
pub struct Redacting {
  inner: Box<dyn OutputSink>,
  secrets: SecretStore,
}

impl Redacting {
  pub fn new(inner: Box<dyn OutputSink>, secrets: SecretStore) -> Self {
    Self { inner, secrets }
  }
}

impl OutputSink for Redacting {
  fn target_started(&self, name: &str) {
    self.inner.target_started(&self.secrets.redact(name));
  }

  fn target_finished(&self, name: &str, status: ExecutionStatus, duration: Option<Duration>) {
    self.inner.target_finished(&self.secrets.redact(name), status, duration);
  }

  fn log(&self, severity: Severity, message: &str) {
    self.inner.log(severity, &self.secrets.redact(message));
  }

  fn summary(&self, rows: &[TargetSummary]) {
    if self.secrets.is_empty() {
      return self.inner.summary(rows);
    }

    let redacted: Vec<TargetSummary> = rows
      .iter()
      .map(|row| TargetSummary {
        name: self.secrets.redact(&row.name).into_owned(),
        note: row.note.as_deref().map(|n| self.secrets.redact(n).into_owned()),
        ..row.clone()
      })
      .collect();
    self.inner.summary(&redacted);
  }
}
