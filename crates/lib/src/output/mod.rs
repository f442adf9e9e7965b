//! Status reporting.
//!
//! An [`OutputSink`] receives target lifecycle events, log messages and the
//! final summary. [`select_sink`] picks the backend for the detected host and
//! wraps it so that severe messages always reach stderr and secret values never
//! reach any writer.

pub mod ci;
pub mod decorate;
pub mod terminal;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use owo_colors::Stream;
use tracing::debug;

use crate::host::HostType;
use crate::params::SecretStore;
use crate::plan::ExecutionStatus;

pub use ci::{CiFlavor, CiSink};
pub use decorate::{Escalating, Redacting};
pub use terminal::{ColorMode, TerminalSink};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
  Debug,
  Info,
  Warning,
  Error,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Debug => "debug",
      Severity::Info => "info",
      Severity::Warning => "warning",
      Severity::Error => "error",
    }
  }
}

/// One row of the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSummary {
  pub name: String,
  pub status: ExecutionStatus,
  pub duration: Option<Duration>,
  /// Skip reason or failure message.
  pub note: Option<String>,
}

/// Backend that renders build status.
pub trait OutputSink: Send + Sync {
  fn target_started(&self, name: &str);

  fn target_finished(&self, name: &str, status: ExecutionStatus, duration: Option<Duration>);

  fn log(&self, severity: Severity, message: &str);

  fn summary(&self, rows: &[TargetSummary]);
}

/// Line-oriented writer shared by sinks.
pub struct Channel {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl Channel {
  pub fn new(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
    }
  }

  pub fn stdout() -> Self {
    Self::new(io::stdout())
  }

  pub fn stderr() -> Self {
    Self::new(io::stderr())
  }

  pub fn line(&self, text: &str) {
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = writeln!(writer, "{text}").and_then(|_| writer.flush()) {
      debug!(error = %e, "failed to write output line");
    }
  }
}

/// In-memory writer whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
  buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contents(&self) -> String {
    let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&buffer).into_owned()
  }
}

impl Write for MemoryWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self
      .buffer
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Sink for `host` writing to stdout, escalating to stderr.
pub fn select_sink(host: HostType, secrets: SecretStore) -> Box<dyn OutputSink> {
  build_sink(host, secrets, Channel::stdout(), Channel::stderr(), ColorMode::Detect(Stream::Stdout))
}

/// Sink for `host` writing to the given channels, without color.
pub fn select_sink_with(host: HostType, secrets: SecretStore, primary: Channel, secondary: Channel) -> Box<dyn OutputSink> {
  build_sink(host, secrets, primary, secondary, ColorMode::Never)
}

fn build_sink(
  host: HostType,
  secrets: SecretStore,
  primary: Channel,
  secondary: Channel,
  color: ColorMode,
) -> Box<dyn OutputSink> {
  let inner: Box<dyn OutputSink> = match CiFlavor::for_host(host) {
    Some(flavor) => Box::new(CiSink::new(flavor, primary)),
    None => Box::new(TerminalSink::new(primary, color)),
  };
  debug!(host = %host, "selected output sink");

  Box::new(Redacting::new(Box::new(Escalating::new(inner, secondary)), secrets))
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Plain-text summary table shared by all backends.
pub(crate) fn summary_lines(rows: &[TargetSummary]) -> Vec<String> {
  let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max("Target".len());
  let status_width = rows
    .iter()
    .map(|r| r.status.as_str().len())
    .max()
    .unwrap_or(0)
    .max("Status".len());

  let mut lines = Vec::with_capacity(rows.len() + 4);
  let header = format!("{:<name_width$}  {:<status_width$}  Duration", "Target", "Status");
  lines.push("─".repeat(header.chars().count()));
  lines.push(header);
  lines.push("─".repeat(lines[0].chars().count()));

  let mut total = Duration::ZERO;
  for row in rows {
    let duration = match row.duration {
      Some(d) => {
        total += d;
        format_duration(d)
      }
      None => "-".to_string(),
    };
    let mut line = format!("{:<name_width$}  {:<status_width$}  {}", row.name, row.status.as_str(), duration);
    if let Some(note) = &row.note {
      line.push_str(&format!("  ({note})"));
    }
    lines.push(line);
  }

  lines.push("─".repeat(lines[0].chars().count()));
  lines.push(format!("{:<name_width$}  {:<status_width$}  {}", "Total", "", format_duration(total)));

  let failed = rows.iter().filter(|r| r.status.is_failure()).count();
  if failed == 0 {
    lines.push("Build succeeded".to_string());
  } else {
    lines.push(format!("Build failed: {failed} target(s) failed or aborted"));
  }
  lines
}
