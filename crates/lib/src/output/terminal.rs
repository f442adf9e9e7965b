//! Interactive console backend.

use std::time::Duration;

use owo_colors::{OwoColorize, Stream, Style};

use super::{Channel, OutputSink, Severity, TargetSummary, format_duration, summary_lines, symbols};
use crate::plan::ExecutionStatus;

/// When the terminal backend emits ANSI colors.
#[derive(Debug, Clone, Copy)]
pub enum ColorMode {
  Never,
  Always,
  /// Ask owo-colors whether the stream supports color (tty, `NO_COLOR`, ...).
  Detect(Stream),
}

/// Human-oriented output with optional ANSI colors.
pub struct TerminalSink {
  channel: Channel,
  color: ColorMode,
}

impl TerminalSink {
  pub fn new(channel: Channel, color: ColorMode) -> Self {
    Self { channel, color }
  }

  fn paint(&self, text: &str, style: Style) -> String {
    match self.color {
      ColorMode::Never => text.to_string(),
      ColorMode::Always => text.style(style).to_string(),
      ColorMode::Detect(stream) => text.if_supports_color(stream, |t| t.style(style)).to_string(),
    }
  }
}

impl OutputSink for TerminalSink {
  fn target_started(&self, name: &str) {
    self.channel.line("");
    self.channel.line(&format!(
      "{} {}",
      self.paint(symbols::ARROW, Style::new().cyan().bold()),
      self.paint(name, Style::new().bold())
    ));
  }

  fn target_finished(&self, name: &str, status: ExecutionStatus, duration: Option<Duration>) {
    let elapsed = duration.map(|d| format!(" ({})", format_duration(d))).unwrap_or_default();
    let line = match status {
      ExecutionStatus::Succeeded => format!("{} {name}{elapsed}", self.paint(symbols::SUCCESS, Style::new().green())),
      ExecutionStatus::Failed => self.paint(&format!("{} {name} failed{elapsed}", symbols::ERROR), Style::new().red()),
      ExecutionStatus::Aborted => self.paint(&format!("{} {name} aborted", symbols::ERROR), Style::new().red()),
      ExecutionStatus::Skipped => self.paint(&format!("{} {name} skipped", symbols::INFO), Style::new().dimmed()),
      ExecutionStatus::NotRun | ExecutionStatus::Running => format!("{} {name} {status}", symbols::INFO),
    };
    self.channel.line(&line);
  }

  fn log(&self, severity: Severity, message: &str) {
    let line = match severity {
      Severity::Debug => self.paint(&format!("  {message}"), Style::new().dimmed()),
      Severity::Info => format!("  {message}"),
      Severity::Warning => self.paint(&format!("{} {message}", symbols::WARNING), Style::new().yellow()),
      Severity::Error => self.paint(&format!("{} {message}", symbols::ERROR), Style::new().red()),
    };
    self.channel.line(&line);
  }

  fn summary(&self, rows: &[TargetSummary]) {
    self.channel.line("");
    let lines = summary_lines(rows);
    let last = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
      if i == last {
        let style = if rows.iter().any(|r| r.status.is_failure()) {
          Style::new().red().bold()
        } else {
          Style::new().green().bold()
        };
        self.channel.line(&self.paint(line, style));
      } else {
        self.channel.line(line);
      }
    }
  }
}
