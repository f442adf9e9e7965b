//! Test helpers producing shell scripts for the platform shell.

/// Script that prints `msg` on stdout.
#[cfg(unix)]
pub fn echo_cmd(msg: &str) -> String {
  format!("echo {msg}")
}

#[cfg(windows)]
pub fn echo_cmd(msg: &str) -> String {
  format!("Write-Output {msg}")
}

/// Script that exits with `code`.
pub fn failing_cmd(code: i32) -> String {
  format!("exit {code}")
}

/// Script that creates an empty file in the working directory.
#[cfg(unix)]
pub fn touch_cmd(filename: &str) -> String {
  format!("touch {filename}")
}

#[cfg(windows)]
pub fn touch_cmd(filename: &str) -> String {
  format!("New-Item -ItemType File -Path '{filename}' -Force | Out-Null")
}
