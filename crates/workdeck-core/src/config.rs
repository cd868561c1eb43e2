//! Terminal runtime configuration.
//!
//! Mirrors the `terminal` section of the server config file. Durations are
//! Go-style strings (`"10m"`, `"90s"`, `"0s"`) so existing config files keep
//! working; unparsable values fall back to the 10 minute default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TerminalError;

/// Per-OS shell command lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    pub windows: String,
    pub linux: String,
    pub darwin: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            windows: "pwsh.exe -NoLogo".to_string(),
            linux: "/bin/bash".to_string(),
            darwin: "/bin/zsh".to_string(),
        }
    }
}

impl ShellConfig {
    /// Resolve the shell argv for the current platform.
    pub fn resolve(&self) -> Result<Vec<String>, TerminalError> {
        let configured = if cfg!(target_os = "windows") {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.darwin
        } else {
            &self.linux
        };

        let line = if configured.trim().is_empty() {
            let defaults = ShellConfig::default();
            if cfg!(target_os = "windows") {
                defaults.windows
            } else if cfg!(target_os = "macos") {
                defaults.darwin
            } else {
                defaults.linux
            }
        } else {
            configured.clone()
        };

        let command = split_command_line(&line);
        if command.is_empty() {
            return Err(TerminalError::InvalidArgs("shell command is required"));
        }
        Ok(command)
    }
}

/// Runtime constraints for terminal sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalConfig {
    pub shell: ShellConfig,
    /// Idle session reaping threshold; `"0s"` disables the reaper.
    pub idle_timeout: String,
    /// Per-project session quota; 0 means unlimited.
    pub max_sessions_per_project: usize,
    /// Shell byte encoding: utf-8, gbk, gb18030 or gb2312.
    pub encoding: String,
    /// Scrollback cap in bytes; values <= 0 disable scrollback.
    pub scrollback_bytes: i64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            idle_timeout: "10m".to_string(),
            max_sessions_per_project: 12,
            encoding: "utf-8".to_string(),
            scrollback_bytes: 262_144,
        }
    }
}

impl TerminalConfig {
    /// Parsed idle timeout, falling back to 10 minutes on bad input.
    pub fn idle_duration(&self) -> Duration {
        if self.idle_timeout.trim().is_empty() {
            return Duration::from_secs(600);
        }
        parse_duration(&self.idle_timeout).unwrap_or(Duration::from_secs(600))
    }
}

/// Parse a Go-style duration string: integer segments with `h`, `m`, `s`
/// or `ms` units, e.g. `"10m"`, `"1h30m"`, `"500ms"`. A bare `"0"` is valid.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Some(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits_end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)?;
        if digits_end == 0 {
            return None;
        }
        let value: u64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];

        let (unit_len, unit) = if rest.starts_with("ms") {
            (2, Duration::from_millis(value))
        } else if rest.starts_with('h') {
            (1, Duration::from_secs(value * 3600))
        } else if rest.starts_with('m') {
            (1, Duration::from_secs(value * 60))
        } else if rest.starts_with('s') {
            (1, Duration::from_secs(value))
        } else {
            return None;
        };
        total += unit;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Split a command line into argv, honoring single/double quotes and
/// backslash escapes outside single quotes.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            '\\' if !in_single => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                    has_token = true;
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}
