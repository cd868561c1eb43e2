//! Claude Code output patterns.
//!
//! The CLI renders a spinner status line while working, e.g.
//! `✻ Brewing… (esc to interrupt · 54s · ↓ 2.2k tokens)`, and
//! `∴ Thinking…` / `∴ Thought for 4s (ctrl+o to show thinking)` around
//! extended thinking. `(esc to interrupt` is the busy marker the debouncer
//! keys on.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ansi::clean_line;
use super::event::{compile, detect_from_json, match_any};
use super::types::AssistantState;

struct ClaudeCodePatterns {
    thinking: Vec<Regex>,
    executing: Vec<Regex>,
    waiting_approval: Vec<Regex>,
    replying: Vec<Regex>,
    waiting_input: Vec<Regex>,
    busy: Regex,
}

static PATTERNS: Lazy<ClaudeCodePatterns> = Lazy::new(|| ClaudeCodePatterns {
    thinking: compile(&[
        r"∴\s*Thinking",
        r"∴\s*Thought\s+for\s+[\d\w]+.*\(ctrl\+o\s+to\s+show\s+thinking\)",
        r"(?i)\(esc\s+to\s+interrupt",
    ]),
    executing: compile(&[
        r#"(?i)"type"\s*:\s*"tool[_\s-]?use""#,
        r#"(?i)"kind"\s*:\s*"execute""#,
        r"(?i)tool[_\s-]?(call|use|execution)",
    ]),
    waiting_approval: compile(&[
        r"(?i)Do\s+you\s+want\s+to\s+proceed\?",
        r"(?i)❯\s*\d+\.\s*Yes",
        r"(?i)proceed\?\s*\([yn]/[yn]\)",
        r"(?i)request[_\s-]?permission",
    ]),
    replying: compile(&[
        r#"(?i)"type"\s*:\s*"(assistant[_\s-]?)?message""#,
        r"(?i)agent[_\s-]?message",
    ]),
    waiting_input: compile(&[
        // ⎿ Interrupted · What should Claude do instead?
        r"(?i)interrupted",
        r#"(?i)"done"\s*:\s*true"#,
        r#"(?i)"stop[_\s-]?reason""#,
    ]),
    busy: Regex::new(r"(?i)\(esc\s+to\s+interrupt").expect("busy pattern"),
});

/// Detect state from a line of Claude Code output.
pub fn detect_claude_code_state(line: &str) -> AssistantState {
    if line.is_empty() {
        return AssistantState::Unknown;
    }

    let state = detect_from_json(line);
    if state != AssistantState::Unknown {
        return state;
    }

    let cleaned = clean_line(line);
    if cleaned.is_empty() {
        return AssistantState::Unknown;
    }

    let patterns = &*PATTERNS;
    if match_any(&cleaned, &patterns.waiting_approval) {
        return AssistantState::WaitingApproval;
    }
    if match_any(&cleaned, &patterns.executing) {
        return AssistantState::Executing;
    }
    if match_any(&cleaned, &patterns.thinking) {
        return AssistantState::Thinking;
    }
    if match_any(&cleaned, &patterns.replying) {
        return AssistantState::Replying;
    }
    if match_any(&cleaned, &patterns.waiting_input) {
        return AssistantState::WaitingInput;
    }

    AssistantState::Unknown
}

/// Whether the line carries Claude Code's `(esc to interrupt` busy marker.
pub fn detect_claude_code_busy(line: &str) -> bool {
    PATTERNS.busy.is_match(&clean_line(line))
}

/// Human-readable description of a Claude Code state.
pub fn claude_code_state_description(state: AssistantState) -> &'static str {
    match state {
        AssistantState::Thinking => "Claude Code is thinking",
        AssistantState::Executing => "Claude Code is executing a tool",
        AssistantState::WaitingApproval => "Claude Code is waiting for approval",
        AssistantState::Replying => "Claude Code is replying",
        AssistantState::WaitingInput => "Claude Code is waiting for input",
        AssistantState::Unknown => "Unknown state",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thinking_formats() {
        assert_eq!(
            detect_claude_code_state("∴ Thinking…"),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_claude_code_state("∴ Thought for 4s (ctrl+o to show thinking)"),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_claude_code_state("✻ Brewing… (esc to interrupt · 54s · ↓ 2.2k tokens)"),
            AssistantState::Thinking
        );
    }

    #[test]
    fn test_waiting_approval_has_priority() {
        assert_eq!(
            detect_claude_code_state("Do you want to proceed?"),
            AssistantState::WaitingApproval
        );
        assert_eq!(
            detect_claude_code_state("❯ 1. Yes, allow this action"),
            AssistantState::WaitingApproval
        );
    }

    #[test]
    fn test_interrupted_is_waiting_input() {
        assert_eq!(
            detect_claude_code_state("⎿ Interrupted · What should Claude do instead?"),
            AssistantState::WaitingInput
        );
    }

    #[test]
    fn test_regular_output_is_unknown() {
        assert_eq!(
            detect_claude_code_state("Here is the summary of changes"),
            AssistantState::Unknown
        );
        assert_eq!(detect_claude_code_state(""), AssistantState::Unknown);
    }

    #[test]
    fn test_busy_marker() {
        assert!(detect_claude_code_busy(
            "✻ Brewing… (esc to interrupt · 5s · ↑ 1.2k tokens)"
        ));
        assert!(detect_claude_code_busy(
            "\x1b[2m(esc to interrupt · 10s)\x1b[0m"
        ));
        // Codex puts the marker at the end of the parens; that is not ours
        assert!(!detect_claude_code_busy("◦ Working (5s • esc to interrupt)"));
        assert!(!detect_claude_code_busy("regular line"));
    }

    #[test]
    fn test_state_descriptions() {
        assert_eq!(
            claude_code_state_description(AssistantState::Thinking),
            "Claude Code is thinking"
        );
        assert_eq!(
            claude_code_state_description(AssistantState::Unknown),
            "Unknown state"
        );
    }
}
