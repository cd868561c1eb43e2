//! Qwen Code output patterns.
//!
//! Qwen shows a braille spinner plus `(esc to cancel` while working:
//! `⠋ Finding a suitable loading screen pun... (esc to cancel, 11s)`.
//! The `✦` prefix on finished messages is output formatting, not a state
//! indicator; completion is inferred from the busy marker disappearing.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ansi::clean_line;
use super::event::{compile, match_any};
use super::types::AssistantState;

struct QwenPatterns {
    thinking: Vec<Regex>,
    busy: Regex,
}

static PATTERNS: Lazy<QwenPatterns> = Lazy::new(|| QwenPatterns {
    thinking: compile(&[r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]\s+.*\(esc to cancel"]),
    busy: Regex::new(r"\(esc to cancel").expect("busy pattern"),
});

/// Detect state from a line of Qwen Code output.
///
/// Whether the `✦` line marks Replying or is a display artefact is still
/// undecided, so it stays Unknown here.
pub fn detect_qwen_state(line: &str) -> AssistantState {
    if line.is_empty() {
        return AssistantState::Unknown;
    }

    let cleaned = clean_line(line);
    if cleaned.is_empty() {
        return AssistantState::Unknown;
    }

    if match_any(&cleaned, &PATTERNS.thinking) {
        return AssistantState::Thinking;
    }

    AssistantState::Unknown
}

/// Whether the line carries Qwen's `(esc to cancel` marker.
pub fn detect_qwen_busy(line: &str) -> bool {
    PATTERNS.busy.is_match(&clean_line(line))
}

/// Human-readable description of a Qwen state.
pub fn qwen_state_description(state: AssistantState) -> &'static str {
    match state {
        AssistantState::Thinking => "Qwen is thinking",
        AssistantState::Executing => "Qwen is executing a command",
        AssistantState::WaitingApproval => "Qwen is waiting for approval",
        AssistantState::Replying => "Qwen is replying",
        AssistantState::WaitingInput => "Qwen is waiting for input",
        AssistantState::Unknown => "Unknown state",
    }
}
