//! OpenAI Codex output patterns.
//!
//! Codex renders `[symbol] [action] ([time] • esc to interrupt)` while
//! working, e.g. `◦ Working (5s • esc to interrupt)`. Only the trailing
//! `esc to interrupt)` is stable across redraws, so that is both the
//! Thinking signal and the busy marker.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ansi::clean_line;
use super::event::{compile, detect_from_json, match_any};
use super::types::AssistantState;

struct CodexPatterns {
    thinking: Vec<Regex>,
    executing: Vec<Regex>,
    waiting_approval: Vec<Regex>,
    replying: Vec<Regex>,
    waiting_input: Vec<Regex>,
    busy: Regex,
}

static PATTERNS: Lazy<CodexPatterns> = Lazy::new(|| CodexPatterns {
    thinking: compile(&[r"(?i)esc\s+to\s+interrupt\)"]),
    executing: compile(&[
        r#"(?i)"type"\s*:\s*"tool[_\s-]?use""#,
        r#"(?i)"kind"\s*:\s*"execute""#,
        r"(?i)tool[_\s-]?(call|use|execution)",
    ]),
    waiting_approval: compile(&[
        r"(?i)proceed\?\s*\([yn]/[yn]\)",
        r"(?i)request[_\s-]?permission",
        r"(?i)approve|confirm.*\?",
    ]),
    replying: compile(&[
        r#"(?i)"type"\s*:\s*"(assistant[_\s-]?)?message""#,
        r"(?i)agent[_\s-]?message",
    ]),
    waiting_input: compile(&[
        r#"(?i)"done"\s*:\s*true"#,
        r#"(?i)"stop[_\s-]?reason""#,
        r"(?i)■\s*Conversation\s+interrupted",
        r"(?i)tell\s+the\s+model\s+what\s+to\s+do\s+differently",
    ]),
    busy: Regex::new(r"(?i)esc\s+to\s+interrupt\)").expect("busy pattern"),
});

/// Detect state from a line of Codex output.
pub fn detect_codex_state(line: &str) -> AssistantState {
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

/// Whether the line carries Codex's trailing `esc to interrupt)` marker.
pub fn detect_codex_busy(line: &str) -> bool {
    PATTERNS.busy.is_match(&clean_line(line))
}

/// Human-readable description of a Codex state.
pub fn codex_state_description(state: AssistantState) -> &'static str {
    match state {
        AssistantState::Thinking => "Codex is working",
        AssistantState::Executing => "Codex is executing a tool",
        AssistantState::WaitingApproval => "Codex is waiting for approval",
        AssistantState::Replying => "Codex is replying",
        AssistantState::WaitingInput => "Codex is waiting for input",
        AssistantState::Unknown => "Unknown state",
    }
}
