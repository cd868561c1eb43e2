//! JSON fast path and generic pattern fallback for state inference.
//!
//! Assistants running in ACP-style modes emit JSON event lines; those map
//! directly to states without touching the regex tables. Everything else
//! goes through ANSI stripping plus pattern groups in priority order:
//! WaitingApproval > Executing > Thinking > Replying > WaitingInput.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::ansi::clean_line;
use super::types::AssistantState;

/// Parsed assistant event from a JSON output line.
#[derive(Debug, Default, Deserialize)]
struct AssistantEvent {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    stop_reason: String,
}

/// Generic pattern groups used when no assistant-specific table applies.
struct EventPatterns {
    thinking: Vec<Regex>,
    executing: Vec<Regex>,
    waiting_approval: Vec<Regex>,
    replying: Vec<Regex>,
    waiting_input: Vec<Regex>,
}

static DEFAULT_PATTERNS: Lazy<EventPatterns> = Lazy::new(|| EventPatterns {
    thinking: compile(&[
        r"∴\s*Thinking",
        r"∴\s*Thought\s+for\s+[\d\w]+.*\(ctrl\+o\s+to\s+show\s+thinking\)",
        r"(?i)\(esc\s+to\s+interrupt",
        r"(?i)esc\s+to\s+interrupt\)",
        r#"(?i)"type"\s*:\s*"thinking""#,
        r"(?i)agent[_\s-]?thought",
        r"(?i)<thinking>",
    ]),
    executing: compile(&[
        r#"(?i)"type"\s*:\s*"tool[_\s-]?use""#,
        r#"(?i)"kind"\s*:\s*"execute""#,
        r"(?i)tool[_\s-]?(call|use|execution)",
        r"(?i)executing\s+(command|tool)",
        r"(?i)running\s+(command|tool)",
    ]),
    waiting_approval: compile(&[
        r"(?i)proceed\?\s*\([yn]/[yn]\)",
        r"(?i)request[_\s-]?permission",
        r"(?i)waiting.*approval",
        r"(?i)approve|confirm.*\?",
    ]),
    replying: compile(&[
        r#"(?i)"type"\s*:\s*"(assistant[_\s-]?)?message""#,
        r"(?i)agent[_\s-]?message",
        r"(?i)replying|responding",
    ]),
    waiting_input: compile(&[
        r#"(?i)"done"\s*:\s*true"#,
        r#"(?i)"stop[_\s-]?reason""#,
        r"(?i)completed|finished",
        r"(?i)waiting.*input",
    ]),
});

pub(crate) fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("state pattern"))
        .collect()
}

pub(crate) fn match_any(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Try to parse a line as a JSON event and map it to a state.
pub(crate) fn detect_from_json(line: &str) -> AssistantState {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return AssistantState::Unknown;
    }

    let Ok(event) = serde_json::from_str::<AssistantEvent>(trimmed) else {
        return AssistantState::Unknown;
    };
    infer_state_from_event(&event)
}

fn infer_state_from_event(event: &AssistantEvent) -> AssistantState {
    match event.r#type.to_lowercase().as_str() {
        "thinking" | "thought" | "agent_thought" | "agent_thought_chunk" => {
            return AssistantState::Thinking;
        }
        "tool_use" | "tool_call" | "tool_update" | "toolcall" | "toolupdate" => {
            return AssistantState::Executing;
        }
        "message" | "assistant_message" | "agent_message" | "agent_message_chunk" => {
            return AssistantState::Replying;
        }
        "request_permission" | "approval_request" => {
            return AssistantState::WaitingApproval;
        }
        "done" | "complete" => {
            return AssistantState::WaitingInput;
        }
        _ => {}
    }

    if event.kind.to_lowercase() == "execute" {
        return AssistantState::Executing;
    }

    match event.status.to_lowercase().as_str() {
        "thinking" | "analyzing" => return AssistantState::Thinking,
        "executing" | "running" => return AssistantState::Executing,
        "waiting" | "pending" => return AssistantState::WaitingApproval,
        "done" | "completed" => return AssistantState::WaitingInput,
        _ => {}
    }

    if !event.stop_reason.is_empty() {
        return AssistantState::WaitingInput;
    }

    AssistantState::Unknown
}

/// Detect state from a single output line with no assistant-specific table.
pub fn detect_state_from_line(line: &str) -> AssistantState {
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

    let patterns = &*DEFAULT_PATTERNS;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_type_field() {
        assert_eq!(
            detect_from_json(r#"{"type": "thinking"}"#),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_from_json(r#"{"type": "agent_thought_chunk"}"#),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_from_json(r#"{"type": "tool_use", "name": "bash"}"#),
            AssistantState::Executing
        );
        assert_eq!(
            detect_from_json(r#"{"type": "assistant_message"}"#),
            AssistantState::Replying
        );
        assert_eq!(
            detect_from_json(r#"{"type": "request_permission"}"#),
            AssistantState::WaitingApproval
        );
        assert_eq!(
            detect_from_json(r#"{"type": "done"}"#),
            AssistantState::WaitingInput
        );
    }

    #[test]
    fn test_json_secondary_fields() {
        assert_eq!(
            detect_from_json(r#"{"kind": "execute"}"#),
            AssistantState::Executing
        );
        assert_eq!(
            detect_from_json(r#"{"status": "analyzing"}"#),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_from_json(r#"{"status": "pending"}"#),
            AssistantState::WaitingApproval
        );
        assert_eq!(
            detect_from_json(r#"{"stop_reason": "end_turn"}"#),
            AssistantState::WaitingInput
        );
    }

    #[test]
    fn test_json_rejects_non_objects() {
        assert_eq!(detect_from_json("plain text"), AssistantState::Unknown);
        assert_eq!(detect_from_json("{not json"), AssistantState::Unknown);
        assert_eq!(detect_from_json(r#"{"type": "banter"}"#), AssistantState::Unknown);
    }

    #[test]
    fn test_generic_line_patterns() {
        assert_eq!(
            detect_state_from_line("∴ Thinking…"),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_state_from_line("◦ Working (5s • esc to interrupt)"),
            AssistantState::Thinking
        );
        assert_eq!(
            detect_state_from_line("Do you want to proceed? (y/n)"),
            AssistantState::WaitingApproval
        );
        assert_eq!(
            detect_state_from_line("executing command: ls"),
            AssistantState::Executing
        );
        assert_eq!(
            detect_state_from_line("random chatter"),
            AssistantState::Unknown
        );
        assert_eq!(detect_state_from_line(""), AssistantState::Unknown);
    }

    #[test]
    fn test_ansi_wrapped_line() {
        assert_eq!(
            detect_state_from_line("\x1b[33m∴ Thinking…\x1b[0m"),
            AssistantState::Thinking
        );
    }
}
