use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of AI assistant detected in a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssistantKind {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "qwen-code")]
    QwenCode,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "cursor")]
    Cursor,
    #[serde(rename = "copilot")]
    Copilot,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl AssistantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantKind::ClaudeCode => "claude-code",
            AssistantKind::Codex => "codex",
            AssistantKind::QwenCode => "qwen-code",
            AssistantKind::Gemini => "gemini",
            AssistantKind::Cursor => "cursor",
            AssistantKind::Copilot => "copilot",
            AssistantKind::Unknown => "",
        }
    }

    /// Human-readable name for UI labels.
    pub fn display_name(&self) -> &'static str {
        match self {
            AssistantKind::ClaudeCode => "Claude Code",
            AssistantKind::Codex => "OpenAI Codex",
            AssistantKind::QwenCode => "Qwen Code",
            AssistantKind::Gemini => "Google Gemini",
            AssistantKind::Cursor => "Cursor",
            AssistantKind::Copilot => "GitHub Copilot",
            AssistantKind::Unknown => "",
        }
    }

    /// Whether output-based progress tracking is implemented for this kind.
    pub fn supports_progress_tracking(&self) -> bool {
        matches!(
            self,
            AssistantKind::ClaudeCode | AssistantKind::Codex | AssistantKind::QwenCode
        )
    }
}

/// Execution state inferred from assistant output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssistantState {
    #[default]
    #[serde(rename = "")]
    Unknown,
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(rename = "executing")]
    Executing,
    #[serde(rename = "waiting_approval")]
    WaitingApproval,
    #[serde(rename = "replying")]
    Replying,
    #[serde(rename = "waiting_input")]
    WaitingInput,
}

impl AssistantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantState::Unknown => "",
            AssistantState::Thinking => "thinking",
            AssistantState::Executing => "executing",
            AssistantState::WaitingApproval => "waiting_approval",
            AssistantState::Replying => "replying",
            AssistantState::WaitingInput => "waiting_input",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AssistantState::Unknown)
    }

    /// Working states are the only ones the debouncer may complete out of.
    pub fn is_working(&self) -> bool {
        matches!(self, AssistantState::Thinking | AssistantState::Executing)
    }
}

/// Accumulated per-state durations.
///
/// Serialized as integer nanoseconds to stay wire-compatible with
/// `time.Duration` JSON marshaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    #[serde(with = "duration_nanos")]
    pub thinking_duration: Duration,
    #[serde(with = "duration_nanos")]
    pub executing_duration: Duration,
    #[serde(with = "duration_nanos")]
    pub waiting_approval_duration: Duration,
    #[serde(with = "duration_nanos")]
    pub waiting_input_duration: Duration,
    #[serde(with = "duration_nanos")]
    pub current_state_duration: Duration,
}

/// A detected AI assistant plus its tracked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantInfo {
    #[serde(rename = "type")]
    pub kind: AssistantKind,
    pub name: String,
    pub display_name: String,
    pub detected: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "AssistantState::is_unknown")]
    pub state: AssistantState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StateStats>,
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.as_nanos().min(i64::MAX as u128) as i64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}
