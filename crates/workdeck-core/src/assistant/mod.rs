//! AI assistant detection and state tracking.
//!
//! Two concerns live here:
//! - **Detection**: classify a foreground command line into a known assistant
//!   CLI (Claude Code, Codex, Qwen Code, ...) via ordered substring rules.
//! - **State tracking**: incrementally parse the assistant's terminal output
//!   (ANSI-stripped, line oriented) to infer whether it is thinking,
//!   executing a tool, waiting for approval, replying or idle, with a
//!   two-phase debouncer that tolerates flickering progress indicators.

pub mod ansi;
mod claude_code;
mod codex;
mod detector;
mod event;
mod qwen;
mod rules;
mod tracker;
mod types;

pub use claude_code::{
    claude_code_state_description, detect_claude_code_busy, detect_claude_code_state,
};
pub use codex::{codex_state_description, detect_codex_busy, detect_codex_state};
pub use detector::{assistant_kind, detect, is_assistant, Detector};
pub use event::detect_state_from_line;
pub use qwen::{detect_qwen_busy, detect_qwen_state, qwen_state_description};
pub use rules::{default_rules, DetectionRule};
pub use tracker::{StateChange, StatusTracker};
pub use types::{AssistantInfo, AssistantKind, AssistantState, StateStats};
