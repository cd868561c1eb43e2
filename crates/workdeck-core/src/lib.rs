//! workdeck-core - terminal session backbone for the workdeck workspace server
//!
//! Responsibilities:
//! - Spawn PTY-backed shells bound to project worktrees and multiplex their
//!   output to any number of subscribers ([`pty`])
//! - Inspect the shell's process tree to learn what is currently running
//!   ([`process`])
//! - Infer what an AI coding assistant inside the terminal is doing
//!   (thinking / executing / waiting) from its output ([`assistant`])
//!
//! Transport (HTTP/WebSocket), persistence and git plumbing live elsewhere;
//! this crate only deals in sessions, events and snapshots.

pub mod assistant;
pub mod config;
pub mod error;
pub mod process;
pub mod pty;

pub use assistant::{
    detect, AssistantInfo, AssistantKind, AssistantState, DetectionRule, Detector, StateChange,
    StateStats, StatusTracker,
};
pub use config::{ShellConfig, TerminalConfig};
pub use error::TerminalError;
pub use pty::{
    CreateSessionParams, EncodingProfile, Manager, Scrollback, Session, SessionMetadata,
    SessionParams, SessionSnapshot, SessionStatus, SessionStream, StreamEvent,
};
