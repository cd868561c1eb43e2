use thiserror::Error;

/// Errors surfaced by the terminal subsystem.
///
/// Configuration and validation problems are returned to the caller;
/// runtime I/O failures travel through session status transitions and
/// [`StreamEvent::Exit`](crate::pty::StreamEvent) instead.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("terminal session not found")]
    SessionNotFound,

    #[error("terminal session limit reached for project")]
    SessionLimitReached,

    #[error("invalid terminal session title: {0}")]
    InvalidSessionTitle(&'static str),

    #[error("invalid terminal encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid terminal arguments: {0}")]
    InvalidArgs(&'static str),

    #[error("failed to spawn terminal: {0}")]
    Spawn(anyhow::Error),
}
