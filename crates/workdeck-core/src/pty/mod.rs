//! PTY session management.
//!
//! # Components
//! - [`Session`]: a single PTY-backed shell with subscriber fan-out,
//!   scrollback and assistant tracking
//! - [`Manager`]: session registry with per-project quotas and idle reaping
//! - [`Scrollback`]: bounded replay buffer for late-joining subscribers
//! - [`EncodingProfile`]: shell-encoding <-> UTF-8 conversion

mod encoding;
mod manager;
mod scrollback;
mod session;

pub use encoding::EncodingProfile;
pub use manager::{CreateSessionParams, Manager};
pub use scrollback::Scrollback;
pub use session::{
    Session, SessionMetadata, SessionParams, SessionSnapshot, SessionStatus, SessionStream,
    StreamEvent,
};
