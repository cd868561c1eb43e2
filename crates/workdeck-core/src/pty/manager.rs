//! Session registry with quotas and idle reaping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::session::{Session, SessionParams, SessionSnapshot};
use crate::config::TerminalConfig;
use crate::error::TerminalError;

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const MAX_TITLE_CHARS: usize = 64;

/// API-level inputs for creating a session.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionParams {
    /// Stable identifier; generated when `None`.
    pub id: Option<String>,
    pub project_id: String,
    pub worktree_id: String,
    /// Resolved worktree path the shell starts in.
    pub working_dir: std::path::PathBuf,
    pub title: String,
    pub env: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
}

/// Orchestrates PTY sessions: creation with per-project quotas, lookup,
/// rename, close, listing, and background idle reaping.
pub struct Manager {
    cfg: TerminalConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Manager {
    pub fn new(mut cfg: TerminalConfig) -> Self {
        cfg.encoding = cfg.encoding.trim().to_lowercase();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cfg,
            sessions: RwLock::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.cfg
    }

    /// Spawn a PTY session, respecting the per-project limit.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create_session(
        self: &Arc<Self>,
        params: CreateSessionParams,
    ) -> Result<Arc<Session>, TerminalError> {
        if params.project_id.is_empty() || params.worktree_id.is_empty() {
            return Err(TerminalError::InvalidArgs(
                "projectId and worktreeId are required",
            ));
        }

        let command = self.cfg.shell.resolve()?;

        let session = Arc::new(Session::new(SessionParams {
            id: params.id.unwrap_or_default(),
            project_id: params.project_id,
            worktree_id: params.worktree_id,
            working_dir: params.working_dir,
            title: params.title,
            command,
            env: params.env,
            rows: params.rows,
            cols: params.cols,
            encoding: self.cfg.encoding.clone(),
            scrollback_limit: self.cfg.scrollback_bytes,
        })?);

        self.register(&session)?;

        if let Err(err) = session.start() {
            self.deregister(session.id());
            session.close();
            return Err(err);
        }

        // Deregister exactly once, after the session's closed signal fires.
        let manager = Arc::clone(self);
        let watched = Arc::clone(&session);
        tokio::spawn(async move {
            watched.closed().await;
            manager.deregister(watched.id());
            debug!(session_id = %watched.id(), "terminal session deregistered");
        });

        Ok(session)
    }

    /// Look up a session by identifier.
    pub fn get_session(&self, id: &str) -> Result<Arc<Session>, TerminalError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or(TerminalError::SessionNotFound)
    }

    /// Update the title of the targeted session.
    ///
    /// The title is trimmed and must be 1-64 characters; a non-empty
    /// `project_id` additionally scopes the lookup.
    pub fn rename_session(
        &self,
        project_id: &str,
        session_id: &str,
        title: &str,
    ) -> Result<Arc<Session>, TerminalError> {
        let normalized = title.trim();
        if normalized.is_empty() {
            return Err(TerminalError::InvalidSessionTitle("title is required"));
        }
        if normalized.chars().count() > MAX_TITLE_CHARS {
            return Err(TerminalError::InvalidSessionTitle(
                "title length must be <= 64 characters",
            ));
        }

        let session = self.get_session(session_id)?;
        if !project_id.is_empty() && session.project_id() != project_id {
            return Err(TerminalError::SessionNotFound);
        }

        session.update_title(normalized.to_string());
        Ok(session)
    }

    /// Terminate and remove the session immediately.
    pub fn close_session(&self, id: &str) -> Result<(), TerminalError> {
        let session = self.get_session(id)?;
        session.close();
        Ok(())
    }

    /// Enumerate sessions, optionally filtered by project.
    ///
    /// Snapshots are taken without holding the registry lock.
    pub fn list_sessions(&self, project_id: Option<&str>) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = {
            let registry = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            registry.values().cloned().collect()
        };

        sessions
            .iter()
            .filter(|session| match project_id {
                Some(project) if !project.is_empty() => session.project_id() == project,
                _ => true,
            })
            .map(|session| session.snapshot())
            .collect()
    }

    /// Start the idle reaper. Must be called from within a Tokio runtime.
    pub fn start_background(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.cleanup_idle(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Stop background work and close every session.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let sessions: Vec<Arc<Session>> = {
            let mut registry = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            registry.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.close();
        }
        info!("all terminal sessions shut down");
    }

    fn register(&self, session: &Arc<Session>) -> Result<(), TerminalError> {
        let mut registry = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if self.cfg.max_sessions_per_project > 0 {
            let in_project = registry
                .values()
                .filter(|existing| existing.project_id() == session.project_id())
                .count();
            if in_project >= self.cfg.max_sessions_per_project {
                error!(
                    project_id = %session.project_id(),
                    limit = self.cfg.max_sessions_per_project,
                    "terminal session limit reached"
                );
                return Err(TerminalError::SessionLimitReached);
            }
        }

        registry.insert(session.id().to_string(), Arc::clone(session));
        Ok(())
    }

    fn deregister(&self, id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Close sessions idle for longer than the configured timeout.
    fn cleanup_idle(&self) {
        let idle_timeout = self.cfg.idle_duration();
        if idle_timeout.is_zero() {
            return;
        }
        let now = chrono::Utc::now();

        let sessions: Vec<Arc<Session>> = {
            let registry = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            registry.values().cloned().collect()
        };

        for session in sessions {
            let idle = (now - session.last_active())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle > idle_timeout {
                info!(
                    session_id = %session.id(),
                    project_id = %session.project_id(),
                    idle_secs = idle.as_secs(),
                    "closing idle terminal session"
                );
                session.close();
            }
        }
    }
}
