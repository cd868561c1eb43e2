//! PTY-backed terminal session.
//!
//! A session owns one PTY, one shell process and all per-terminal state:
//! scrollback, subscriber fan-out, and the assistant tracker. Three tasks
//! run per started session:
//!
//! - `wait`: blocks on process exit, records the error, closes the session
//! - `consume_pty`: blocking read loop; normalizes bytes, feeds scrollback,
//!   broadcasts Data events and drives the assistant tracker
//! - `monitor_metadata`: samples the process tree every 2 s and broadcasts
//!   Metadata events when the observable state changes
//!
//! Subscribers get bounded channels; a slow subscriber loses Data events
//! but never blocks the reader, and always sees Exit as its final event
//! when the session terminates.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Once, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use super::encoding::EncodingProfile;
use super::scrollback::Scrollback;
use crate::assistant::{self, AssistantInfo, AssistantState, StatusTracker};
use crate::error::TerminalError;
use crate::process;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;
const READ_BUFFER_SIZE: usize = 32 * 1024;
const SUBSCRIBER_BUFFER_SIZE: usize = 128;
const METADATA_INTERVAL: Duration = Duration::from_secs(2);

/// Lifecycle stage of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Closed,
    Error,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Running,
            2 => SessionStatus::Closed,
            3 => SessionStatus::Error,
            _ => SessionStatus::Starting,
        }
    }
}

/// Event delivered to session subscribers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Normalized (UTF-8) PTY output.
    Data(Vec<u8>),
    /// Full process + assistant snapshot; sent only when something changed.
    Metadata(SessionMetadata),
    /// Terminal event; at most one per subscriber, always last.
    Exit(Option<String>),
}

/// Process and assistant state attached to Metadata events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub process_pid: i32,
    pub process_status: String,
    pub process_has_children: bool,
    pub running_command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_assistant: Option<AssistantInfo>,
}

impl SessionMetadata {
    /// Field-wise comparison driving Metadata broadcasts.
    ///
    /// Assistant stats are excluded: durations tick on every sample and
    /// would turn the 2 s poll into a constant event stream.
    fn differs_from(&self, old: Option<&SessionMetadata>) -> bool {
        let Some(old) = old else {
            return true;
        };
        if old.process_pid != self.process_pid
            || old.process_status != self.process_status
            || old.process_has_children != self.process_has_children
            || old.running_command != self.running_command
        {
            return true;
        }
        match (&old.ai_assistant, &self.ai_assistant) {
            (None, None) => false,
            (Some(a), Some(b)) => {
                a.kind != b.kind
                    || a.display_name != b.display_name
                    || a.command != b.command
                    || a.state != b.state
                    || a.state_updated_at != b.state_updated_at
            }
            _ => true,
        }
    }
}

/// Immutable copy of a session's observable state for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub project_id: String,
    pub worktree_id: String,
    pub working_dir: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub status: SessionStatus,
    pub rows: u16,
    pub cols: u16,
    pub encoding: String,
    pub process_pid: i32,
    pub process_status: String,
    pub process_has_children: bool,
    pub running_command: String,
    pub ai_assistant: Option<AssistantInfo>,
}

/// Data required to bootstrap a session.
#[derive(Debug, Clone, Default)]
pub struct SessionParams {
    /// Stable identifier; generated when empty.
    pub id: String,
    pub project_id: String,
    pub worktree_id: String,
    pub working_dir: PathBuf,
    /// Tab label; defaults to the session id.
    pub title: String,
    /// Shell argv.
    pub command: Vec<String>,
    /// Extra environment on top of the inherited one.
    pub env: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
    pub encoding: String,
    /// Scrollback cap in bytes; <= 0 disables scrollback.
    pub scrollback_limit: i64,
}

/// A subscriber's receiving half.
///
/// Dropping the stream (or calling [`close`](SessionStream::close))
/// unsubscribes; the channel closes exactly once.
pub struct SessionStream {
    id: String,
    events: mpsc::Receiver<StreamEvent>,
    session: Weak<Session>,
}

impl SessionStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receive the next event; `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Unsubscribe from the session.
    pub fn close(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.remove_subscriber(&self.id);
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.close();
    }
}

struct PtyHandles {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

struct WindowState {
    title: String,
    rows: u16,
    cols: u16,
}

/// A PTY-backed shell bound to a project worktree.
pub struct Session {
    id: String,
    project_id: String,
    worktree_id: String,
    working_dir: PathBuf,
    command: Vec<String>,
    env: HashMap<String, String>,
    created_at: DateTime<Utc>,

    last_active_ns: AtomicI64,
    status: AtomicU8,
    running: AtomicBool,
    pid: AtomicU32,

    window: RwLock<WindowState>,
    io: Mutex<Option<PtyHandles>>,
    err: RwLock<Option<String>>,

    close_once: Once,
    exit_once: Once,
    closed_tx: watch::Sender<bool>,

    encoding: EncodingProfile,
    scrollback: Scrollback,
    subscribers: RwLock<HashMap<String, mpsc::Sender<StreamEvent>>>,
    last_metadata: RwLock<Option<SessionMetadata>>,
    tracker: StatusTracker,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    /// Wire up session state without starting the PTY process.
    pub fn new(params: SessionParams) -> Result<Self, TerminalError> {
        if params.command.is_empty() {
            return Err(TerminalError::InvalidArgs("shell command is required"));
        }

        let encoding = EncodingProfile::resolve(&params.encoding)?;

        let id = if params.id.is_empty() {
            new_session_id()
        } else {
            params.id
        };
        let title = if params.title.is_empty() {
            id.clone()
        } else {
            params.title
        };
        let scrollback_limit = params.scrollback_limit.max(0) as usize;
        let (closed_tx, _) = watch::channel(false);

        let session = Self {
            id,
            project_id: params.project_id,
            worktree_id: params.worktree_id,
            working_dir: params.working_dir,
            command: params.command,
            env: params.env,
            created_at: Utc::now(),
            last_active_ns: AtomicI64::new(0),
            status: AtomicU8::new(SessionStatus::Starting as u8),
            running: AtomicBool::new(false),
            pid: AtomicU32::new(0),
            window: RwLock::new(WindowState {
                title,
                rows: params.rows,
                cols: params.cols,
            }),
            io: Mutex::new(None),
            err: RwLock::new(None),
            close_once: Once::new(),
            exit_once: Once::new(),
            closed_tx,
            encoding,
            scrollback: Scrollback::new(scrollback_limit),
            subscribers: RwLock::new(HashMap::new()),
            last_metadata: RwLock::new(None),
            tracker: StatusTracker::new(),
        };
        session.touch();
        Ok(session)
    }

    /// Launch the shell on a fresh PTY and start the session tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), TerminalError> {
        let (rows, cols) = {
            let mut window = self.window.write().unwrap_or_else(|e| e.into_inner());
            if window.rows == 0 {
                window.rows = DEFAULT_ROWS;
            }
            if window.cols == 0 {
                window.cols = DEFAULT_COLS;
            }
            (window.rows, window.cols)
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| {
                self.set_status(SessionStatus::Error);
                TerminalError::Spawn(err)
            })?;

        let mut cmd = CommandBuilder::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        cmd.cwd(&self.working_dir);
        // CommandBuilder starts from an empty environment; copy the parent
        // env before layering the session overlay on top.
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");

        let child = match pair.slave.spawn_command(cmd) {
            Ok(child) => child,
            Err(err) => {
                self.set_status(SessionStatus::Error);
                return Err(TerminalError::Spawn(err));
            }
        };

        let pid = child.process_id().unwrap_or(0);
        self.pid.store(pid, Ordering::SeqCst);

        let killer = child.clone_killer();
        let writer = match pair.master.take_writer() {
            Ok(writer) => writer,
            Err(err) => {
                let _ = child.clone_killer().kill();
                self.set_status(SessionStatus::Error);
                return Err(TerminalError::Spawn(err));
            }
        };
        let reader = match pair.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(err) => {
                let _ = child.clone_killer().kill();
                self.set_status(SessionStatus::Error);
                return Err(TerminalError::Spawn(err));
            }
        };

        *self.io.lock().unwrap_or_else(|e| e.into_inner()) = Some(PtyHandles {
            master: pair.master,
            writer,
            killer,
        });

        self.running.store(true, Ordering::SeqCst);
        self.set_status(SessionStatus::Running);
        info!(session_id = %self.id, pid = pid, "terminal session started");

        let session = Arc::clone(self);
        tokio::spawn(async move { session.wait_child(child).await });

        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || session.consume_pty(reader));

        let session = Arc::clone(self);
        tokio::spawn(async move { session.monitor_metadata().await });

        Ok(())
    }

    async fn wait_child(self: Arc<Self>, mut child: Box<dyn Child + Send + Sync>) {
        let result = tokio::task::spawn_blocking(move || child.wait()).await;
        if self.status() == SessionStatus::Closed {
            // close() already ran and killed the shell; the resulting exit
            // status is not an error of the session.
            return;
        }
        match result {
            Ok(Ok(status)) if status.success() => {
                debug!(session_id = %self.id, "terminal session exited normally");
            }
            Ok(Ok(status)) => {
                let message = format!("process exited with status {}", status.exit_code());
                debug!(session_id = %self.id, error = %message, "terminal session exited with error");
                *self.err.write().unwrap_or_else(|e| e.into_inner()) = Some(message);
                self.set_status(SessionStatus::Error);
            }
            Ok(Err(err)) => {
                debug!(session_id = %self.id, error = %err, "terminal session wait failed");
                *self.err.write().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
                self.set_status(SessionStatus::Error);
            }
            Err(err) => {
                *self.err.write().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
                self.set_status(SessionStatus::Error);
            }
        }
        self.close();
    }

    fn consume_pty(self: Arc<Self>, mut reader: Box<dyn Read + Send>) {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            match reader.read(&mut buffer) {
                Ok(0) => return,
                Ok(n) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return;
                    }
                    self.touch();
                    let normalized = self.encoding.normalize_output(&buffer[..n]);
                    if !normalized.is_empty() {
                        self.scrollback.append(&normalized);
                        self.broadcast(StreamEvent::Data(normalized.clone()));
                        self.handle_assistant_output(&normalized);
                    }
                }
                Err(err) => {
                    debug!(session_id = %self.id, error = %err, "pty read ended");
                    return;
                }
            }
        }
    }

    async fn monitor_metadata(self: Arc<Self>) {
        let mut closed = self.closed_tx.subscribe();
        let mut ticker = tokio::time::interval(METADATA_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_and_broadcast_metadata(),
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return;
                    }
                }
            }
        }
    }

    fn check_and_broadcast_metadata(&self) {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid == 0 {
            return;
        }

        let mut metadata = SessionMetadata {
            process_pid: pid as i32,
            process_status: process::status(pid),
            process_has_children: process::is_busy(pid),
            running_command: String::new(),
            ai_assistant: None,
        };

        if metadata.process_has_children {
            let command = process::foreground_command(pid);
            if !command.is_empty() {
                metadata.running_command = command.clone();
                metadata.ai_assistant = self.enrich_assistant_info(assistant::detect(&command));
            } else {
                self.tracker.deactivate();
            }
        } else {
            self.tracker.deactivate();
        }

        if let Some(info) = metadata.ai_assistant.as_mut() {
            if let Some(change) = self.tracker.evaluate_timeout(Utc::now()) {
                info.state = change.state;
                info.state_updated_at = Some(change.at);
            }
        }

        let changed = {
            let last = self.last_metadata.read().unwrap_or_else(|e| e.into_inner());
            metadata.differs_from(last.as_ref())
        };
        if changed {
            *self
                .last_metadata
                .write()
                .unwrap_or_else(|e| e.into_inner()) = Some(metadata.clone());
            self.broadcast(StreamEvent::Metadata(metadata));
        }
    }

    /// Fold tracker state into a freshly detected assistant.
    fn enrich_assistant_info(&self, info: Option<AssistantInfo>) -> Option<AssistantInfo> {
        let Some(mut info) = info else {
            self.tracker.deactivate();
            return None;
        };

        self.tracker.activate(info.kind);
        let (state, updated_at) = self.tracker.state();
        if state != AssistantState::Unknown {
            info.state = state;
            info.state_updated_at = updated_at;
        } else {
            info.state = AssistantState::WaitingInput;
            info.state_updated_at = Some(Utc::now());
        }
        info.stats = self.tracker.stats();
        Some(info)
    }

    /// Push a PTY chunk through the tracker and broadcast state changes
    /// without waiting for the next metadata poll.
    fn handle_assistant_output(&self, chunk: &[u8]) {
        let Some(change) = self.tracker.process(chunk) else {
            return;
        };
        if change.state == AssistantState::Unknown {
            return;
        }

        let updated = {
            let mut last = self
                .last_metadata
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let Some(metadata) = last.as_ref() else {
                return;
            };
            if metadata.ai_assistant.is_none() {
                return;
            }
            let mut metadata = metadata.clone();
            if let Some(info) = metadata.ai_assistant.as_mut() {
                info.state = change.state;
                info.state_updated_at = Some(change.at);
            }
            *last = Some(metadata.clone());
            metadata
        };

        self.broadcast(StreamEvent::Metadata(updated));
    }

    /// Register a subscriber for this session's event stream.
    pub fn subscribe(self: &Arc<Self>) -> SessionStream {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        let id = Uuid::new_v4().to_string();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), tx);
        SessionStream {
            id,
            events: rx,
            session: Arc::downgrade(self),
        }
    }

    fn remove_subscriber(&self, id: &str) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Deliver an event to every subscriber without ever blocking.
    ///
    /// Sends happen under the read lock so an in-flight Exit (write lock)
    /// cannot interleave behind a Data event.
    fn broadcast(&self, event: StreamEvent) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for (subscriber_id, tx) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                debug!(
                    session_id = %self.id,
                    subscriber_id = %subscriber_id,
                    "dropping terminal event for slow subscriber"
                );
            }
        }
    }

    /// Best-effort Exit delivery; the channels close right after, making
    /// Exit the final event for every subscriber.
    fn notify_exit(&self, err: Option<String>) {
        self.exit_once.call_once(|| {
            let event = StreamEvent::Exit(err);
            let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            for (_, tx) in subscribers.drain() {
                let _ = tx.try_send(event.clone());
            }
        });
    }

    /// Write input to the PTY, encoding it for the shell.
    pub fn write(&self, data: &[u8]) -> std::io::Result<usize> {
        let payload = self.encoding.prepare_input(data);
        self.touch();

        let mut io = self.io.lock().unwrap_or_else(|e| e.into_inner());
        match io.as_mut() {
            Some(handles) => {
                handles.writer.write_all(&payload)?;
                handles.writer.flush()?;
                Ok(payload.len())
            }
            None => Err(std::io::ErrorKind::UnexpectedEof.into()),
        }
    }

    /// Update the PTY window size. Non-positive sizes are ignored.
    pub fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
        if cols == 0 || rows == 0 {
            return Ok(());
        }

        let io = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let Some(handles) = io.as_ref() else {
            return Ok(());
        };
        handles
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(std::io::Error::other)?;
        drop(io);

        let mut window = self.window.write().unwrap_or_else(|e| e.into_inner());
        window.cols = cols;
        window.rows = rows;
        drop(window);
        self.touch();
        Ok(())
    }

    /// Copy of the buffered output for replay on attach.
    pub fn scrollback(&self) -> Vec<Vec<u8>> {
        self.scrollback.snapshot()
    }

    /// Terminate the session and the underlying process. Idempotent.
    pub fn close(&self) {
        self.close_once.call_once(|| {
            self.set_status(SessionStatus::Closed);
            self.running.store(false, Ordering::SeqCst);

            if let Some(mut handles) = self.io.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = handles.killer.kill();
            }

            self.closed_tx.send_replace(true);
            self.notify_exit(self.error());
            info!(session_id = %self.id, "terminal session closed");
        });
    }

    /// Resolves once the session has fully terminated.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn worktree_id(&self) -> &str {
        &self.worktree_id
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    pub fn title(&self) -> String {
        self.window
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .title
            .clone()
    }

    pub fn update_title(&self, title: String) {
        self.window
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .title = title;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.last_active_ns.load(Ordering::SeqCst))
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Update the last-activity timestamp.
    pub fn touch(&self) {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        self.last_active_ns.store(now, Ordering::SeqCst);
    }

    /// Last process error, if any.
    pub fn error(&self) -> Option<String> {
        self.err.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Copy the current observable state for API responses.
    pub fn snapshot(&self) -> SessionSnapshot {
        let (title, rows, cols) = {
            let window = self.window.read().unwrap_or_else(|e| e.into_inner());
            (window.title.clone(), window.rows, window.cols)
        };

        let mut snapshot = SessionSnapshot {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            worktree_id: self.worktree_id.clone(),
            working_dir: self.working_dir.to_string_lossy().into_owned(),
            title,
            created_at: self.created_at,
            last_active: self.last_active(),
            status: self.status(),
            rows,
            cols,
            encoding: self.encoding.name().to_string(),
            process_pid: 0,
            process_status: String::new(),
            process_has_children: false,
            running_command: String::new(),
            ai_assistant: None,
        };

        let pid = self.pid.load(Ordering::SeqCst);
        if pid > 0 {
            snapshot.process_pid = pid as i32;
            snapshot.process_status = process::status(pid);
            snapshot.process_has_children = process::is_busy(pid);
            if snapshot.process_has_children {
                let command = process::foreground_command(pid);
                if !command.is_empty() {
                    snapshot.running_command = command.clone();
                    snapshot.ai_assistant = self.enrich_assistant_info(assistant::detect(&command));
                }
            }
        }

        snapshot
    }
}

fn new_session_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("term-{}-{}", Utc::now().timestamp_millis(), &uuid[..8])
}
