//! Shell process inspection.
//!
//! Given the PID of a session's shell, report its scheduler status, whether
//! anything is running inside the session, and the command line of the
//! current foreground process. On Linux the foreground process group comes
//! from the controlling TTY (`tpgid` in `/proc/<pid>/stat`); elsewhere the
//! deepest, most recently started descendant stands in. Disappeared PIDs
//! and permission errors always yield empty/zero values, never errors.

use std::collections::HashMap;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Scheduler status of the process, e.g. "running" or "sleeping".
///
/// Empty string when the process no longer exists.
pub fn status(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new(),
    );
    match system.process(target) {
        Some(process) => status_label(process.status()),
        None => String::new(),
    }
}

/// Whether any process beyond the shell itself lives in the session.
pub fn is_busy(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let system = refresh_all();
    !descendants_of(&system, Pid::from_u32(pid)).is_empty()
}

/// Full command line of the session's current foreground process.
///
/// Empty string when the shell has no foreground child or the process
/// tree cannot be read.
pub fn foreground_command(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }

    let system = refresh_all();

    #[cfg(target_os = "linux")]
    if let Some(command) = tty_foreground_command(&system, pid) {
        return command;
    }

    descendant_command(&system, Pid::from_u32(pid))
}

fn refresh_all() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );
    system
}

fn status_label(status: ProcessStatus) -> String {
    match status {
        ProcessStatus::Run => "running".to_string(),
        ProcessStatus::Sleep => "sleeping".to_string(),
        ProcessStatus::Idle => "idle".to_string(),
        ProcessStatus::Stop => "stopped".to_string(),
        ProcessStatus::Zombie => "zombie".to_string(),
        ProcessStatus::Dead => "dead".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// All transitive descendants of `root`; parents appear before children.
fn descendants_of(system: &System, root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut result = Vec::new();
    let mut queue = vec![root];
    while let Some(current) = queue.pop() {
        if let Some(kids) = children.get(&current) {
            for kid in kids {
                result.push(*kid);
                queue.push(*kid);
            }
        }
    }
    result
}

/// Resolve the controlling TTY's foreground process group on Linux.
///
/// `/proc/<pid>/stat` field layout after the parenthesized comm:
/// state ppid pgrp session tty_nr tpgid ...
#[cfg(target_os = "linux")]
fn tty_foreground_command(system: &System, pid: u32) -> Option<String> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_comm = stat.get(stat.rfind(')')? + 2..)?;
    let tpgid: i64 = after_comm.split_whitespace().nth(5)?.parse().ok()?;
    if tpgid <= 0 || tpgid == pid as i64 {
        // The shell itself owns the foreground; fall back to descendants.
        return None;
    }

    let leader = Pid::from_u32(tpgid as u32);
    let command = system.process(leader).map(command_line)?;
    if command.is_empty() {
        return None;
    }
    Some(command)
}

/// Command line of the deepest, most recently started descendant.
fn descendant_command(system: &System, root: Pid) -> String {
    let mut depth: HashMap<Pid, u32> = HashMap::new();
    depth.insert(root, 0);

    // Parent depths resolve before children because descendants_of is
    // produced by walking outward from the root.
    let descendants = descendants_of(system, root);
    for pid in &descendants {
        let parent_depth = system
            .process(*pid)
            .and_then(|p| p.parent())
            .and_then(|parent| depth.get(&parent).copied())
            .unwrap_or(0);
        depth.insert(*pid, parent_depth + 1);
    }

    let deepest = descendants.iter().max_by_key(|pid| {
        let d = depth.get(pid).copied().unwrap_or(0);
        let started = system.process(**pid).map(|p| p.start_time()).unwrap_or(0);
        (d, started)
    });

    deepest
        .and_then(|pid| system.process(*pid))
        .map(command_line)
        .unwrap_or_default()
}

fn command_line(process: &Process) -> String {
    let cmd = process.cmd();
    if cmd.is_empty() {
        return process
            .exe()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    let mut line = String::new();
    for arg in cmd {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&arg.to_string_lossy());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pid_yields_empty_values() {
        // PID well above any default pid_max
        let pid = 4_190_000;
        assert_eq!(status(pid), "");
        assert!(!is_busy(pid));
        assert_eq!(foreground_command(pid), "");
        assert_eq!(status(0), "");
    }

    #[test]
    fn test_own_process_has_status() {
        let me = std::process::id();
        assert!(!status(me).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_child_process_marks_busy() {
        let mut child = std::process::Command::new("sleep")
            .arg("5")
            .spawn()
            .expect("spawn sleep");

        let me = std::process::id();
        assert!(is_busy(me), "own process should report a child");

        // Exercise descendant enumeration directly; foreground_command may
        // resolve through the controlling TTY when one is attached.
        let system = refresh_all();
        let command = descendant_command(&system, Pid::from_u32(me));
        assert!(
            command.contains("sleep"),
            "expected sleep in descendant command, got {command:?}"
        );

        child.kill().ok();
        child.wait().ok();
    }
}
