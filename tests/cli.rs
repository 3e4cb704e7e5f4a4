//! Runs the `ctrmon` binary end to end.
//!
//! The sync pipe tests hand an inheritable fd to the child, so every test
//! runs alone to keep other spawns from holding the write end open.

use std::fs::File;
use std::io::Read;
use std::os::unix::io::{FromRawFd, RawFd};
use std::process::{Command, ExitStatus};
use std::time::Duration;

use serde_json::Value;
use serial_test::serial;

fn ctrmon() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ctrmon"));
    command.args(["--cid", "abcdefghijklm"]);
    command
}

fn with_runtime(command: &mut Command, script: &str) -> ExitStatus {
    command
        .args(["--", "/bin/sh", "-c", script])
        .status()
        .unwrap()
}

/// Pipe whose read end is close-on-exec and whose write end is inherited.
fn sync_pipe() -> (File, RawFd) {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    assert_eq!(unsafe { libc::fcntl(fds[0], libc::F_SETFD, libc::FD_CLOEXEC) }, 0);
    (unsafe { File::from_raw_fd(fds[0]) }, fds[1])
}

fn read_messages(mut reader: File, writer: RawFd) -> Vec<Value> {
    unsafe { libc::close(writer) };
    let mut contents = String::new();
    reader.read_to_string(&mut contents).unwrap();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// True once `pid` is gone or a zombie.
fn killed(pid: i32) -> bool {
    for _ in 0..100 {
        let state = std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| stat.rsplit(')').next().map(|rest| rest.trim_start().to_string()));
        match state {
            None => return true,
            Some(rest) if rest.starts_with('Z') || rest.starts_with('X') => return true,
            Some(_) => std::thread::sleep(Duration::from_millis(20)),
        }
    }
    false
}

#[test]
#[serial]
fn test_exits_with_runtime_code() {
    let status = with_runtime(&mut ctrmon(), "exit 3");
    assert_eq!(status.code(), Some(3));
}

#[test]
#[serial]
fn test_failing_exit_command_sets_exit_code() {
    let status = with_runtime(
        ctrmon().args([
            "--exit-command",
            "/bin/sh",
            "--exit-command-arg",
            "-c",
            "--exit-command-arg",
            "exit 4",
        ]),
        "exit 0",
    );
    assert_eq!(status.code(), Some(4));
}

#[test]
#[serial]
fn test_successful_exit_command_keeps_session_code() {
    let status = with_runtime(
        ctrmon().args(["--exit-command", "/bin/true"]),
        "exit 6",
    );
    assert_eq!(status.code(), Some(6));
}

#[test]
#[serial]
fn test_sync_pipe_reports_pid_then_code() {
    let (reader, writer) = sync_pipe();
    let status = with_runtime(
        ctrmon().args(["--sync-pipe-fd", &writer.to_string()]),
        "exit 3",
    );
    assert_eq!(status.code(), Some(3));

    let messages = read_messages(reader, writer);
    assert_eq!(messages.len(), 2);
    assert!(messages[0]["data"].as_i64().is_some_and(|pid| pid > 0));
    assert!(messages[0].get("message").is_none());
    assert_eq!(messages[1]["data"], 3);
}

#[test]
#[serial]
fn test_sync_pipe_is_closed_before_exit_command() {
    let (reader, writer) = sync_pipe();
    let check_fd = format!("test -e /proc/$PPID/fd/{} && exit 9 || exit 0", writer);
    let status = with_runtime(
        ctrmon().args([
            "--sync-pipe-fd",
            &writer.to_string(),
            "--exit-command",
            "/bin/sh",
            "--exit-command-arg=-c",
            "--exit-command-arg",
            &check_fd,
        ]),
        "exit 0",
    );
    assert_eq!(status.code(), Some(0));
    assert_eq!(read_messages(reader, writer).len(), 2);
}

#[test]
#[serial]
fn test_container_from_pidfile() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("container.pid");
    let script = format!("(sleep 0.5; exit 5) & echo $! > {}", pidfile.display());

    let (reader, writer) = sync_pipe();
    let status = with_runtime(
        ctrmon().args([
            "--sync-pipe-fd",
            &writer.to_string(),
            "--container-pidfile",
            pidfile.to_str().unwrap(),
        ]),
        &script,
    );
    assert_eq!(status.code(), Some(5));
    assert_eq!(read_messages(reader, writer)[1]["data"], 5);
}

#[test]
#[serial]
fn test_timeout_kills_runtime() {
    let (reader, writer) = sync_pipe();
    let status = with_runtime(
        ctrmon().args(["-T", "1", "--sync-pipe-fd", &writer.to_string()]),
        "exec sleep 30",
    );
    assert_eq!(status.code(), Some(255));

    let messages = read_messages(reader, writer);
    let runtime = messages[0]["data"].as_i64().unwrap() as i32;
    assert_eq!(messages[1]["data"], -1);
    assert_eq!(messages[1]["message"], "timed out");
    assert!(killed(runtime));
}

#[test]
#[serial]
fn test_invalid_configuration_is_fatal() {
    let status = with_runtime(ctrmon().args(["--exec", "--restore"]), "exit 0");
    assert_eq!(status.code(), Some(1));
}
