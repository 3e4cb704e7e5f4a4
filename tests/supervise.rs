//! End-to-end sessions against real child processes.
//!
//! Each test installs process-wide signal handlers and reaps with
//! `waitpid(-1)`, so they run one at a time.

use std::process::Command;
use std::time::Duration;

use ctrmon::monitor::signals::WAKEUP;
use ctrmon::monitor::{EventLoop, Outcome, Role, SessionFlags, Supervisor};
use ctrmon::MonitorError;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use serial_test::serial;

const LIMIT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(script);
    command
}

fn spawn(script: &str) -> Pid {
    let child = sh(script).spawn().unwrap();
    Pid::from_raw(child.id() as i32)
}

fn exec_terminal() -> SessionFlags {
    SessionFlags {
        api_version: 1,
        exec: true,
        terminal: true,
    }
}

async fn run(supervisor: &mut Supervisor) {
    tokio::time::timeout(LIMIT, supervisor.run())
        .await
        .expect("event loop did not stop")
        .unwrap();
}

#[tokio::test]
#[serial]
async fn test_runtime_exit_stops_loop() {
    let mut supervisor = Supervisor::new(SessionFlags::default(), None).unwrap();
    supervisor.spawn_runtime(&mut sh("exit 3")).unwrap();

    run(&mut supervisor).await;

    let session = supervisor.session();
    assert_eq!(session.runtime_status().map(|s| s.exit_code()), Some(3));
    assert_eq!(session.create_pid(), None);
    assert_eq!(supervisor.outcome(), Outcome::Exited(3));
}

#[tokio::test]
#[serial]
async fn test_fast_exec_waits_for_runtime() {
    let mut supervisor = Supervisor::new(exec_terminal(), None).unwrap();
    supervisor.spawn_runtime(&mut sh("sleep 0.3")).unwrap();
    let container = spawn("exit 0");
    supervisor.register(Role::ContainerProcess, container).unwrap();

    run(&mut supervisor).await;

    let session = supervisor.session();
    assert!(session.container_status().is_some());
    assert!(session.runtime_status().is_some());
    assert_eq!(supervisor.outcome(), Outcome::Exited(0));
}

#[tokio::test]
#[serial]
async fn test_killed_container_stops_loop() {
    let mut supervisor = Supervisor::new(SessionFlags::default(), None).unwrap();
    let runtime = supervisor.spawn_runtime(&mut sh("sleep 30")).unwrap();
    let container = spawn("kill -9 $$");
    supervisor.register(Role::ContainerProcess, container).unwrap();

    run(&mut supervisor).await;

    assert_eq!(supervisor.outcome(), Outcome::Exited(137));
    assert_eq!(supervisor.session().create_pid(), Some(runtime));

    supervisor.signal_remaining(Signal::SIGKILL);
    waitpid(runtime, None).unwrap();
}

#[tokio::test]
#[serial]
async fn test_timeout_stops_loop() {
    let mut supervisor =
        Supervisor::new(SessionFlags::default(), Some(Duration::from_millis(200))).unwrap();
    let runtime = supervisor.spawn_runtime(&mut sh("sleep 30")).unwrap();

    run(&mut supervisor).await;

    assert!(supervisor.session().timed_out());
    assert_eq!(supervisor.outcome(), Outcome::TimedOut);

    supervisor.signal_remaining(Signal::SIGKILL);
    waitpid(runtime, None).unwrap();
}

#[tokio::test]
#[serial]
async fn test_termination_is_forwarded() {
    let mut supervisor = Supervisor::new(SessionFlags::default(), None).unwrap();
    supervisor.spawn_runtime(&mut sh("sleep 30")).unwrap();

    signal::raise(Signal::SIGTERM).unwrap();
    run(&mut supervisor).await;

    assert_eq!(supervisor.outcome(), Outcome::Exited(128 + libc::SIGTERM));
}

#[tokio::test]
#[serial]
async fn test_no_children_stops_loop() {
    let mut supervisor = Supervisor::new(SessionFlags::default(), None).unwrap();

    signal::raise(WAKEUP).unwrap();
    run(&mut supervisor).await;

    assert_eq!(supervisor.outcome(), Outcome::Exited(0));
}

#[tokio::test]
#[serial]
async fn test_single_event_loop() {
    let _supervisor = Supervisor::new(SessionFlags::default(), None).unwrap();
    assert!(matches!(
        EventLoop::new(None),
        Err(MonitorError::LoopAlreadyActive)
    ));
}
