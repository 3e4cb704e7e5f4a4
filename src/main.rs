use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::Signal;
use tracing::{debug, error, info};

use ctrmon::config::{ExitCommandConfig, SessionConfig};
use ctrmon::logging;
use ctrmon::monitor::supervisor::{self, Supervisor};
use ctrmon::monitor::{ExitCommand, Outcome, Role, SyncPipe};

/// Exit code for errors that leave the session in an unknown state.
const FATAL_EXIT_CODE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "ctrmon", version, about = "Container monitor")]
struct Args {
    /// Container ID
    #[arg(long)]
    cid: String,

    /// Caller API version
    #[arg(long, default_value_t = 0)]
    api_version: u32,

    /// Exec a command into a running container
    #[arg(long)]
    exec: bool,

    /// The runtime helper was given a terminal
    #[arg(short = 't', long)]
    terminal: bool,

    /// Attach to an exec session
    #[arg(long)]
    exec_attach: bool,

    /// Restore a container from a checkpoint
    #[arg(long)]
    restore: bool,

    /// Kill the session after this many seconds (0 disables)
    #[arg(short = 'T', long, default_value_t = 0)]
    timeout: u64,

    /// Command to run once the session is over
    #[arg(long)]
    exit_command: Option<PathBuf>,

    /// Extra argument for the exit command, may be repeated
    #[arg(long = "exit-command-arg", allow_hyphen_values = true)]
    exit_command_args: Vec<String>,

    /// File the runtime writes the container pid to
    #[arg(long)]
    container_pidfile: Option<PathBuf>,

    /// Inherited fd to report pids and exit codes on
    #[arg(long)]
    sync_pipe_fd: Option<i32>,

    /// Print debug logs based on log level
    #[arg(long)]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Additional tag for log records
    #[arg(long)]
    log_tag: Option<String>,

    /// Runtime helper command line
    #[arg(last = true, required = true)]
    runtime: Vec<String>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_version: self.api_version,
            exec: self.exec,
            terminal: self.terminal,
            exec_attach: self.exec_attach,
            restore: self.restore,
            timeout: self.timeout,
            exit_command: self.exit_command.clone().map(|path| ExitCommandConfig {
                path,
                args: self.exit_command_args.clone(),
            }),
            container_pidfile: self.container_pidfile.clone(),
            sync_pipe_fd: self.sync_pipe_fd,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = match logging::parse_level(args.log_level.as_deref()) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("ctrmon: {}", e);
            std::process::exit(FATAL_EXIT_CODE);
        }
    };
    if let Err(e) = logging::init(level, args.log_file.as_deref()) {
        eprintln!("ctrmon: {}", e);
        std::process::exit(FATAL_EXIT_CODE);
    }
    let _span = logging::session_span(&args.cid, args.log_tag.as_deref()).entered();

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}

fn run(args: &Args) -> anyhow::Result<i32> {
    let config = args.session_config();
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build event loop runtime")?;
    runtime.block_on(supervise(&args.runtime, &config))
}

async fn supervise(runtime: &[String], config: &SessionConfig) -> anyhow::Result<i32> {
    let mut sync_pipe = match config.sync_pipe_fd {
        // SAFETY: the launcher hands this fd over to us and nothing else in
        // the process opens it.
        Some(fd) => Some(unsafe { SyncPipe::from_inherited_fd(fd) }?),
        None => None,
    };

    supervisor::become_subreaper().context("Failed to set as subreaper")?;
    let mut supervisor = Supervisor::new(config.flags(), config.timeout())?;

    let (program, program_args) = runtime
        .split_first()
        .context("Runtime command not provided")?;
    let pid = supervisor
        .spawn_runtime(Command::new(program).args(program_args))
        .with_context(|| format!("Failed to start runtime helper {}", program))?;
    if let Some(pipe) = sync_pipe.as_mut() {
        pipe.send(pid.as_raw(), None)?;
    }

    supervisor.run().await?;

    let runtime_ok = supervisor
        .session()
        .runtime_status()
        .is_some_and(|status| status.exit_code() == 0);
    if let Some(path) = &config.container_pidfile {
        if runtime_ok && !config.exec && !supervisor.session().timed_out() {
            let container = supervisor::read_pidfile(path)?;
            info!("Container started as pid {}", container);
            supervisor.register(Role::ContainerProcess, container)?;
            supervisor.run().await?;
        }
    }

    let outcome = supervisor.outcome();
    if outcome == Outcome::TimedOut {
        supervisor.signal_remaining(Signal::SIGKILL);
    }
    debug!("Session finished: {:?}", outcome);

    if let Some(pipe) = sync_pipe.as_mut() {
        let message = (outcome == Outcome::TimedOut).then_some("timed out");
        pipe.send(outcome.report_code(), message)?;
    }

    if let Some(exit_command) = &config.exit_command {
        ExitCommand::new(exit_command).run(&mut sync_pipe)?;
    }

    Ok(outcome.process_exit_code())
}
