use clap::{ArgGroup, Parser};
use flexi_logger::{
    Age, Cleanup, Criterion, FileSpec, LogSpecBuilder, Logger, LoggerHandle, Naming,
};
use ipc::{Command, ControlServer};
use log::{LevelFilter, error, info, warn};
use reactor::Reactor;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    str::FromStr,
    sync::{Arc, atomic::AtomicBool},
};
use wayland::Daemon;

mod backend;
mod config;
mod input;
mod ipc;
mod reactor;
mod registry;
mod render;
mod switcher;
mod wayland;

/// MRU window switcher for Hyprland and wlroots compositors.
#[derive(Parser, Debug)]
#[command(name = "wswitch")]
#[command(group(ArgGroup::new("mode").required(true).args(["daemon", "command"])))]
struct Args {
    /// Run the switcher daemon
    #[arg(long)]
    daemon: bool,

    /// Config file used by the daemon
    #[arg(short, long, requires = "daemon", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Command sent to a running daemon
    #[arg(value_enum)]
    command: Option<Command>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match args.command {
        Some(command) => send(command),
        None => daemon(args.config.as_deref()),
    }
}

fn send(command: Command) -> ExitCode {
    let _logger = Logger::with(LogSpecBuilder::new().default(LevelFilter::Warn).build()).start();

    let path = ipc::socket_path();
    if !ipc::is_daemon_running(&path) {
        error!("wswitch daemon is not running");
        return ExitCode::FAILURE;
    }

    match ipc::send_command(&path, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to send {}: {e}", command.to_wire());
            ExitCode::FAILURE
        }
    }
}

fn daemon(config_path: Option<&Path>) -> ExitCode {
    let path = config_path.map_or_else(config::default_config_path, Path::to_path_buf);
    let (config, config_error) = match config::read_config(&path) {
        Ok(config) => (config, None),
        Err(e) => (config::Config::default(), Some(e)),
    };

    let _logger = match init_logger(&config.log_level) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to start logger: {e}");
            return ExitCode::FAILURE;
        }
    };
    log_panics::init();
    if let Some(e) = config_error {
        warn!("{e}, using default config");
    }

    match run(config) {
        Ok(()) => {
            info!("Daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(log_level: &str) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    let level = LevelFilter::from_str(log_level).unwrap_or(LevelFilter::Info);

    Logger::with(
        LogSpecBuilder::new()
            .default(LevelFilter::Warn)
            .module(
                "wswitch",
                if cfg!(debug_assertions) {
                    level.max(LevelFilter::Info)
                } else {
                    level
                },
            )
            .build(),
    )
    .log_to_file(FileSpec::default().directory("/tmp/wswitch"))
    .duplicate_to_stderr(flexi_logger::Duplicate::All)
    .rotate(
        Criterion::Age(Age::Day),
        Naming::Timestamps,
        Cleanup::KeepLogFiles(7),
    )
    .start()
}

fn run(config: config::Config) -> anyhow::Result<()> {
    let quit = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&quit))?;
    }

    let server = ControlServer::bind(&ipc::socket_path())?;
    info!(
        "Icon theme {} (fallback {}), follow monitor: {}",
        config.icon_theme, config.icon_fallback, config.follow_monitor
    );

    let connection = wayland::connect()?;
    let backend = backend::init(config.backend, &connection)?;
    let (event_queue, mut daemon) = Daemon::new(&connection, config, backend)?;

    let mut reactor = Reactor::new(connection, event_queue, server, quit);
    reactor.run(&mut daemon)
}
