// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hearthd` - the hearth HTTP server.
//!
//! One binary, three roles, picked at startup: supervisor (the default),
//! prefork worker (worker environment present), or one-process debug
//! server (`-X`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use hearth_core::limits::{
    HARD_SERVER_LIMIT, MAX_SPAWN_RATE, SCOREBOARD_MAINTENANCE_INTERVAL,
};
use hearth_core::{ServerConfig, ServerModel};
use hearth_http::{DefaultHandler, Handler, SERVER_STRING};
use hearth_net::{bind_listeners, ListenOptions, ListenerRing};
use hearth_scoreboard::MemScoreboard;

use hearth_server::lifecycle::{self, PidFile};
use hearth_server::signal::{SupervisorSignals, WorkerSignals};
use hearth_server::supervisor::{ConfigSources, Supervisor};
use hearth_server::{env, threaded, worker};

#[derive(Parser)]
#[command(
    name = "hearthd",
    about = "hearth pre-forked HTTP server",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// ServerRoot: base directory for relative paths.
    #[arg(short = 'd', value_name = "DIR")]
    server_root: Option<PathBuf>,

    /// Config file (default: <server-root>/hearth.toml).
    #[arg(short = 'f', value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Directive processed before the config file (TOML `key = value`).
    #[arg(short = 'C', value_name = "DIRECTIVE")]
    pre_directives: Vec<String>,

    /// Directive processed after the config file.
    #[arg(short = 'c', value_name = "DIRECTIVE")]
    post_directives: Vec<String>,

    /// One-process debug mode: no detach, no worker processes.
    #[arg(short = 'X')]
    one_process: bool,

    /// Print the version and exit.
    #[arg(short = 'v')]
    version: bool,

    /// Print version and build settings, then exit.
    #[arg(short = 'V')]
    version_full: bool,

    /// List configuration directives and exit.
    #[arg(short = 'h')]
    list_directives: bool,

    /// List compiled-in request handlers and exit.
    #[arg(short = 'l')]
    list_handlers: bool,

    #[arg(long = "help", action = clap::ArgAction::Help, help = "Print help")]
    help: Option<bool>,
}

fn main() -> ExitCode {
    // Workers are this same binary with the worker environment set; they
    // never look at argv.
    if let (Some(slot), Some(generation), Some(config)) =
        (env::worker_slot(), env::generation(), env::worker_config())
    {
        return run_worker_process(config, slot, generation);
    }

    let cli = Cli::parse();

    if cli.version {
        println!("{}", SERVER_STRING);
        return ExitCode::SUCCESS;
    }
    if cli.version_full {
        print_build_settings();
        return ExitCode::SUCCESS;
    }
    if cli.list_directives {
        print_directives();
        return ExitCode::SUCCESS;
    }
    if cli.list_handlers {
        let handler = DefaultHandler;
        println!("{}", handler.name());
        return ExitCode::SUCCESS;
    }

    let sources = ConfigSources {
        server_root: cli.server_root,
        config_file: cli.config_file,
        pre_directives: cli.pre_directives,
        post_directives: cli.post_directives,
    };
    let config = match sources.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hearthd: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.one_process {
        return run_one_process(config);
    }

    if !env::detached() {
        // Relaunch in the background; the child re-enters main detached.
        return match lifecycle::detach() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("hearthd: {e}");
                ExitCode::FAILURE
            }
        };
    }

    run_supervisor(config, sources)
}

fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn run_supervisor(config: ServerConfig, sources: ConfigSources) -> ExitCode {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("hearthd: {e}");
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(async move {
        if let Err(e) = lifecycle::become_group_leader(true) {
            eprintln!("hearthd: {e}");
            return ExitCode::FAILURE;
        }
        let mut log = match lifecycle::init_supervisor_logging(&config) {
            Ok(log) => log,
            Err(e) => {
                eprintln!("hearthd: {e}");
                return ExitCode::FAILURE;
            }
        };
        let pid_file = match PidFile::acquire(&config) {
            Ok(pid_file) => pid_file,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };
        let signals = match SupervisorSignals::install() {
            Ok(signals) => signals,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };
        let mut supervisor = match Supervisor::new(config, sources, pid_file) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };
        if let Some(piped) = log.piped.take() {
            supervisor.register_piped_logger(piped);
        }
        match supervisor.run(signals).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("fatal: {e}");
                ExitCode::FAILURE
            }
        }
    })
}

fn run_worker_process(config: ServerConfig, slot: usize, generation: u32) -> ExitCode {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("hearthd worker: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log = lifecycle::init_worker_logging(&config);
    let code = rt.block_on(async move {
        if env::threaded_worker() {
            threaded::threaded_worker_main(config, generation).await
        } else {
            worker::worker_main(config, slot, generation).await
        }
    });
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// `-X`: serve in this process with a single worker task. No detach, no
/// children, heap scoreboard.
fn run_one_process(mut config: ServerConfig) -> ExitCode {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("hearthd: {e}");
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(async move {
        let _log = lifecycle::init_worker_logging(&config);
        let addrs = match config.listen_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                eprintln!("hearthd: {e}");
                return ExitCode::FAILURE;
            }
        };
        let options = ListenOptions {
            backlog: config.listen_backlog,
            send_buffer_size: config.send_buffer_size,
        };
        let bound = match bind_listeners(&addrs, options, None) {
            Ok(bound) => bound,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };
        let ring = match ListenerRing::from_std(bound.into_parts()) {
            Ok(ring) => ring,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };
        let signals =
            match WorkerSignals::install(hearth_server::timeout::TimeoutPlane::new()) {
                Ok(signals) => signals,
                Err(e) => {
                    error!("{e}");
                    return ExitCode::FAILURE;
                }
            };
        config.threaded_workers = 1;
        let handler: Arc<dyn Handler> = Arc::new(DefaultHandler);
        let scoreboard = Arc::new(MemScoreboard::new(1));
        let code = threaded::run_dispatcher(
            config,
            ring,
            scoreboard,
            handler,
            1,
            signals.die_token(),
            signals.graceful_token(),
        )
        .await;
        ExitCode::from(code.clamp(0, 255) as u8)
    })
}

fn print_build_settings() {
    let settings = serde_json::json!({
        "server": SERVER_STRING,
        "hard_server_limit": HARD_SERVER_LIMIT,
        "max_spawn_rate": MAX_SPAWN_RATE,
        "maintenance_interval_ms": SCOREBOARD_MAINTENANCE_INTERVAL.as_millis() as u64,
        "default_server_model": format!("{:?}", ServerModel::Prefork).to_lowercase(),
    });
    match serde_json::to_string_pretty(&settings) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{}", SERVER_STRING),
    }
}

fn print_directives() {
    let directives: &[(&str, &str)] = &[
        ("server_root", "base directory for relative paths"),
        ("listen", "addresses to bind, [\"host:port\", ...]"),
        ("user", "target user after binding, when started as root"),
        ("group", "target group after binding"),
        ("start_servers", "workers spawned at startup"),
        ("min_spare_servers", "spawn when fewer workers are idle"),
        ("max_spare_servers", "retire when more workers are idle"),
        ("max_clients", "worker-slot ceiling"),
        ("max_requests_per_child", "connections per worker before retirement, 0=unlimited"),
        ("listen_backlog", "listen(2) backlog"),
        ("send_buffer_size", "SO_SNDBUF override"),
        ("timeout", "per-I/O deadline, seconds"),
        ("keep_alive_timeout", "deadline between keep-alive requests, seconds"),
        ("keep_alive", "allow persistent connections"),
        ("pid_file", "supervisor pid file path"),
        ("scoreboard_file", "worker census file path"),
        ("lock_file", "accept-mutex lock file path"),
        ("error_log", "log path, or |command for a piped writer"),
        ("coredump_dir", "where crashing processes leave cores"),
        ("accept_mutex", "flock | fcntl"),
        ("server_model", "prefork | threaded"),
        ("threaded_workers", "worker tasks in the threaded model"),
        ("queue_depth", "accepted-socket queue bound in the threaded model"),
        ("log_filter", "tracing filter for the error log"),
    ];
    for (name, help) in directives {
        println!("{name:24} {help}");
    }
}
