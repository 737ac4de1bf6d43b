// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration: TOML file plus pre/post command-line directives.
//!
//! Load order is defaults, then `-C` directives, then the config file, then
//! `-c` directives; later layers win. Directives are single TOML
//! `key = value` lines.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::limits::HARD_SERVER_LIMIT;

/// Cross-worker accept serialization primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptMutexKind {
    /// BSD `flock` on the lock file. Released by the kernel on process exit.
    Flock,
    /// POSIX `fcntl` advisory record lock. Also released on process exit.
    Fcntl,
}

/// Process model for the connection-serving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerModel {
    /// Pool of pre-spawned worker processes contending on the accept mutex.
    Prefork,
    /// One worker process containing a listener task and a thread-style pool
    /// fed from a bounded queue. For platforms where prefork is unusable.
    Threaded,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("bad directive {0:?}: expected a single `key = value` line")]
    BadDirective(String),

    #[error("invalid listen address {0:?}")]
    BadListenAddr(String),

    #[error("no listen addresses configured")]
    NoListeners,

    #[error("{field} must be at least {min}")]
    OutOfRange { field: &'static str, min: u32 },
}

fn default_listen() -> Vec<String> {
    vec!["127.0.0.1:8080".to_string()]
}

fn default_start_servers() -> u32 {
    5
}

fn default_min_spare() -> u32 {
    5
}

fn default_max_spare() -> u32 {
    10
}

fn default_max_clients() -> u32 {
    150
}

fn default_backlog() -> i32 {
    511
}

fn default_timeout() -> u64 {
    300
}

fn default_keepalive_timeout() -> u64 {
    15
}

fn default_keep_alive() -> bool {
    true
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("logs/hearthd.pid")
}

fn default_scoreboard_file() -> PathBuf {
    PathBuf::from("logs/hearthd.scoreboard")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("logs/hearthd.lock")
}

fn default_accept_mutex() -> AcceptMutexKind {
    AcceptMutexKind::Flock
}

fn default_server_model() -> ServerModel {
    ServerModel::Prefork
}

fn default_threaded_workers() -> u32 {
    20
}

fn default_queue_depth() -> u32 {
    64
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Full server configuration, as consumed by the supervisor and serialized
/// into each spawned worker's environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base directory for all relative paths.
    #[serde(default)]
    pub server_root: Option<PathBuf>,

    /// Addresses to bind, `host:port` or bare `port`.
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,

    /// Target user after binding, when started as the superuser.
    #[serde(default)]
    pub user: Option<String>,

    /// Target group after binding, when started as the superuser.
    #[serde(default)]
    pub group: Option<String>,

    #[serde(default = "default_start_servers")]
    pub start_servers: u32,

    #[serde(default = "default_min_spare")]
    pub min_spare_servers: u32,

    #[serde(default = "default_max_spare")]
    pub max_spare_servers: u32,

    /// Worker-slot ceiling; clamped to `HARD_SERVER_LIMIT`.
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,

    /// 0 means unlimited.
    #[serde(default)]
    pub max_requests_per_child: u32,

    #[serde(default = "default_backlog")]
    pub listen_backlog: i32,

    /// Optional SO_SNDBUF override for listeners.
    #[serde(default)]
    pub send_buffer_size: Option<usize>,

    /// Per-I/O deadline, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Deadline while waiting for the next keep-alive request, seconds.
    #[serde(default = "default_keepalive_timeout")]
    pub keep_alive_timeout: u64,

    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default = "default_scoreboard_file")]
    pub scoreboard_file: PathBuf,

    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    /// Error log destination: a path, or `|command` for a piped log writer.
    #[serde(default)]
    pub error_log: Option<String>,

    /// Directory the kernel should drop cores into; processes chdir here.
    #[serde(default)]
    pub coredump_dir: Option<PathBuf>,

    #[serde(default = "default_accept_mutex")]
    pub accept_mutex: AcceptMutexKind,

    #[serde(default = "default_server_model")]
    pub server_model: ServerModel,

    /// Worker-task pool size in the threaded model.
    #[serde(default = "default_threaded_workers")]
    pub threaded_workers: u32,

    /// Accepted-socket queue bound in the threaded model.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: u32,

    /// Tracing filter for the error log.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_root: None,
            listen: default_listen(),
            user: None,
            group: None,
            start_servers: default_start_servers(),
            min_spare_servers: default_min_spare(),
            max_spare_servers: default_max_spare(),
            max_clients: default_max_clients(),
            max_requests_per_child: 0,
            listen_backlog: default_backlog(),
            send_buffer_size: None,
            timeout: default_timeout(),
            keep_alive_timeout: default_keepalive_timeout(),
            keep_alive: default_keep_alive(),
            pid_file: default_pid_file(),
            scoreboard_file: default_scoreboard_file(),
            lock_file: default_lock_file(),
            error_log: None,
            coredump_dir: None,
            accept_mutex: default_accept_mutex(),
            server_model: default_server_model(),
            threaded_workers: default_threaded_workers(),
            queue_depth: default_queue_depth(),
            log_filter: default_log_filter(),
        }
    }
}

impl ServerConfig {
    /// Load configuration with directive layering.
    ///
    /// A missing file at the *default* path is not an error (the server can
    /// run on defaults plus directives); a missing explicitly-given file is.
    pub fn load(
        server_root: Option<&Path>,
        config_file: Option<&Path>,
        pre_directives: &[String],
        post_directives: &[String],
    ) -> Result<Self, ConfigError> {
        let mut table = toml::Table::new();

        for d in pre_directives {
            merge_directive(&mut table, d)?;
        }

        let (path, explicit) = match config_file {
            Some(p) => (p.to_path_buf(), true),
            None => {
                let root = server_root.unwrap_or_else(|| Path::new("."));
                (root.join("hearth.toml"), false)
            }
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let file_table: toml::Table = toml::from_str(&text)?;
                for (k, v) in file_table {
                    table.insert(k, v);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {}
            Err(e) => return Err(ConfigError::Read(path, e)),
        }

        for d in post_directives {
            merge_directive(&mut table, d)?;
        }

        let mut config: ServerConfig = toml::Value::Table(table).try_into()?;
        if let Some(root) = server_root {
            config.server_root = Some(root.to_path_buf());
        }
        config.validate()?;
        Ok(config)
    }

    /// Clamp and sanity-check the loaded values.
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::NoListeners);
        }
        self.listen_addrs()?;
        if self.max_clients == 0 {
            return Err(ConfigError::OutOfRange { field: "max_clients", min: 1 });
        }
        if self.max_clients as usize > HARD_SERVER_LIMIT {
            self.max_clients = HARD_SERVER_LIMIT as u32;
        }
        if self.start_servers > self.max_clients {
            self.start_servers = self.max_clients;
        }
        // Don't thrash: a kill-spawn cycle every tick helps nobody.
        if self.max_spare_servers < self.min_spare_servers + 1 {
            self.max_spare_servers = self.min_spare_servers + 1;
        }
        if self.threaded_workers == 0 {
            return Err(ConfigError::OutOfRange { field: "threaded_workers", min: 1 });
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::OutOfRange { field: "queue_depth", min: 1 });
        }
        Ok(())
    }

    /// Parsed listener addresses, in config order.
    pub fn listen_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.listen
            .iter()
            .map(|s| {
                if let Ok(addr) = s.parse::<SocketAddr>() {
                    return Ok(addr);
                }
                // A bare port binds the wildcard address.
                if let Ok(port) = s.parse::<u16>() {
                    return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
                }
                Err(ConfigError::BadListenAddr(s.clone()))
            })
            .collect()
    }

    pub fn server_root(&self) -> &Path {
        self.server_root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    fn root_relative(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.server_root().join(p)
        }
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root_relative(&self.pid_file)
    }

    pub fn scoreboard_path(&self) -> PathBuf {
        self.root_relative(&self.scoreboard_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root_relative(&self.lock_file)
    }

    pub fn coredump_path(&self) -> PathBuf {
        match &self.coredump_dir {
            Some(d) => self.root_relative(d),
            None => self.server_root().to_path_buf(),
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout)
    }

    /// Slots the supervisor may use; always `<= HARD_SERVER_LIMIT`.
    pub fn daemons_limit(&self) -> usize {
        self.max_clients as usize
    }
}

/// Merge one `key = value` directive into the accumulating table.
fn merge_directive(table: &mut toml::Table, directive: &str) -> Result<(), ConfigError> {
    let parsed: toml::Table = toml::from_str(directive)
        .map_err(|_| ConfigError::BadDirective(directive.to_string()))?;
    if parsed.len() != 1 {
        return Err(ConfigError::BadDirective(directive.to_string()));
    }
    for (k, v) in parsed {
        table.insert(k, v);
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
