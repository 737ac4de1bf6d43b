// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use yare::parameterized;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("hearth.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn defaults_when_no_file() {
    let config = ServerConfig::load(None, None, &[], &[]).unwrap();
    assert_eq!(config.start_servers, 5);
    assert_eq!(config.max_clients, 150);
    assert_eq!(config.listen, vec!["127.0.0.1:8080".to_string()]);
    assert!(config.keep_alive);
}

#[test]
fn missing_explicit_file_is_an_error() {
    let err =
        ServerConfig::load(None, Some(Path::new("/nonexistent/hearth.toml")), &[], &[])
            .unwrap_err();
    assert!(matches!(err, ConfigError::Read(_, _)));
}

#[test]
fn file_overrides_pre_directives_and_post_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    write_config(&dir, "start_servers = 3\ntimeout = 60\n");

    let pre = vec!["start_servers = 9".to_string(), "max_clients = 20".to_string()];
    let post = vec!["timeout = 7".to_string()];
    let config = ServerConfig::load(Some(dir.path()), None, &pre, &post).unwrap();

    // file wins over -C
    assert_eq!(config.start_servers, 3);
    // -C survives where the file is silent
    assert_eq!(config.max_clients, 20);
    // -c wins over the file
    assert_eq!(config.timeout, 7);
}

#[parameterized(
    empty = { "" },
    two_keys = { "a = 1\nb = 2" },
    not_toml = { "Listen 8080" },
)]
fn bad_directives_rejected(directive: &str) {
    let err = ServerConfig::load(None, None, &[directive.to_string()], &[]).unwrap_err();
    assert!(matches!(err, ConfigError::BadDirective(_)));
}

#[test]
fn max_clients_clamped_to_hard_limit() {
    let pre = vec![format!("max_clients = {}", HARD_SERVER_LIMIT * 4)];
    let config = ServerConfig::load(None, None, &pre, &[]).unwrap();
    assert_eq!(config.daemons_limit(), HARD_SERVER_LIMIT);
}

#[test]
fn spare_window_does_not_thrash() {
    let pre = vec!["min_spare_servers = 8".to_string(), "max_spare_servers = 2".to_string()];
    let config = ServerConfig::load(None, None, &pre, &[]).unwrap();
    assert_eq!(config.max_spare_servers, 9);
}

#[test]
fn bare_port_listen_binds_wildcard() {
    let pre = vec!["listen = [\"8081\"]".to_string()];
    let config = ServerConfig::load(None, None, &pre, &[]).unwrap();
    let addrs = config.listen_addrs().unwrap();
    assert_eq!(addrs[0], SocketAddr::from(([0, 0, 0, 0], 8081)));
}

#[test]
fn bad_listen_addr_rejected() {
    let pre = vec!["listen = [\"nonsense\"]".to_string()];
    let err = ServerConfig::load(None, None, &pre, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::BadListenAddr(_)));
}

#[test]
fn paths_resolve_against_server_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::load(Some(dir.path()), None, &[], &[]).unwrap();
    assert_eq!(config.pid_path(), dir.path().join("logs/hearthd.pid"));
    assert_eq!(config.coredump_path(), dir.path());
}

#[test]
fn config_round_trips_through_json_env() {
    // Workers receive the resolved config serialized into their environment.
    let config = ServerConfig::load(None, None, &["max_clients = 2".to_string()], &[]).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: ServerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.max_clients, 2);
    assert_eq!(back.listen, config.listen);
}
