//! Load config from file and environment; CLI flags are applied on top in main.

use serde::Deserialize;
use std::path::PathBuf;

use zweb_core::protocol::{
    DEFAULT_DOMAIN_SERVER, DEFAULT_HOST, DEFAULT_PEER_PORT, DEFAULT_PORT, DEFAULT_PUBLIC_IP,
};
use zweb_core::ServerEntry;

/// Node configuration. File: ~/.config/zweb/config.toml or /etc/zweb/config.toml.
/// Env overrides: ZWEB_HOST, ZWEB_PORT, ZWEB_DOMAIN_SERVER, ZWEB_PUBLIC_IP, ZWEB_PEER_PORT,
/// ZWEB_CACHE_DIR, ZWEB_DATA_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Resolution server bind host (default 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,
    /// Resolution server port (default 65432).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Domain server reported in replies (default 1.1.1.1).
    #[serde(default = "default_domain_server")]
    pub domain_server: String,
    /// Announce server address (default 1.1.1.1, wildcard fallback).
    #[serde(default = "default_public_ip")]
    pub public_ip: String,
    /// Announce server port (default 6881).
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    /// Volatile cache root, purged on exit.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Durable data root holding sites.json.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default)]
    pub extra_servers: Vec<ServerEntry>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_domain_server() -> String {
    DEFAULT_DOMAIN_SERVER.to_string()
}
fn default_public_ip() -> String {
    DEFAULT_PUBLIC_IP.to_string()
}
fn default_peer_port() -> u16 {
    DEFAULT_PEER_PORT
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_download_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            domain_server: default_domain_server(),
            public_ip: default_public_ip(),
            peer_port: default_peer_port(),
            cache_dir: default_cache_dir(),
            data_dir: default_data_dir(),
            download_timeout_secs: default_download_timeout_secs(),
            extra_servers: Vec::new(),
        }
    }
}

impl Config {
    /// `host:port` of the resolution server.
    pub fn local_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("ZWEB_HOST") {
        c.host = s;
    }
    if let Some(p) = var("ZWEB_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.port = p;
    }
    if let Some(s) = var("ZWEB_DOMAIN_SERVER") {
        c.domain_server = s;
    }
    if let Some(s) = var("ZWEB_PUBLIC_IP") {
        c.public_ip = s;
    }
    if let Some(p) = var("ZWEB_PEER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.peer_port = p;
    }
    if let Some(s) = var("ZWEB_CACHE_DIR") {
        c.cache_dir = PathBuf::from(s);
    }
    if let Some(s) = var("ZWEB_DATA_DIR") {
        c.data_dir = PathBuf::from(s);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/zweb/config.toml"));
    }
    out.push(PathBuf::from("/etc/zweb/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p).map(|s| toml::from_str::<Config>(&s)) {
                Ok(Ok(c)) => return Some(c),
                Ok(Err(e)) => tracing::warn!(path = %p.display(), error = %e, "invalid config file, using defaults"),
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "unreadable config file, using defaults"),
            }
            break;
        }
    }
    None
}

/// Parse `NAME=ADDRESS`; a bare `ADDRESS` is named `Peer`.
pub fn parse_extra_server(entry: &str) -> ServerEntry {
    match entry.split_once('=') {
        Some((name, address)) => ServerEntry::new(name.trim(), address.trim(), ""),
        None => ServerEntry::new("Peer", entry.trim(), ""),
    }
}
