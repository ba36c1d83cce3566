//! CLI flags and the optional `key = value` config file, combined with
//! CLI-overrides-config-overrides-defaults precedence.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;

const DEFAULT_HOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const DEFAULT_PORT: u16 = 19191;
const DEFAULT_UNIX_SOCKET: &str = "/tmp/tts.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("config file {path}, line {line}: expected 'key = value', got {content:?}")]
    Malformed { path: PathBuf, line: usize, content: String },

    #[error("invalid ip address {0:?}")]
    InvalidAddress(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Which transport `-m`/`mode` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Inet,
    Unix,
}

/// Where the server listens, resolved from CLI flags and/or config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Inet(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Inet(addr) => write!(f, "{addr}"),
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Command-line flags, per spec §6: `-a addr`, `-p port`, `-m inet|unix`.
#[derive(Debug, Parser)]
#[command(name = "ttsd", about = "A lightweight in-memory time-series database daemon.")]
pub struct Cli {
    /// Listen address (inet mode) or socket path (unix mode).
    #[arg(short = 'a', long = "address")]
    pub address: Option<String>,

    /// Listen port (inet mode only).
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Transport mode.
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<Mode>,

    /// Optional config file; see `Config` for the recognized keys.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

/// The optional config file's recognized keys. All are optional; any key
/// this parser doesn't recognize is ignored rather than rejected, so older
/// config files keep working as new keys are added.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub log_level: Option<String>,
    pub log_path: Option<PathBuf>,
    pub tcp_backlog: Option<u32>,
    pub unix_socket: Option<PathBuf>,
    pub ip_address: Option<String>,
    pub ip_port: Option<u16>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let mut config = FileConfig::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Malformed {
                path: path.to_path_buf(),
                line: lineno + 1,
                content: raw_line.to_string(),
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "log_level" => config.log_level = Some(value.to_string()),
                "log_path" => config.log_path = Some(PathBuf::from(value)),
                "tcp_backlog" => {
                    config.tcp_backlog =
                        Some(value.parse().map_err(|_| ConfigError::Malformed {
                            path: path.to_path_buf(),
                            line: lineno + 1,
                            content: raw_line.to_string(),
                        })?)
                }
                "unix_socket" => config.unix_socket = Some(PathBuf::from(value)),
                "ip_address" => config.ip_address = Some(value.to_string()),
                "ip_port" => {
                    config.ip_port = Some(value.parse().map_err(|_| ConfigError::Malformed {
                        path: path.to_path_buf(),
                        line: lineno + 1,
                        content: raw_line.to_string(),
                    })?)
                }
                _ => {
                    log::warn!("ignoring unknown config key {key:?} at {}:{}", path.display(), lineno + 1);
                }
            }
        }

        Ok(config)
    }
}

/// Resolves the final listen address from CLI flags (highest precedence),
/// then the config file, then the spec §6 defaults.
pub fn resolve_listen_addr(cli: &Cli, file: &FileConfig) -> Result<ListenAddr, ConfigError> {
    let mode = cli.mode.unwrap_or(if file.unix_socket.is_some() { Mode::Unix } else { Mode::Inet });

    match mode {
        Mode::Unix => {
            let path = cli
                .address
                .clone()
                .map(PathBuf::from)
                .or_else(|| file.unix_socket.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIX_SOCKET));
            Ok(ListenAddr::Unix(path))
        }
        Mode::Inet => {
            let host = cli
                .address
                .clone()
                .or_else(|| file.ip_address.clone())
                .map(|s| s.parse::<IpAddr>().map_err(|_| ConfigError::InvalidAddress(s)))
                .transpose()?
                .unwrap_or(IpAddr::V4(DEFAULT_HOST));

            let port = cli.port.or(file.ip_port).unwrap_or(DEFAULT_PORT);
            Ok(ListenAddr::Inet(SocketAddr::new(host, port)))
        }
    }
}
