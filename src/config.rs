//! Configuration module for the aesdsocket server.
//!
//! The server is driven entirely by fixed defaults. The command line only
//! selects background mode and the log level.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 9000;

/// Pending-connection backlog passed to listen(2).
pub const DEFAULT_BACKLOG: i32 = 16;

/// Location of the shared append-only store.
pub const DEFAULT_DATA_FILE: &str = "/var/tmp/aesdsocketdata";

/// Maximum bytes pulled from a socket per receive.
pub const DEFAULT_RECV_CHUNK: usize = 1024;

/// Bytes read from the store per echo write.
pub const DEFAULT_ECHO_CHUNK: usize = 1024;

/// Command-line arguments for the socket server
#[derive(Parser, Debug)]
#[command(name = "aesdsocket")]
#[command(version = "0.1.0")]
#[command(about = "Append-and-replay TCP socket server", long_about = None)]
pub struct CliArgs {
    /// Run in the background, detached from the controlling terminal
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub backlog: i32,
    pub data_file: PathBuf,
    pub recv_chunk: usize,
    pub echo_chunk: usize,
    pub daemon: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            recv_chunk: DEFAULT_RECV_CHUNK,
            echo_chunk: DEFAULT_ECHO_CHUNK,
            daemon: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process command line.
    pub fn load() -> Self {
        Self::from_args(CliArgs::parse())
    }

    /// Overlay parsed CLI arguments on the fixed defaults.
    pub fn from_args(cli: CliArgs) -> Self {
        Config {
            daemon: cli.daemon,
            log_level: cli.log_level,
            ..Config::default()
        }
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
