//! Startup configuration from flags, environment and `.env`
//!
//! Every setting can come from a flag or its environment variable. A `.env`
//! file in the working directory is loaded first and never overrides
//! variables already set.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use cruxlog_server::db::TlsMode;
use cruxlog_server::{DatabaseConfig, PoolConfig, ServerConfig};

/// MySQL connection settings
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Database host
    #[arg(long, env = "DB_HOST")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "DB_USER")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    /// Database (schema) name
    #[arg(long, env = "DB_NAME")]
    pub db_name: String,

    /// Certificate check for the always-on TLS: required, verify-ca, verify-identity
    #[arg(long, env = "DB_TLS", default_value = "verify-identity")]
    pub db_tls: TlsMode,
}

impl DatabaseArgs {
    pub fn to_config(&self) -> DatabaseConfig {
        let mut config = DatabaseConfig::new(
            self.db_host.as_str(),
            self.db_user.as_str(),
            self.db_password.as_str(),
            self.db_name.as_str(),
        );
        config.port = self.db_port;
        config.tls = self.db_tls;
        config
    }
}

/// Connection pool settings
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// Maximum number of open connections
    #[arg(
        long,
        env = "DB_POOL_SIZE",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub pool_size: u32,

    /// Seconds to wait for a free connection before failing the request
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT", default_value_t = 30)]
    pub acquire_timeout: u64,

    /// Seconds allowed for opening or pinging one connection
    #[arg(long, env = "DB_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,
}

impl PoolArgs {
    pub fn to_config(&self) -> PoolConfig {
        PoolConfig::new()
            .max_size(self.pool_size as usize)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout))
            .connect_timeout(Duration::from_secs(self.connect_timeout))
    }
}

/// HTTP listener settings
#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Address to bind to
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, short = 'p', env = "PORT", default_value_t = 5000)]
    pub port: u16,
}

impl ListenArgs {
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.bind, self.port),
        }
    }
}

/// Load `.env` from the working directory (or a parent) if present.
///
/// Runs before tracing is up, so a malformed file is reported on stderr.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            eprintln!("warning: ignoring malformed .env: {}", e);
            None
        }
    }
}
