//! Database connectivity check
//!
//! Opens one TLS connection with the configured credentials, pings it and
//! exits. Useful before deploying a new `.env`.

use anyhow::{Context, Result};
use clap::Parser;

use cruxlog_server::{MySqlConnector, Pool, PoolConfig};

use crate::config::DatabaseArgs;

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub db: DatabaseArgs,
}

pub async fn run_check(args: CheckArgs) -> Result<()> {
    let config = args.db.to_config();
    let pool = Pool::new(MySqlConnector::new(&config), PoolConfig::new().max_size(1));

    let result = pool.ping().await;
    pool.shutdown().await;

    result.with_context(|| {
        format!(
            "Could not reach database '{}' at {}:{}",
            config.database, config.host, config.port
        )
    })?;

    println!(
        "Connected to database '{}' at {}:{} (tls: {:?})",
        config.database, config.host, config.port, config.tls
    );
    Ok(())
}
