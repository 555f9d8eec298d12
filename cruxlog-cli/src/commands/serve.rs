//! HTTP server command
//!
//! Runs the cruxlog API until SIGTERM or Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;

use cruxlog_server::{run_server, Database, MySqlConnector, Pool};

use crate::config::{DatabaseArgs, ListenArgs, PoolArgs};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub listen: ListenArgs,

    #[command(flatten)]
    pub db: DatabaseArgs,

    #[command(flatten)]
    pub pool: PoolArgs,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let db_config = args.db.to_config();
    let pool_config = args.pool.to_config();
    let server_config = args.listen.to_config();

    tracing::info!(
        database = %db_config.database,
        host = %db_config.host,
        max_connections = pool_config.max_size,
        "Starting cruxlog server on {}",
        server_config.bind_addr
    );
    tracing::debug!(?db_config, ?pool_config, "configuration");

    // Connections open lazily; the server probes once before listening
    let pool = Pool::new(MySqlConnector::new(&db_config), pool_config);

    // Run server (blocks until shutdown)
    run_server(Database::new(pool), server_config)
        .await
        .context("Server error")?;

    Ok(())
}
