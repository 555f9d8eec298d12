//! cruxlog-server: HTTP API for a climbing log
//!
//! Users, their climbs, tutorials and a monthly difficulty average, served
//! over a pooled MySQL connection. The pool and query executor are generic
//! over [`db::Connector`] so the whole stack runs against any backend that
//! can open a [`db::Session`].

pub mod db;
pub mod http;

pub use db::{Database, DatabaseConfig, DbError, MySqlConnector, Pool, PoolConfig};
pub use http::{build_router, run_server, AppState, ServerConfig, ServerError};
