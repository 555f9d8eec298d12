//! Database layer - connection pool, executor and repositories
//!
//! # Design Principles
//!
//! - Explicit pool owned by the application state, no global handle
//! - One statement per acquire; no multi-statement transactions
//! - Errors carry their kind up to the caller, never swallowed
//! - No retries below the caller

pub mod error;
pub mod executor;
pub mod mysql;
pub mod pool;
pub mod query;
pub mod repos;
pub mod value;

pub use error::DbError;
pub use executor::{execute, Database, Session};
pub use mysql::{DatabaseConfig, MySqlConnector, MySqlSession, TlsMode};
pub use pool::{Connector, Pool, PoolConfig, PoolStatus, PooledConnection};
pub use query::{Query, QueryResult};
pub use repos::*;
pub use value::{FromValue, Row, Value};
