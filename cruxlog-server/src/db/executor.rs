//! Query execution over pooled connections
//!
//! The executor never retries. Only the caller knows whether re-issuing a
//! write is safe, so a [`DbError::ConnectionLost`] is surfaced as-is after
//! the connection has been invalidated.

use async_trait::async_trait;

use super::pool::{Connector, Pool, PooledConnection};
use super::{DbError, Query, QueryResult, Row};

/// A live backend session able to run one statement at a time.
#[async_trait]
pub trait Session: Send + 'static {
    /// Send the statement with its bound parameters.
    ///
    /// Implementations translate backend failures into [`DbError`].
    async fn run(&mut self, query: &Query) -> Result<QueryResult, DbError>;
}

/// Execute `query` on an acquired connection.
///
/// Arity is checked before anything is sent. Any I/O failure invalidates
/// `conn` so the pool destroys it on release.
pub async fn execute<C>(
    conn: &mut PooledConnection<C>,
    query: &Query,
) -> Result<QueryResult, DbError>
where
    C: Connector,
    C::Connection: Session,
{
    query.check_arity()?;

    match conn.run(query).await {
        Ok(result) => Ok(result),
        Err(err) => {
            if let DbError::ConnectionLost(reason) = &err {
                tracing::warn!(%reason, "connection lost during query, invalidating");
                conn.invalidate();
            } else {
                tracing::debug!(error = %err, sql = query.sql(), "query failed");
            }
            Err(err)
        }
    }
}

/// Pool plus executor: one acquire, one statement, one release per call.
pub struct Database<C: Connector> {
    pool: Pool<C>,
}

impl<C: Connector> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C> Database<C>
where
    C: Connector,
    C::Connection: Session,
{
    pub fn new(pool: Pool<C>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    /// Run a single statement on a pooled connection.
    pub async fn run(&self, query: &Query) -> Result<QueryResult, DbError> {
        // Reject before acquire: acquiring may itself open a connection.
        query.check_arity()?;

        let mut conn = self.pool.acquire().await?;
        execute(&mut conn, query).await
    }

    pub async fn fetch_all(&self, query: &Query) -> Result<Vec<Row>, DbError> {
        Ok(self.run(query).await?.into_rows())
    }

    pub async fn fetch_optional(&self, query: &Query) -> Result<Option<Row>, DbError> {
        Ok(self.fetch_all(query).await?.into_iter().next())
    }
}
