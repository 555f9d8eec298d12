//! Tutorial repository
//!
//! Tutorials are reference content managed outside this service; rows are
//! passed through as stored.

use crate::db::pool::Connector;
use crate::db::{Database, DbError, Query, Row, Session};

const LIST: &str = "SELECT * FROM tutorials";

/// Tutorial repository
pub struct TutorialRepo<'a, C: Connector> {
    db: &'a Database<C>,
}

impl<'a, C> TutorialRepo<'a, C>
where
    C: Connector,
    C::Connection: Session,
{
    pub fn new(db: &'a Database<C>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Row>, DbError> {
        self.db.fetch_all(&Query::new(LIST)).await
    }
}
