//! Climb repository
//!
//! Climb log entries per user plus the per-month difficulty aggregate.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::pool::Connector;
use crate::db::{Database, DbError, Query, Row, Session};

const LIST: &str = "SELECT * FROM climbs";

const LIST_FOR_USER: &str = "SELECT * FROM climbs WHERE UserID = ?";

const INSERT: &str = r#"
    INSERT INTO climbs (Difficulty, Description, Flashed, Completed, UserID, UploadDateTime)
    VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
"#;

const DELETE: &str = "DELETE FROM climbs WHERE UserID = ? AND ID = ?";

const MONTHLY_AVERAGE: &str = r#"
    SELECT
        DATE_FORMAT(UploadDateTime, '%Y-%m') AS month,
        AVG(Difficulty) AS average
    FROM climbs
    WHERE UserID = ?
    GROUP BY month
    ORDER BY month
"#;

/// Climb record, serialized with the table's column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Climb {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Difficulty")]
    pub difficulty: Option<i64>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Flashed")]
    pub flashed: Option<bool>,
    #[serde(rename = "Completed")]
    pub completed: Option<bool>,
    #[serde(rename = "UserID")]
    pub user_id: i64,
    #[serde(rename = "UploadDateTime")]
    pub uploaded_at: Option<NaiveDateTime>,
}

impl TryFrom<&Row> for Climb {
    type Error = DbError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("ID")?,
            difficulty: row.try_get("Difficulty")?,
            description: row.try_get("Description")?,
            flashed: row.try_get("Flashed")?,
            completed: row.try_get("Completed")?,
            user_id: row.try_get("UserID")?,
            uploaded_at: row.try_get("UploadDateTime")?,
        })
    }
}

/// A climb to log. The upload time is set by the database.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClimb {
    pub difficulty: Option<i64>,
    pub description: Option<String>,
    #[serde(rename = "flash")]
    pub flashed: Option<bool>,
    pub completed: Option<bool>,
    #[serde(rename = "userID")]
    pub user_id: i64,
}

/// Mean difficulty of one user's climbs in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAverage {
    /// `YYYY-MM`
    pub month: String,
    pub average: Option<f64>,
}

impl TryFrom<&Row> for MonthlyAverage {
    type Error = DbError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            month: row.try_get("month")?,
            average: row.try_get("average")?,
        })
    }
}

/// Climb repository
pub struct ClimbRepo<'a, C: Connector> {
    db: &'a Database<C>,
}

impl<'a, C> ClimbRepo<'a, C>
where
    C: Connector,
    C::Connection: Session,
{
    pub fn new(db: &'a Database<C>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Climb>, DbError> {
        self.fetch_climbs(&Query::new(LIST)).await
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Climb>, DbError> {
        self.fetch_climbs(&Query::new(LIST_FOR_USER).bind(user_id)).await
    }

    /// Log a climb, returning its generated id.
    pub async fn create(&self, climb: &NewClimb) -> Result<Option<i64>, DbError> {
        let query = Query::new(INSERT)
            .bind(climb.difficulty)
            .bind(climb.description.clone())
            .bind(climb.flashed)
            .bind(climb.completed)
            .bind(climb.user_id);

        let done = self.db.run(&query).await?;
        Ok(done.last_insert_id().and_then(|id| i64::try_from(id).ok()))
    }

    /// Delete one of a user's climbs. `false` when no such climb exists for that user.
    pub async fn delete(&self, user_id: i64, climb_id: i64) -> Result<bool, DbError> {
        let done = self
            .db
            .run(&Query::new(DELETE).bind(user_id).bind(climb_id))
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Average difficulty per calendar month, oldest month first.
    pub async fn monthly_average(&self, user_id: i64) -> Result<Vec<MonthlyAverage>, DbError> {
        self.db
            .fetch_all(&Query::new(MONTHLY_AVERAGE).bind(user_id))
            .await?
            .iter()
            .map(MonthlyAverage::try_from)
            .collect()
    }

    async fn fetch_climbs(&self, query: &Query) -> Result<Vec<Climb>, DbError> {
        self.db
            .fetch_all(query)
            .await?
            .iter()
            .map(Climb::try_from)
            .collect()
    }
}
