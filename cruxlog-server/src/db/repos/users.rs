//! User repository
//!
//! Users are keyed externally by their Google identity. Saving a user is an
//! upsert on that key:
//! - INSERT first
//! - on duplicate key, UPDATE the profile fields instead
//! - read back the internal id

use serde::{Deserialize, Serialize};

use crate::db::pool::Connector;
use crate::db::{Database, DbError, Query, Row, Session};

const LIST: &str = "SELECT * FROM users";

const GET: &str = "SELECT * FROM users WHERE ID = ?";

const INSERT: &str = r#"
    INSERT INTO users (GoogleID, Name, Email, Photo)
    VALUES (?, ?, ?, ?)
"#;

const UPDATE: &str = r#"
    UPDATE users SET Name = ?, Email = ?, Photo = ?
    WHERE GoogleID = ?
"#;

const ID_BY_GOOGLE_ID: &str = "SELECT ID FROM users WHERE GoogleID = ?";

/// User record. Field names on the wire are the table's column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "GoogleID")]
    pub google_id: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Photo")]
    pub photo: Option<String>,
}

impl TryFrom<&Row> for User {
    type Error = DbError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("ID")?,
            google_id: row.try_get("GoogleID")?,
            name: row.try_get("Name")?,
            email: row.try_get("Email")?,
            photo: row.try_get("Photo")?,
        })
    }
}

/// Profile as sent by the client after sign-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub google_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

/// User repository
pub struct UserRepo<'a, C: Connector> {
    db: &'a Database<C>,
}

impl<'a, C> UserRepo<'a, C>
where
    C: Connector,
    C::Connection: Session,
{
    pub fn new(db: &'a Database<C>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<User>, DbError> {
        self.db
            .fetch_all(&Query::new(LIST))
            .await?
            .iter()
            .map(User::try_from)
            .collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, DbError> {
        self.db
            .fetch_optional(&Query::new(GET).bind(id))
            .await?
            .as_ref()
            .map(User::try_from)
            .transpose()
    }

    /// Insert or update by Google id, returning the internal id.
    ///
    /// A duplicate-key rejection of the INSERT is the update path, not an
    /// error. Any other constraint rejection leaves no row for the Google id
    /// and is returned unchanged. Statements are not wrapped in a transaction.
    pub async fn upsert(&self, user: &NewUser) -> Result<i64, DbError> {
        let insert = Query::new(INSERT)
            .bind(user.google_id.as_str())
            .bind(user.name.clone())
            .bind(user.email.clone())
            .bind(user.photo.clone());

        let rejected = match self.db.run(&insert).await {
            Ok(done) => {
                if let Some(id) = done.last_insert_id().and_then(|id| i64::try_from(id).ok()) {
                    tracing::debug!(user_id = id, "created user");
                    return Ok(id);
                }
                None
            }
            Err(DbError::ConstraintViolation(reason)) => {
                tracing::debug!(%reason, "insert rejected, updating existing user");
                let update = Query::new(UPDATE)
                    .bind(user.name.clone())
                    .bind(user.email.clone())
                    .bind(user.photo.clone())
                    .bind(user.google_id.as_str());
                self.db.run(&update).await?;
                Some(reason)
            }
            Err(e) => return Err(e),
        };

        let found = self
            .db
            .fetch_optional(&Query::new(ID_BY_GOOGLE_ID).bind(user.google_id.as_str()))
            .await?;

        match (found, rejected) {
            (Some(row), _) => row.try_get("ID"),
            // No existing user: the INSERT failed on some other constraint.
            (None, Some(reason)) => Err(DbError::ConstraintViolation(reason)),
            (None, None) => Err(DbError::schema("upserted user not found by GoogleID")),
        }
    }
}
