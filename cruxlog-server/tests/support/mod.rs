//! In-memory backend for driving the full router in tests.
//!
//! Understands exactly the statements the repositories issue, matched on
//! whitespace-normalized SQL, and enforces the `users.GoogleID` unique key.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDateTime;
use cruxlog_server::db::{Connector, DbError, FromValue, Query, QueryResult, Row, Session, Value};
use cruxlog_server::{build_router, AppState, Database, Pool, PoolConfig};
use tower::ServiceExt;

#[derive(Default)]
struct Tables {
    users: Vec<Row>,
    climbs: Vec<Row>,
    tutorials: Vec<Row>,
    next_user_id: i64,
    next_climb_id: i64,
    fail_next: Option<DbError>,
}

/// Shared in-memory database. Clones see the same tables.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    tables: Arc<Mutex<Tables>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Fail the next statement with `err`.
    pub fn fail_next(&self, err: DbError) {
        self.tables.lock().unwrap().fail_next = Some(err);
    }

    pub fn add_tutorial(&self, row: Row) {
        self.tables.lock().unwrap().tutorials.push(row);
    }

    /// Insert a climb with a fixed upload time.
    pub fn add_climb(
        &self,
        user_id: i64,
        difficulty: Option<i64>,
        uploaded_at: NaiveDateTime,
    ) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        tables.next_climb_id += 1;
        let id = tables.next_climb_id;
        tables.climbs.push(climb_row(
            id,
            difficulty.into(),
            Value::Null,
            Value::Null,
            Value::Null,
            user_id,
            uploaded_at,
        ));
        id
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemorySession;

    async fn connect(&self) -> Result<MemorySession, DbError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            tables: Arc::clone(&self.tables),
        })
    }
}

pub struct MemorySession {
    tables: Arc<Mutex<Tables>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn run(&mut self, query: &Query) -> Result<QueryResult, DbError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(err) = tables.fail_next.take() {
            return Err(err);
        }

        let sql = query.sql().split_whitespace().collect::<Vec<_>>().join(" ");
        let p = query.params();

        match sql.as_str() {
            "SELECT * FROM users" => Ok(QueryResult::Rows(tables.users.clone())),
            "SELECT * FROM users WHERE ID = ?" => {
                Ok(QueryResult::Rows(matching(&tables.users, "ID", &p[0])))
            }
            "SELECT ID FROM users WHERE GoogleID = ?" => Ok(QueryResult::Rows(
                matching(&tables.users, "GoogleID", &p[0])
                    .into_iter()
                    .map(|row| Row::new().with("ID", row.get("ID").cloned().unwrap_or(Value::Null)))
                    .collect(),
            )),
            "INSERT INTO users (GoogleID, Name, Email, Photo) VALUES (?, ?, ?, ?)" => {
                if !matching(&tables.users, "GoogleID", &p[0]).is_empty() {
                    return Err(DbError::ConstraintViolation(
                        "Duplicate entry for key 'users.GoogleID'".into(),
                    ));
                }
                tables.next_user_id += 1;
                let id = tables.next_user_id;
                tables.users.push(
                    Row::new()
                        .with("ID", id)
                        .with("GoogleID", p[0].clone())
                        .with("Name", p[1].clone())
                        .with("Email", p[2].clone())
                        .with("Photo", p[3].clone()),
                );
                Ok(affected(1, Some(id)))
            }
            "UPDATE users SET Name = ?, Email = ?, Photo = ? WHERE GoogleID = ?" => {
                let mut updated = 0;
                for user in tables.users.iter_mut().filter(|u| u.get("GoogleID") == Some(&p[3])) {
                    let id = user.get("ID").cloned().unwrap_or(Value::Null);
                    *user = Row::new()
                        .with("ID", id)
                        .with("GoogleID", p[3].clone())
                        .with("Name", p[0].clone())
                        .with("Email", p[1].clone())
                        .with("Photo", p[2].clone());
                    updated += 1;
                }
                Ok(affected(updated, None))
            }
            "SELECT * FROM climbs" => Ok(QueryResult::Rows(tables.climbs.clone())),
            "SELECT * FROM climbs WHERE UserID = ?" => {
                Ok(QueryResult::Rows(matching(&tables.climbs, "UserID", &p[0])))
            }
            "INSERT INTO climbs (Difficulty, Description, Flashed, Completed, UserID, UploadDateTime) VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)" => {
                let user_id = i64::from_value(&p[4]).ok_or_else(|| {
                    DbError::ConstraintViolation("Column 'UserID' cannot be null".into())
                })?;
                tables.next_climb_id += 1;
                let id = tables.next_climb_id;
                let row = climb_row(
                    id,
                    p[0].clone(),
                    p[1].clone(),
                    p[2].clone(),
                    p[3].clone(),
                    user_id,
                    chrono::Utc::now().naive_utc(),
                );
                tables.climbs.push(row);
                Ok(affected(1, Some(id)))
            }
            "DELETE FROM climbs WHERE UserID = ? AND ID = ?" => {
                let before = tables.climbs.len();
                tables
                    .climbs
                    .retain(|c| !(c.get("UserID") == Some(&p[0]) && c.get("ID") == Some(&p[1])));
                Ok(affected((before - tables.climbs.len()) as u64, None))
            }
            s if s.starts_with("SELECT DATE_FORMAT(UploadDateTime, '%Y-%m') AS month") => {
                Ok(QueryResult::Rows(monthly_average(&tables.climbs, &p[0])))
            }
            "SELECT * FROM tutorials" => Ok(QueryResult::Rows(tables.tutorials.clone())),
            other => Err(DbError::SyntaxOrSchema(format!("unsupported statement: {other}"))),
        }
    }
}

fn matching(rows: &[Row], column: &str, value: &Value) -> Vec<Row> {
    rows.iter()
        .filter(|row| row.get(column) == Some(value))
        .cloned()
        .collect()
}

fn affected(rows: u64, last_insert_id: Option<i64>) -> QueryResult {
    QueryResult::Affected {
        rows,
        last_insert_id: last_insert_id.map(|id| id as u64),
    }
}

fn climb_row(
    id: i64,
    difficulty: Value,
    description: Value,
    flashed: Value,
    completed: Value,
    user_id: i64,
    uploaded_at: NaiveDateTime,
) -> Row {
    Row::new()
        .with("ID", id)
        .with("Difficulty", difficulty)
        .with("Description", description)
        .with("Flashed", flashed)
        .with("Completed", completed)
        .with("UserID", user_id)
        .with("UploadDateTime", uploaded_at)
}

fn monthly_average(climbs: &[Row], user_id: &Value) -> Vec<Row> {
    let mut months: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for climb in matching(climbs, "UserID", user_id) {
        let Some(Value::DateTime(at)) = climb.get("UploadDateTime") else {
            continue;
        };
        let bucket = months.entry(at.format("%Y-%m").to_string()).or_default();
        if let Some(d) = climb.get("Difficulty").and_then(i64::from_value) {
            bucket.push(d);
        }
    }

    months
        .into_iter()
        .map(|(month, values)| {
            let average = if values.is_empty() {
                Value::Null
            } else {
                Value::Float(values.iter().sum::<i64>() as f64 / values.len() as f64)
            };
            Row::new().with("month", month).with("average", average)
        })
        .collect()
}

/// Router over a fresh in-memory database.
pub fn app(max_size: usize) -> (Router, Database<MemoryConnector>, MemoryConnector) {
    let connector = MemoryConnector::new();
    let db = Database::new(Pool::new(
        connector.clone(),
        PoolConfig::new().max_size(max_size),
    ));
    let router = build_router(Arc::new(AppState::new(db.clone())));
    (router, db, connector)
}

/// Send one request and return status plus parsed JSON body (`Null` if the body is not JSON).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Body as plain text.
pub async fn send_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
