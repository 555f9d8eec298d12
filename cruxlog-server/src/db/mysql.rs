//! MySQL backend over sqlx
//!
//! Each pooled connection is one `MySqlConnection`; pooling is done by
//! [`crate::db::Pool`], not by sqlx. TLS is always on.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow,
    MySqlSslMode,
};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};

use super::executor::Session;
use super::pool::Connector;
use super::{DbError, Query, QueryResult, Row, Value};

const DEFAULT_PORT: u16 = 3306;

/// MySQL server error numbers that mean a constraint rejected the write.
const CONSTRAINT_ERRORS: &[u16] = &[
    1048, // ER_BAD_NULL_ERROR
    1062, // ER_DUP_ENTRY
    1364, // ER_NO_DEFAULT_FOR_FIELD
    1451, // ER_ROW_IS_REFERENCED_2
    1452, // ER_NO_REFERENCED_ROW_2
    1586, // ER_DUP_ENTRY_WITH_KEY_NAME
    3819, // ER_CHECK_CONSTRAINT_VIOLATED
];

/// How strictly the server certificate is checked. TLS itself is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Encrypt, no certificate checks.
    Required,
    /// Verify the certificate chain.
    VerifyCa,
    /// Verify the chain and the host name.
    #[default]
    VerifyIdentity,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "required" => Ok(Self::Required),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-identity" => Ok(Self::VerifyIdentity),
            other => Err(format!(
                "invalid TLS mode '{}': expected required, verify-ca or verify-identity",
                other
            )),
        }
    }
}

impl From<TlsMode> for MySqlSslMode {
    fn from(mode: TlsMode) -> Self {
        match mode {
            TlsMode::Required => MySqlSslMode::Required,
            TlsMode::VerifyCa => MySqlSslMode::VerifyCa,
            TlsMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        }
    }
}

/// Connection settings, read once at startup.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: TlsMode,
}

impl DatabaseConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            tls: TlsMode::default(),
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.tls.into())
    }
}

// Keep the password out of logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Opens TLS connections to one MySQL database.
#[derive(Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            options: config.connect_options(),
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlSession;

    async fn connect(&self) -> Result<MySqlSession, DbError> {
        let conn = self.options.connect().await.map_err(translate)?;
        Ok(MySqlSession { conn })
    }

    async fn ping(&self, session: &mut MySqlSession) -> Result<(), DbError> {
        session.conn.ping().await.map_err(translate)
    }

    async fn close(&self, session: MySqlSession) {
        if let Err(e) = session.conn.close().await {
            tracing::debug!(error = %e, "error closing MySQL connection");
        }
    }
}

/// One open MySQL connection.
pub struct MySqlSession {
    conn: MySqlConnection,
}

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

#[async_trait]
impl Session for MySqlSession {
    async fn run(&mut self, query: &Query) -> Result<QueryResult, DbError> {
        let statement = query
            .params()
            .iter()
            .fold(sqlx::query(query.sql()), bind_value);

        if query.returns_rows() {
            let rows = statement
                .fetch_all(&mut self.conn)
                .await
                .map_err(translate)?;
            let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult::Rows(rows))
        } else {
            let done = statement.execute(&mut self.conn).await.map_err(translate)?;
            Ok(QueryResult::Affected {
                rows: done.rows_affected(),
                last_insert_id: Some(done.last_insert_id()).filter(|id| *id != 0),
            })
        }
    }
}

fn bind_value<'q>(statement: MySqlQuery<'q>, value: &'q Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => statement.bind(None::<String>),
        Value::Bool(v) => statement.bind(*v),
        Value::Int(v) => statement.bind(*v),
        Value::UInt(v) => statement.bind(*v),
        Value::Float(v) => statement.bind(*v),
        Value::Text(v) => statement.bind(v.as_str()),
        Value::DateTime(v) => statement.bind(*v),
        Value::Date(v) => statement.bind(*v),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let is_null = row.try_get_raw(index).map_err(translate)?.is_null();
        let value = if is_null {
            Value::Null
        } else {
            decode_column(row, index, column.type_info().name()).map_err(translate)?
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Value::Int(row.try_get(index)?),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => Value::UInt(row.try_get(index)?),
        "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => Value::Float(row.try_get(index)?),
        // AVG() over integers comes back as DECIMAL.
        "DECIMAL" => row
            .try_get::<Decimal, _>(index)?
            .to_f64()
            .map_or(Value::Null, Value::Float),
        "DATETIME" | "TIMESTAMP" => Value::DateTime(row.try_get(index)?),
        "DATE" => Value::Date(row.try_get(index)?),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::Text(text),
            Err(_) => {
                let bytes: Vec<u8> = row.try_get(index)?;
                Value::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}

/// Map a sqlx error onto the database error taxonomy.
pub(crate) fn translate(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            let constraint = number.is_some_and(|n| CONSTRAINT_ERRORS.contains(&n))
                || matches!(
                    db.kind(),
                    ErrorKind::UniqueViolation
                        | ErrorKind::ForeignKeyViolation
                        | ErrorKind::NotNullViolation
                        | ErrorKind::CheckViolation
                );

            if constraint {
                DbError::ConstraintViolation(db.message().to_owned())
            } else {
                DbError::SyntaxOrSchema(db.message().to_owned())
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbError::ConnectionLost(err.to_string()),
        other => DbError::SyntaxOrSchema(other.to_string()),
    }
}
