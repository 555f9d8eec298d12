//! Query requests and results
//!
//! Statements are analysed with `sqlparser`'s MySQL dialect: the tokenizer
//! finds `?` placeholders (never inside literals, quoted identifiers or
//! comments) and the parser decides whether a statement yields rows.

use std::borrow::Cow;

use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{DbError, Row, Value};

/// Leading keywords of statements that produce a result set. Used when the
/// parser does not understand the statement.
const READ_KEYWORDS: &[Keyword] = &[
    Keyword::SELECT,
    Keyword::SHOW,
    Keyword::WITH,
    Keyword::DESCRIBE,
    Keyword::DESC,
    Keyword::EXPLAIN,
];

/// A parameterized statement with positional `?` placeholders.
///
/// Built once with [`Query::bind`] and never modified after it is handed to
/// the executor.
///
/// ```
/// use cruxlog_server::db::Query;
///
/// let query = Query::new("SELECT * FROM climbs WHERE UserID = ?").bind(4i64);
/// assert_eq!(query.placeholder_count().unwrap(), 1);
/// assert!(query.returns_rows());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: Cow<'static, str>,
    params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Number of `?` placeholders outside literals, quoted identifiers and comments.
    ///
    /// Fails with [`DbError::SyntaxOrSchema`] when the SQL cannot be tokenized,
    /// e.g. an unterminated string literal.
    pub fn placeholder_count(&self) -> Result<usize, DbError> {
        let count = self
            .tokens()?
            .iter()
            .filter(|token| matches!(token, Token::Placeholder(p) if p == "?"))
            .count();
        Ok(count)
    }

    /// Fails with [`DbError::MalformedQuery`] when placeholders and
    /// parameters disagree.
    pub fn check_arity(&self) -> Result<(), DbError> {
        let placeholders = self.placeholder_count()?;
        if placeholders != self.params.len() {
            return Err(DbError::MalformedQuery {
                placeholders,
                params: self.params.len(),
            });
        }
        Ok(())
    }

    /// Whether the statement yields rows rather than an affected-row count.
    pub fn returns_rows(&self) -> bool {
        match Parser::parse_sql(&MySqlDialect {}, &self.sql) {
            Ok(statements) => statements.first().is_some_and(is_read),
            Err(_) => self.leading_keyword().is_some_and(|k| READ_KEYWORDS.contains(&k)),
        }
    }

    fn tokens(&self) -> Result<Vec<Token>, DbError> {
        Tokenizer::new(&MySqlDialect {}, &self.sql)
            .tokenize()
            .map_err(|e| DbError::SyntaxOrSchema(e.to_string()))
    }

    /// First keyword after whitespace, comments and opening parentheses.
    fn leading_keyword(&self) -> Option<Keyword> {
        self.tokens()
            .ok()?
            .into_iter()
            .find(|token| !matches!(token, Token::Whitespace(_) | Token::LParen))
            .and_then(|token| match token {
                Token::Word(word) => Some(word.keyword),
                _ => None,
            })
    }
}

fn is_read(statement: &Statement) -> bool {
    match statement {
        Statement::Query(_) | Statement::Explain { .. } | Statement::ExplainTable { .. } => true,
        // The SHOW family is spread over many variants; they all render as SHOW.
        other => other.to_string().starts_with("SHOW"),
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows of a read.
    Rows(Vec<Row>),
    /// Outcome of a write.
    Affected {
        rows: u64,
        /// Generated AUTO_INCREMENT id, if the statement produced one.
        last_insert_id: Option<u64>,
    },
}

impl QueryResult {
    /// Rows of a read; empty for a write.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Affected { .. } => Vec::new(),
        }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Rows(_) => 0,
            Self::Affected { rows, .. } => *rows,
        }
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected { last_insert_id, .. } => *last_insert_id,
        }
    }
}
