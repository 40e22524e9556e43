//! The remote collaborator boundary.
//!
//! Repositories only ever talk to a [`Backend`]: a relational store with
//! equality-filtered selects, single-row inserts and filtered partial updates,
//! plus an auth/session sub-interface. Rows travel as JSON objects whose keys
//! are column names.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::api::Identity;

/// Remote tables known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Stories,
    Profiles,
    Contributions,
    Votes,
    Challenges,
    Animations,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Stories,
        Table::Profiles,
        Table::Contributions,
        Table::Votes,
        Table::Challenges,
        Table::Animations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Stories => "stories",
            Table::Profiles => "profiles",
            Table::Contributions => "contributions",
            Table::Votes => "votes",
            Table::Challenges => "challenges",
            Table::Animations => "animations",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row filter. Multiple filters on one query are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn in_list<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Structured failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// No session, or the session token was rejected
    #[error("Unauthorized: {0}")]
    Unauthenticated(String),

    /// Authenticated but not allowed to touch the row
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Host unreachable, connection reset, DNS failure
    #[error("Network unreachable: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal Server Error: {0}")]
    Server(String),

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Anything the backend could only describe as text
    #[error("{0}")]
    Other(String),
}

/// The remote relational store plus its auth/session interface.
///
/// Implementations must be cheap to share behind an `Arc`; every method may be
/// called concurrently from independent tasks.
pub trait Backend: Send + Sync + 'static {
    /// Rows matching the query, in store order unless the query orders them.
    fn select(&self, query: &Query) -> impl Future<Output = Result<Vec<Value>, BackendError>> + Send;

    /// Insert one row. The store assigns the primary key; the stored row is returned.
    fn insert(&self, table: Table, row: Value) -> impl Future<Output = Result<Value, BackendError>> + Send;

    /// Apply `changes` to every row matching `filters`; the updated rows are returned.
    fn update(
        &self,
        table: Table,
        filters: &[Filter],
        changes: Value,
    ) -> impl Future<Output = Result<Vec<Value>, BackendError>> + Send;

    /// Create an identity. Implementations sign the new identity in.
    fn sign_up(&self, email: &str, password: &str) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    fn sign_in(&self, email: &str, password: &str) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// The identity of the current session, if any.
    fn current_identity(&self) -> Option<Identity>;
}
