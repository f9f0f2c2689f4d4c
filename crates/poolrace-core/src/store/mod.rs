//! Store client seam and the sqlx-backed replicated implementation.
//!
//! The dispatcher only sees [`Store::execute`]; routing between the write
//! primary and the read replicas, pooling, and error signatures live here.

mod replicated;
mod signature;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use crate::retry::StoreError;
pub use replicated::ReplicatedStore;
pub use signature::from_sqlx;

/// Which side of the replica topology a query goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Read,
    Write,
}

/// A fixed query to execute. Cheap to clone; the text is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sql: Arc<str>,
    pub route: Route,
}

impl Query {
    pub fn read(sql: impl Into<Arc<str>>) -> Self {
        Self {
            sql: sql.into(),
            route: Route::Read,
        }
    }

    pub fn write(sql: impl Into<Arc<str>>) -> Self {
        Self {
            sql: sql.into(),
            route: Route::Write,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.route, self.sql)
    }
}

/// Opaque result of a successful invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub rows_affected: u64,
}

/// A store client: one `execute` call per attempt.
#[async_trait]
pub trait Store: Send + Sync {
    async fn execute(&self, query: &Query) -> Result<QueryOutcome, StoreError>;
}

