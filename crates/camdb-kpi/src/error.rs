use std::time::Duration;

use camdb_core::{KpiCategory, Scope};
use thiserror::Error;

/// Failure reported by a [`crate::KpiStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] camdb_db::DbError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<camdb_core::CoreError> for StoreError {
    fn from(e: camdb_core::CoreError) -> Self {
        StoreError::Db(camdb_db::DbError::Decode(e))
    }
}

/// Failure of an engine operation. Nothing is rolled back: categories
/// written before a [`EngineError::StoreWrite`] keep their new value.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store read `{op}` failed for {}", describe(.scope))]
    StoreRead {
        op: &'static str,
        scope: Option<Scope>,
        #[source]
        source: StoreError,
    },

    #[error("store write of {category} failed for {scope} after {written} categories were written")]
    StoreWrite {
        scope: Scope,
        category: KpiCategory,
        written: usize,
        #[source]
        source: StoreError,
    },

    #[error("store call `{op}` timed out after {limit:?} for {}", describe(.scope))]
    Timeout {
        op: &'static str,
        scope: Option<Scope>,
        limit: Duration,
    },
}

impl EngineError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    /// Scope the failed call was working on, if any.
    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        match self {
            EngineError::StoreRead { scope, .. } | EngineError::Timeout { scope, .. } => *scope,
            EngineError::StoreWrite { scope, .. } => Some(*scope),
        }
    }
}

fn describe(scope: &Option<Scope>) -> String {
    scope.map_or_else(|| "all scopes".to_string(), |s| s.to_string())
}
