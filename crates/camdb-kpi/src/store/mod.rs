//! Data-access contract consumed by the engine.

mod memory;
mod postgres;

pub use memory::MemoryKpiStore;
pub use postgres::PgKpiStore;

use async_trait::async_trait;
use camdb_core::{Kpi, KpiCategory, Link, Post, Scope};

use crate::error::StoreError;

/// Selects the posts of one campaign, optionally narrowed to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostFilter {
    pub campaign_id: i64,
    pub account_id: Option<i64>,
}

impl From<Scope> for PostFilter {
    fn from(scope: Scope) -> Self {
        Self {
            campaign_id: scope.campaign_id,
            account_id: scope.account_id,
        }
    }
}

/// Selects currently linked pairs; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub campaign_id: Option<i64>,
    pub account_id: Option<i64>,
}

/// Persisted store as seen by the aggregation engine.
///
/// # Implementations
///
/// - [`PgKpiStore`]: Postgres via `camdb-db`
/// - [`MemoryKpiStore`]: in-memory, with fault injection for tests
#[async_trait]
pub trait KpiStore: Send + Sync {
    /// Posts matching `filter`, regardless of link state.
    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError>;

    /// The KPI row for a scope/category, or `None` if absent.
    async fn get_kpi(&self, scope: Scope, category: KpiCategory)
        -> Result<Option<Kpi>, StoreError>;

    /// Writes `actual`, creating the row with `target_if_new` when absent.
    ///
    /// Must never modify the target of an existing row.
    async fn upsert_kpi(
        &self,
        scope: Scope,
        category: KpiCategory,
        actual: i64,
        target_if_new: i64,
    ) -> Result<Kpi, StoreError>;

    /// Currently linked pairs matching `filter`.
    async fn list_links(&self, filter: LinkFilter) -> Result<Vec<Link>, StoreError>;

    /// Campaigns that have any post or KPI row, linked or not.
    async fn list_campaign_ids(&self) -> Result<Vec<i64>, StoreError>;
}
