use async_trait::async_trait;
use sqlx::PgPool;

use camdb_core::{Kpi, KpiCategory, Link, Post, Scope};

use super::{KpiStore, LinkFilter, PostFilter};
use crate::error::StoreError;

/// [`KpiStore`] backed by the `camdb-db` Postgres queries.
#[derive(Debug, Clone)]
pub struct PgKpiStore {
    pool: PgPool,
}

impl PgKpiStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KpiStore for PgKpiStore {
    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError> {
        let rows = camdb_db::list_posts(&self.pool, filter.campaign_id, filter.account_id).await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn get_kpi(
        &self,
        scope: Scope,
        category: KpiCategory,
    ) -> Result<Option<Kpi>, StoreError> {
        let row =
            camdb_db::get_kpi(&self.pool, scope.campaign_id, scope.account_id, category).await?;
        Ok(row.map(Kpi::try_from).transpose()?)
    }

    async fn upsert_kpi(
        &self,
        scope: Scope,
        category: KpiCategory,
        actual: i64,
        target_if_new: i64,
    ) -> Result<Kpi, StoreError> {
        let row = camdb_db::upsert_kpi_actual(
            &self.pool,
            scope.campaign_id,
            scope.account_id,
            category,
            actual,
            target_if_new,
        )
        .await?;
        Ok(Kpi::try_from(row)?)
    }

    async fn list_links(&self, filter: LinkFilter) -> Result<Vec<Link>, StoreError> {
        let rows = camdb_db::list_links(&self.pool, filter.campaign_id, filter.account_id).await?;
        Ok(rows.iter().map(Link::from).collect())
    }

    async fn list_campaign_ids(&self) -> Result<Vec<i64>, StoreError> {
        Ok(camdb_db::list_kpi_campaign_ids(&self.pool).await?)
    }
}
