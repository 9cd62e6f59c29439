//! In-memory [`KpiStore`] for tests and local experiments.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use camdb_core::{Kpi, KpiCategory, Link, Post, Scope};

use super::{KpiStore, LinkFilter, PostFilter};
use crate::error::StoreError;

type KpiKey = (i64, Option<i64>, KpiCategory);

#[derive(Default)]
struct State {
    posts: BTreeMap<i64, Post>,
    kpis: BTreeMap<KpiKey, Kpi>,
    links: BTreeSet<(i64, i64)>,
    next_post_id: i64,
    next_kpi_id: i64,
}

#[derive(Default)]
struct Faults {
    /// Fails `list_posts`, `list_links` and `list_campaign_ids`; row lookups
    /// keep working.
    fail_scans: bool,
    /// Number of further upserts allowed to succeed before writes fail.
    writes_remaining: Option<usize>,
    read_delay: Option<Duration>,
}

/// Store that keeps posts, links and KPI rows in memory.
#[derive(Default)]
pub struct MemoryKpiStore {
    state: RwLock<State>,
    faults: RwLock<Faults>,
    list_posts_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl MemoryKpiStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `post` under a fresh id and returns the stored copy.
    pub async fn insert_post(&self, mut post: Post) -> Post {
        let mut state = self.state.write().await;
        state.next_post_id += 1;
        post.id = state.next_post_id;
        state.posts.insert(post.id, post.clone());
        post
    }

    /// Shorthand for a post with only a view count set.
    pub async fn add_post(&self, campaign_id: i64, account_id: i64, views: i64) -> Post {
        self.insert_post(Post {
            id: 0,
            campaign_id,
            account_id,
            post_date: NaiveDate::default(),
            total_view: Some(views),
            total_like: None,
            total_comment: None,
            total_share: None,
            total_saved: None,
            content_type: None,
            platform: None,
            url: None,
            caption: None,
        })
        .await
    }

    /// Replaces a stored post; returns the previous version.
    pub async fn replace_post(&self, post: Post) -> Option<Post> {
        self.state.write().await.posts.insert(post.id, post)
    }

    pub async fn remove_post(&self, id: i64) -> Option<Post> {
        self.state.write().await.posts.remove(&id)
    }

    /// Returns `true` if the pair was not linked before.
    pub async fn link(&self, campaign_id: i64, account_id: i64) -> bool {
        self.state
            .write()
            .await
            .links
            .insert((campaign_id, account_id))
    }

    /// Returns `true` if the pair was linked before.
    pub async fn unlink(&self, campaign_id: i64, account_id: i64) -> bool {
        self.state
            .write()
            .await
            .links
            .remove(&(campaign_id, account_id))
    }

    /// Sets a user target. Returns `false` if the row does not exist.
    pub async fn set_target(&self, scope: Scope, category: KpiCategory, target: i64) -> bool {
        let mut state = self.state.write().await;
        match state
            .kpis
            .get_mut(&(scope.campaign_id, scope.account_id, category))
        {
            Some(kpi) => {
                kpi.target = target;
                true
            }
            None => false,
        }
    }

    pub async fn kpi(&self, scope: Scope, category: KpiCategory) -> Option<Kpi> {
        self.state
            .read()
            .await
            .kpis
            .get(&(scope.campaign_id, scope.account_id, category))
            .cloned()
    }

    /// Every KPI row of one scope.
    pub async fn kpis(&self, scope: Scope) -> Vec<Kpi> {
        self.state
            .read()
            .await
            .kpis
            .values()
            .filter(|k| k.scope() == scope)
            .cloned()
            .collect()
    }

    /// Deletes every post, link and KPI row of a campaign.
    pub async fn delete_campaign(&self, campaign_id: i64) {
        let mut state = self.state.write().await;
        state.posts.retain(|_, p| p.campaign_id != campaign_id);
        state.kpis.retain(|(c, _, _), _| *c != campaign_id);
        state.links.retain(|(c, _)| *c != campaign_id);
    }

    pub async fn set_fail_scans(&self, fail: bool) {
        self.faults.write().await.fail_scans = fail;
    }

    /// Lets `n` more upserts succeed, then fails every write. `None` clears it.
    pub async fn fail_writes_after(&self, n: Option<usize>) {
        self.faults.write().await.writes_remaining = n;
    }

    /// Delays every `list_posts` call.
    pub async fn set_read_delay(&self, delay: Option<Duration>) {
        self.faults.write().await.read_delay = delay;
    }

    #[must_use]
    pub fn list_posts_calls(&self) -> usize {
        self.list_posts_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    async fn check_scan(&self) -> Result<(), StoreError> {
        if self.faults.read().await.fail_scans {
            return Err(StoreError::Unavailable("injected scan failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KpiStore for MemoryKpiStore {
    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError> {
        self.list_posts_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.faults.read().await.read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_scan().await?;

        let state = self.state.read().await;
        Ok(state
            .posts
            .values()
            .filter(|p| p.campaign_id == filter.campaign_id)
            .filter(|p| filter.account_id.is_none_or(|a| p.account_id == a))
            .cloned()
            .collect())
    }

    async fn get_kpi(
        &self,
        scope: Scope,
        category: KpiCategory,
    ) -> Result<Option<Kpi>, StoreError> {
        Ok(self.kpi(scope, category).await)
    }

    async fn upsert_kpi(
        &self,
        scope: Scope,
        category: KpiCategory,
        actual: i64,
        target_if_new: i64,
    ) -> Result<Kpi, StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.write().await;
            if let Some(remaining) = faults.writes_remaining.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable(
                        "injected write failure".to_string(),
                    ));
                }
                *remaining -= 1;
            }
        }

        let mut state = self.state.write().await;
        let key = (scope.campaign_id, scope.account_id, category);
        if let Some(existing) = state.kpis.get_mut(&key) {
            existing.actual = actual;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        state.next_kpi_id += 1;
        let kpi = Kpi {
            id: state.next_kpi_id,
            campaign_id: scope.campaign_id,
            account_id: scope.account_id,
            category,
            target: target_if_new,
            actual,
            updated_at: Utc::now(),
        };
        state.kpis.insert(key, kpi.clone());
        Ok(kpi)
    }

    async fn list_links(&self, filter: LinkFilter) -> Result<Vec<Link>, StoreError> {
        self.check_scan().await?;
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|(c, _)| filter.campaign_id.is_none_or(|f| *c == f))
            .filter(|(_, a)| filter.account_id.is_none_or(|f| *a == f))
            .map(|&(campaign_id, account_id)| Link {
                campaign_id,
                account_id,
            })
            .collect())
    }

    async fn list_campaign_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.check_scan().await?;
        let state = self.state.read().await;
        let ids: BTreeSet<i64> = state
            .posts
            .values()
            .map(|p| p.campaign_id)
            .chain(state.kpis.keys().map(|(campaign_id, _, _)| *campaign_id))
            .collect();
        Ok(ids.into_iter().collect())
    }
}
