//! Account-scoped and campaign-wide KPI recalculation.
//!
//! Each recalculation is a full recomputation: one post read, then one
//! target-preserving upsert per registered category. Upserts are not wrapped
//! in a transaction; a failure part-way leaves earlier categories updated.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use camdb_core::{CategoryRegistry, Kpi, KpiCategory, Post, Scope};

use crate::error::{EngineError, StoreError};
use crate::locks::{GateState, ScopeLocks};
use crate::store::{KpiStore, LinkFilter, PostFilter};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECONCILE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target given to every row the engine creates.
    pub default_target: i64,
    /// Deadline applied to each individual store call. `None` waits forever.
    pub store_timeout: Option<Duration>,
    /// Scopes recomputed in parallel by [`KpiEngine::reconcile_all`].
    pub reconcile_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_target: 0,
            store_timeout: Some(DEFAULT_STORE_TIMEOUT),
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &camdb_core::AppConfig) -> Self {
        Self {
            default_target: config.kpi_default_target,
            store_timeout: (config.kpi_store_timeout_ms > 0)
                .then(|| Duration::from_millis(config.kpi_store_timeout_ms)),
            reconcile_concurrency: config.kpi_reconcile_concurrency.max(1),
        }
    }
}

/// Result of one recalculation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcOutcome {
    pub scope: Scope,
    /// `actual` per category, in registry order.
    pub values: Vec<(KpiCategory, i64)>,
    /// `true` when the request was served by a recomputation another caller
    /// ran after this request was made.
    pub coalesced: bool,
}

impl RecalcOutcome {
    #[must_use]
    pub fn value(&self, category: KpiCategory) -> Option<i64> {
        self.values
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, v)| *v)
    }
}

/// Summary of a [`KpiEngine::reconcile_all`] sweep.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub scopes: usize,
    pub succeeded: usize,
    pub failures: Vec<EngineError>,
}

/// The aggregation engine. Cheap to clone; clones share the per-scope gates.
#[derive(Clone)]
pub struct KpiEngine {
    store: Arc<dyn KpiStore>,
    registry: Arc<CategoryRegistry>,
    config: EngineConfig,
    locks: Arc<ScopeLocks>,
}

impl std::fmt::Debug for KpiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiEngine")
            .field("categories", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KpiEngine {
    #[must_use]
    pub fn new(store: Arc<dyn KpiStore>, config: EngineConfig) -> Self {
        Self::with_registry(store, CategoryRegistry::standard(), config)
    }

    #[must_use]
    pub fn with_registry(
        store: Arc<dyn KpiStore>,
        registry: CategoryRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            config,
            locks: Arc::new(ScopeLocks::default()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Recomputes every category for one account within one campaign.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the post read or any upsert fails or times
    /// out. Categories written before the failure are not rolled back.
    pub async fn recalc(
        &self,
        campaign_id: i64,
        account_id: i64,
    ) -> Result<RecalcOutcome, EngineError> {
        self.recalc_scope(Scope::account(campaign_id, account_id))
            .await
    }

    /// Recomputes the campaign-wide scope over every post in the campaign,
    /// whatever the link state of its account.
    ///
    /// # Errors
    ///
    /// See [`KpiEngine::recalc`].
    pub async fn recalc_campaign(&self, campaign_id: i64) -> Result<RecalcOutcome, EngineError> {
        self.recalc_scope(Scope::campaign(campaign_id)).await
    }

    /// Recomputes one scope under its serialization point.
    ///
    /// # Errors
    ///
    /// See [`KpiEngine::recalc`].
    pub async fn recalc_scope(&self, scope: Scope) -> Result<RecalcOutcome, EngineError> {
        let ticket = self.locks.ticket(scope);
        let mut gate = ticket.acquire().await;

        if let Some(values) = gate.covering(ticket.number()) {
            tracing::debug!(
                campaign_id = scope.campaign_id,
                account_id = ?scope.account_id,
                "kpi recalculation coalesced"
            );
            return Ok(RecalcOutcome {
                scope,
                values: values.to_vec(),
                coalesced: true,
            });
        }

        // Every request issued before the read is answered by this run.
        let started_at = ticket.latest_requested();
        let posts = self.read_posts(scope).await?;
        self.write_values(&mut gate, scope, started_at, &posts).await
    }

    /// Creates the missing KPI rows of an account scope with `actual = 0`.
    ///
    /// Existing rows are left untouched, so calling this on an initialized
    /// scope is a no-op. Returns the number of rows created.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a lookup or insert fails or times out.
    pub async fn init_account_kpis(
        &self,
        campaign_id: i64,
        account_id: i64,
    ) -> Result<usize, EngineError> {
        let scope = Scope::account(campaign_id, account_id);
        let ticket = self.locks.ticket(scope);
        let _gate = ticket.acquire().await;
        self.init_locked(scope).await
    }

    /// First-link path: one post read and one target-preserving upsert per
    /// category, which creates any missing row with its real aggregate.
    ///
    /// If the posts cannot be read, the scope is still initialized with
    /// zeroed rows so it never appears missing, and the read error is
    /// returned.
    ///
    /// # Errors
    ///
    /// See [`KpiEngine::recalc`].
    pub async fn link_scope(
        &self,
        campaign_id: i64,
        account_id: i64,
    ) -> Result<RecalcOutcome, EngineError> {
        let scope = Scope::account(campaign_id, account_id);
        let ticket = self.locks.ticket(scope);
        let mut gate = ticket.acquire().await;
        let started_at = ticket.latest_requested();

        let posts = match self.read_posts(scope).await {
            Ok(posts) => posts,
            Err(read_err) => {
                if let Err(init_err) = self.init_locked(scope).await {
                    tracing::warn!(
                        campaign_id,
                        account_id,
                        error = %init_err,
                        "kpi zero-initialization after failed read also failed"
                    );
                }
                return Err(read_err);
            }
        };

        self.write_values(&mut gate, scope, started_at, &posts).await
    }

    /// Every registered category's row for a scope; absent rows are `None`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a lookup fails or times out.
    pub async fn scope_kpis(
        &self,
        scope: Scope,
    ) -> Result<Vec<(KpiCategory, Option<Kpi>)>, EngineError> {
        let mut rows = Vec::with_capacity(self.registry.len());
        for category in self.registry.categories() {
            let kpi = self
                .bounded("get_kpi", Some(scope), self.store.get_kpi(scope, category))
                .await?
                .map_err(|source| EngineError::StoreRead {
                    op: "get_kpi",
                    scope: Some(scope),
                    source,
                })?;
            rows.push((category, kpi));
        }
        Ok(rows)
    }

    /// Recomputes every linked account scope and the campaign-wide scope of
    /// every campaign with a link, a post or a KPI row.
    ///
    /// Scopes run concurrently up to the configured limit. Per-scope failures
    /// are logged and collected; they never stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only if the links or campaigns cannot be listed.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, EngineError> {
        let links = self
            .bounded(
                "list_links",
                None,
                self.store.list_links(LinkFilter::default()),
            )
            .await?
            .map_err(|source| EngineError::StoreRead {
                op: "list_links",
                scope: None,
                source,
            })?;

        let campaign_ids = self
            .bounded("list_campaign_ids", None, self.store.list_campaign_ids())
            .await?
            .map_err(|source| EngineError::StoreRead {
                op: "list_campaign_ids",
                scope: None,
                source,
            })?;

        let mut scopes: BTreeSet<Scope> = links.iter().map(camdb_core::Link::scope).collect();
        scopes.extend(links.iter().map(|l| Scope::campaign(l.campaign_id)));
        scopes.extend(campaign_ids.into_iter().map(Scope::campaign));

        let mut report = ReconcileReport {
            scopes: scopes.len(),
            ..ReconcileReport::default()
        };

        let mut results = stream::iter(scopes)
            .map(|scope| async move { self.recalc_scope(scope).await })
            .buffer_unordered(self.config.reconcile_concurrency.max(1));

        while let Some(result) = results.next().await {
            match result {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "kpi reconciliation failed for scope");
                    report.failures.push(e);
                }
            }
        }

        tracing::info!(
            scopes = report.scopes,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "kpi reconciliation complete"
        );
        Ok(report)
    }

    async fn read_posts(&self, scope: Scope) -> Result<Vec<Post>, EngineError> {
        self.bounded(
            "list_posts",
            Some(scope),
            self.store.list_posts(PostFilter::from(scope)),
        )
        .await?
        .map_err(|source| EngineError::StoreRead {
            op: "list_posts",
            scope: Some(scope),
            source,
        })
    }

    /// Computes the aggregates over `posts` and upserts them. Caller holds
    /// the scope's gate.
    async fn write_values(
        &self,
        gate: &mut GateState,
        scope: Scope,
        started_at: u64,
        posts: &[Post],
    ) -> Result<RecalcOutcome, EngineError> {
        let values = self.registry.compute(posts);

        for (written, &(category, actual)) in values.iter().enumerate() {
            self.bounded(
                "upsert_kpi",
                Some(scope),
                self.store
                    .upsert_kpi(scope, category, actual, self.config.default_target),
            )
            .await?
            .map_err(|source| EngineError::StoreWrite {
                scope,
                category,
                written,
                source,
            })?;
        }

        tracing::debug!(
            campaign_id = scope.campaign_id,
            account_id = ?scope.account_id,
            posts = posts.len(),
            "kpi recalculated"
        );

        gate.record(started_at, values.clone());
        Ok(RecalcOutcome {
            scope,
            values,
            coalesced: false,
        })
    }

    async fn init_locked(&self, scope: Scope) -> Result<usize, EngineError> {
        let mut created = 0;
        for category in self.registry.categories() {
            let existing = self
                .bounded("get_kpi", Some(scope), self.store.get_kpi(scope, category))
                .await?
                .map_err(|source| EngineError::StoreRead {
                    op: "get_kpi",
                    scope: Some(scope),
                    source,
                })?;
            if existing.is_some() {
                continue;
            }

            self.bounded(
                "upsert_kpi",
                Some(scope),
                self.store
                    .upsert_kpi(scope, category, 0, self.config.default_target),
            )
            .await?
            .map_err(|source| EngineError::StoreWrite {
                scope,
                category,
                written: created,
                source,
            })?;
            created += 1;
        }

        if created > 0 {
            tracing::debug!(
                campaign_id = scope.campaign_id,
                account_id = ?scope.account_id,
                created,
                "kpi rows initialized"
            );
        }
        Ok(created)
    }

    /// Runs one store call under the configured deadline.
    async fn bounded<T, F>(
        &self,
        op: &'static str,
        scope: Option<Scope>,
        call: F,
    ) -> Result<Result<T, StoreError>, EngineError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.config.store_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| EngineError::Timeout { op, scope, limit }),
            None => Ok(call.await),
        }
    }
}
