//! KPI aggregation engine.
//!
//! Keeps the derived `actual` value of every KPI row consistent with the
//! posts in its scope. The engine reads and writes through the [`KpiStore`]
//! seam, serializes work per scope, and exposes the dispatcher trigger
//! planner the CRUD layer calls after each mutation.

pub mod dispatch;
pub mod engine;
pub mod error;
mod locks;
pub mod store;

pub use dispatch::{plan, DispatchReport, Dispatcher, MutationEvent, Trigger};
pub use engine::{EngineConfig, KpiEngine, RecalcOutcome, ReconcileReport};
pub use error::{EngineError, StoreError};
pub use store::{KpiStore, LinkFilter, MemoryKpiStore, PgKpiStore, PostFilter};
