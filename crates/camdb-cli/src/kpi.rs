//! KPI maintenance commands.
//!
//! These are called from `main` after the database pool and config are
//! established. Each command drives the same engine the server uses, so
//! a manual run serializes with nothing but itself.

use clap::Subcommand;

use camdb_core::{Kpi, KpiCategory, Scope};
use camdb_kpi::{KpiEngine, RecalcOutcome};

/// Sub-commands available under `kpi`.
#[derive(Debug, Subcommand)]
pub enum KpiCommands {
    /// Recompute one account scope, or the campaign-wide scope when no
    /// account is given
    Recalc {
        #[arg(long)]
        campaign: i64,
        #[arg(long)]
        account: Option<i64>,
    },
    /// Create any missing KPI rows for an account scope with actual = 0
    Init {
        #[arg(long)]
        campaign: i64,
        #[arg(long)]
        account: i64,
    },
    /// Recompute every linked account scope and their campaign-wide scopes
    Reconcile,
    /// Print the KPI rows of a scope
    Show {
        #[arg(long)]
        campaign: i64,
        #[arg(long)]
        account: Option<i64>,
    },
}

fn scope_for(campaign: i64, account: Option<i64>) -> Scope {
    account.map_or_else(
        || Scope::campaign(campaign),
        |account| Scope::account(campaign, account),
    )
}

fn print_outcome(outcome: &RecalcOutcome) {
    println!("recalculated {}", outcome.scope);
    for (category, value) in &outcome.values {
        println!("  {:<12}{value}", category.as_str());
    }
}

/// Recompute one scope and print the new values.
///
/// # Errors
///
/// Returns an error if the engine cannot read posts or write any category.
pub(crate) async fn run_kpi_recalc(
    engine: &KpiEngine,
    campaign: i64,
    account: Option<i64>,
) -> anyhow::Result<()> {
    let outcome = engine.recalc_scope(scope_for(campaign, account)).await?;
    print_outcome(&outcome);
    Ok(())
}

/// Initialize an account scope without touching existing rows.
///
/// # Errors
///
/// Returns an error if a lookup or insert fails.
pub(crate) async fn run_kpi_init(
    engine: &KpiEngine,
    campaign: i64,
    account: i64,
) -> anyhow::Result<()> {
    let created = engine.init_account_kpis(campaign, account).await?;
    println!(
        "initialized {}: {created} rows created",
        Scope::account(campaign, account)
    );
    Ok(())
}

/// Run the full reconciliation sweep.
///
/// # Errors
///
/// Returns an error if the links cannot be listed, or if any scope failed.
pub(crate) async fn run_kpi_reconcile(engine: &KpiEngine) -> anyhow::Result<()> {
    let report = engine.reconcile_all().await?;
    println!(
        "reconciled {} scopes: {} succeeded, {} failed",
        report.scopes,
        report.succeeded,
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("  {failure}");
    }
    if report.failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} scopes failed to reconcile", report.failures.len())
    }
}

fn format_row(category: KpiCategory, kpi: Option<&Kpi>) -> String {
    match kpi {
        Some(kpi) => format!(
            "{:<12}{:>12}{:>12}  {}",
            category.as_str(),
            kpi.target,
            kpi.actual,
            kpi.updated_at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("{:<12}{:>12}{:>12}  not initialized", category.as_str(), "-", "-"),
    }
}

/// Print every category of a scope, marking absent rows.
///
/// # Errors
///
/// Returns an error if a lookup fails.
pub(crate) async fn run_kpi_show(
    engine: &KpiEngine,
    campaign: i64,
    account: Option<i64>,
) -> anyhow::Result<()> {
    let scope = scope_for(campaign, account);
    let rows = engine.scope_kpis(scope).await?;

    println!("{scope}");
    println!("{:<12}{:>12}{:>12}  UPDATED", "CATEGORY", "TARGET", "ACTUAL");
    for (category, kpi) in &rows {
        println!("{}", format_row(*category, kpi.as_ref()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn scope_defaults_to_campaign_wide() {
        assert!(scope_for(4, None).is_campaign_wide());
        assert_eq!(scope_for(4, Some(9)), Scope::account(4, 9));
    }

    #[test]
    fn absent_rows_are_marked() {
        let line = format_row(KpiCategory::QtyPost, None);
        assert!(line.starts_with("QTY_POST"));
        assert!(line.ends_with("not initialized"));
    }

    #[test]
    fn present_rows_show_target_and_actual() {
        let kpi = Kpi {
            id: 1,
            campaign_id: 1,
            account_id: Some(2),
            category: KpiCategory::Views,
            target: 500,
            actual: 350,
            updated_at: Utc::now(),
        };
        let line = format_row(KpiCategory::Views, Some(&kpi));
        assert!(line.contains("500"));
        assert!(line.contains("350"));
    }
}
