//! Stats command - usage totals and remaining budget for an identity.
//!
//! Prices, budgets and the budget period come from the environment so the
//! numbers match what the bot process enforces.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use relay_core::{FileStore, RelayConfig, UsageLedger};

#[derive(Args)]
pub struct StatsArgs {
    /// Stable identity id to report on, or `guests` for the shared pool
    pub identity_id: String,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: String,
}

pub fn execute(data_dir: &str, args: StatsArgs) -> Result<()> {
    let config = RelayConfig::from_env().context("invalid configuration")?;
    let store = FileStore::new(data_dir)
        .with_context(|| format!("could not open data directory {}", data_dir))?;
    let ledger = UsageLedger::from_config(Arc::new(store), &config);

    let report = ledger
        .report(&args.identity_id)
        .context("could not build usage report")?;

    let remaining = if report.remaining_budget.is_infinite() {
        "unlimited".to_string()
    } else {
        format!("${:.4}", report.remaining_budget)
    };

    match args.format.as_str() {
        "json" => {
            let payload = json!({
                "identityId": report.identity_id,
                "today": report.today,
                "month": report.month,
                "remainingBudget": if report.remaining_budget.is_infinite() {
                    serde_json::Value::Null
                } else {
                    json!(report.remaining_budget)
                },
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        _ => {
            println!("Usage for {}", report.identity_id);
            println!(
                "  today: {} tokens, {} images, ${:.4}",
                report.today.tokens, report.today.images, report.today.cost
            );
            println!(
                "  month: {} tokens, {} images, ${:.4}",
                report.month.tokens, report.month.images, report.month.cost
            );
            println!("  remaining budget: {}", remaining);
        }
    }
    Ok(())
}
