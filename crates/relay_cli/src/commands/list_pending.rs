//! List-pending command - show open join requests.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use relay_core::{FileStore, JoinWorkflow};

#[derive(Args)]
pub struct ListPendingArgs {
    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: String,
}

pub fn execute(data_dir: &str, args: ListPendingArgs) -> Result<()> {
    let store = FileStore::new(data_dir)
        .with_context(|| format!("could not open data directory {}", data_dir))?;
    let pending = JoinWorkflow::new(Arc::new(store))
        .list_pending()
        .context("could not list join requests")?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&pending)?),
        _ => {
            if pending.is_empty() {
                println!("No open join requests.");
            } else {
                for request in &pending {
                    println!(
                        "{}\t{}\t{}",
                        request.identity_id,
                        request.display_name,
                        request.requested_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
    }
    Ok(())
}
