//! Moderation commands - approve / reject / block / unblock.
//!
//! Thin wrappers around the join workflow, operating on the shared
//! file-backed store.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use relay_core::{FileStore, JoinWorkflow};

#[derive(Args)]
pub struct IdentityArgs {
    /// Stable identity id to act on
    pub identity_id: String,
}

fn workflow(data_dir: &str) -> Result<JoinWorkflow> {
    let store = FileStore::new(data_dir)
        .with_context(|| format!("could not open data directory {}", data_dir))?;
    Ok(JoinWorkflow::new(Arc::new(store)))
}

pub fn approve(data_dir: &str, args: IdentityArgs) -> Result<()> {
    let identity = workflow(data_dir)?
        .approve(&args.identity_id)
        .context("approve failed")?;
    println!("{} is now {}", identity.id, identity.status.label());
    Ok(())
}

pub fn reject(data_dir: &str, args: IdentityArgs) -> Result<()> {
    let identity = workflow(data_dir)?
        .reject(&args.identity_id)
        .context("reject failed")?;
    println!("{} is now {}", identity.id, identity.status.label());
    Ok(())
}

pub fn block(data_dir: &str, args: IdentityArgs) -> Result<()> {
    let identity = workflow(data_dir)?
        .block(&args.identity_id)
        .context("block failed")?;
    println!("{} is now {}", identity.id, identity.status.label());
    Ok(())
}

pub fn unblock(data_dir: &str, args: IdentityArgs) -> Result<()> {
    let identity = workflow(data_dir)?
        .unblock(&args.identity_id)
        .context("unblock failed")?;
    println!("{} is now {}", identity.id, identity.status.label());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{IdentityStatus, IdentityStore};

    #[test]
    fn test_approve_round_trip_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap().to_string();

        {
            let wf = workflow(&data_dir).unwrap();
            wf.request_join("42", "sam").unwrap();
        }
        approve(
            &data_dir,
            IdentityArgs {
                identity_id: "42".to_string(),
            },
        )
        .unwrap();

        let store = FileStore::new(&data_dir).unwrap();
        let identity = store.get("42").unwrap().unwrap();
        assert_eq!(identity.status, IdentityStatus::Approved);
    }
}
