//! CLI command definitions.
//!
//! Each subcommand operates directly on the file-backed store shared with
//! the bot process; approvals and blocks take effect on the next inbound
//! message without a restart.

use clap::{Parser, Subcommand};

pub mod list_pending;
pub mod moderation;
pub mod stats;

/// relay - streaming chat relay with admission and budget gating
#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about = "relay - operator commands for the relay bot")]
#[command(long_about = r#"
Operator commands for the relay bot's admission workflow and usage ledger.

COMMANDS:
  approve       → Grant a pending identity access
  reject        → Reject a pending join request (the identity is blocked)
  block         → Revoke access for an identity
  unblock       → Return a blocked identity to pending review
  list-pending  → Show open join requests
  stats         → Show usage totals and remaining budget for an identity

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Unknown identity
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding identities and usage records
    #[arg(long, global = true, env = "RELAY_DATA_DIR", default_value = "data")]
    pub data_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Grant a pending identity access
    Approve(moderation::IdentityArgs),

    /// Reject a pending join request
    Reject(moderation::IdentityArgs),

    /// Revoke access for an identity
    Block(moderation::IdentityArgs),

    /// Return a blocked identity to pending review
    Unblock(moderation::IdentityArgs),

    /// Show open join requests
    #[command(name = "list-pending")]
    ListPending(list_pending::ListPendingArgs),

    /// Show usage totals and remaining budget for an identity
    Stats(stats::StatsArgs),
}
