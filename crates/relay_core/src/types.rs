//! Core types for identities and usage accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque key identifying one end-user across sessions.
pub type IdentityId = String;

/// Synthetic identity that aggregates usage for everyone not on the
/// explicit allow-list.
pub const GUEST_IDENTITY: &str = "guests";

/// Approval status of an identity.
///
/// An identity is in exactly one status at a time. Blocking retains the
/// record; identities are never deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Pending,
    Approved,
    Blocked,
}

impl IdentityStatus {
    /// Human-readable label for operator listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Blocked => "blocked",
        }
    }
}

/// A known end-user of the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user key
    pub id: IdentityId,
    /// Display name captured on first contact
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Current approval status
    pub status: IdentityStatus,
    /// When the identity was first seen
    #[serde(rename = "joinedAt")]
    pub joined_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new pending identity on first contact.
    pub fn new(id: impl Into<IdentityId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            status: IdentityStatus::Pending,
            joined_at: Utc::now(),
        }
    }
}

/// An open request to join, shown to operators.
///
/// Join requests exist only for `pending` identities; they are derived from
/// the identity store rather than kept in a second collection, so the
/// invariant holds structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "identityId")]
    pub identity_id: IdentityId,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "requestedAt")]
    pub requested_at: DateTime<Utc>,
}

/// Gated features of the bot.
///
/// `Chat` is always on; the others are controlled by config flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Chat,
    ImageGeneration,
    Tts,
    Vision,
    Transcription,
}

/// Requested image resolution, used as a price-tier index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageSize {
    #[serde(rename = "256x256")]
    S256,
    #[serde(rename = "512x512")]
    S512,
    #[serde(rename = "1024x1024")]
    S1024,
}

impl ImageSize {
    /// Index into the configured image price tiers.
    pub fn tier(&self) -> usize {
        match self {
            Self::S256 => 0,
            Self::S512 => 1,
            Self::S1024 => 2,
        }
    }
}

/// One metered unit of consumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UsageAmount {
    ChatTokens(u64),
    Image(ImageSize),
    VisionTokens(u64),
    TtsChars(u64),
    TranscriptionSeconds(f64),
}

impl UsageAmount {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatTokens(_) => "chat_tokens",
            Self::Image(_) => "image",
            Self::VisionTokens(_) => "vision_tokens",
            Self::TtsChars(_) => "tts_chars",
            Self::TranscriptionSeconds(_) => "transcription_seconds",
        }
    }
}

/// Counters accumulated within one day or month bucket.
///
/// Cost is monotonically non-decreasing within a bucket: usage is only ever
/// added, never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageBucket {
    pub tokens: u64,
    pub images: u64,
    pub vision_tokens: u64,
    pub tts_chars: u64,
    pub transcription_seconds: f64,
    pub cost: f64,
}

/// Full usage history for one identity.
///
/// Buckets are created lazily on first write in a new period and retained
/// afterwards; pruning old buckets is an external retention concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistory {
    pub identity_id: IdentityId,
    /// Day buckets keyed by `YYYY-MM-DD`
    #[serde(default)]
    pub days: BTreeMap<String, UsageBucket>,
    /// Month buckets keyed by `YYYY-MM`
    #[serde(default)]
    pub months: BTreeMap<String, UsageBucket>,
}

impl UsageHistory {
    pub fn new(identity_id: impl Into<IdentityId>) -> Self {
        Self {
            identity_id: identity_id.into(),
            days: BTreeMap::new(),
            months: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_is_pending() {
        let identity = Identity::new("42", "alice");
        assert_eq!(identity.status, IdentityStatus::Pending);
        assert_eq!(identity.id, "42");
    }

    #[test]
    fn test_image_size_tiers() {
        assert_eq!(ImageSize::S256.tier(), 0);
        assert_eq!(ImageSize::S1024.tier(), 2);
    }

    #[test]
    fn test_identity_serde_round_trip() {
        let identity = Identity::new("7", "bob");
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"displayName\""));
        assert!(json.contains("\"pending\""));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, IdentityStatus::Pending);
    }
}
