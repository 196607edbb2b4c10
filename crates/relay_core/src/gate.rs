//! Admission gate - authorizes every request before the model is called.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::config::RelayConfig;
use crate::error::CoreResult;
use crate::ledger::UsageLedger;
use crate::store::IdentityStore;
use crate::types::{Feature, IdentityStatus};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Identity is blocked
    Blocked,
    /// Identity is not approved yet; the caller should offer a
    /// "submit a request" affordance
    Unapproved,
    /// The requested feature is globally disabled
    FeatureDisabled,
    /// No budget left in the current period
    BudgetExhausted,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::Unapproved => write!(f, "unapproved"),
            Self::FeatureDisabled => write!(f, "feature_disabled"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Pure-read authorization over identity state, feature flags and budget.
///
/// Safe to call concurrently for the same identity: the budget check reads
/// current ledger state without reserving anything, so two simultaneous
/// requests can both pass before either posts usage. The resulting
/// transient overshoot is bounded and corrected on the next check; it is an
/// accepted trade-off, not a bug.
pub struct AdmissionGate {
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<UsageLedger>,
    admins: HashSet<String>,
    image_generation_enabled: bool,
    tts_enabled: bool,
    vision_enabled: bool,
    transcription_enabled: bool,
}

impl AdmissionGate {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<UsageLedger>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            identities,
            ledger,
            admins: config.admin_ids.iter().cloned().collect(),
            image_generation_enabled: config.enable_image_generation,
            tts_enabled: config.enable_tts_generation,
            vision_enabled: config.enable_vision,
            transcription_enabled: config.enable_transcription,
        }
    }

    fn feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Chat => true,
            Feature::ImageGeneration => self.image_generation_enabled,
            Feature::Tts => self.tts_enabled,
            Feature::Vision => self.vision_enabled,
            Feature::Transcription => self.transcription_enabled,
        }
    }

    /// Whether the identity is an administrator.
    pub fn is_admin(&self, identity_id: &str) -> bool {
        self.admins.contains(identity_id)
    }

    /// Authorize a request. Checks short-circuit in order: blocked,
    /// unapproved, feature disabled, budget exhausted.
    ///
    /// Administrators bypass the approval and budget checks but not the
    /// global feature flags. This performs no side effects; emitting a
    /// user-facing denial message is the caller's responsibility.
    pub fn authorize(&self, identity_id: &str, feature: Feature) -> CoreResult<Decision> {
        let identity = self.identities.get(identity_id)?;
        let admin = self.is_admin(identity_id);

        // A blocked record denies everyone, admins included
        if matches!(identity.as_ref().map(|i| i.status), Some(IdentityStatus::Blocked)) {
            warn!(identity = identity_id, "denied: blocked");
            return Ok(Decision::Deny(DenyReason::Blocked));
        }

        if !admin {
            // An unknown identity counts as unapproved, not as an error
            let approved = matches!(
                identity.as_ref().map(|i| i.status),
                Some(IdentityStatus::Approved)
            );
            if !approved {
                warn!(identity = identity_id, "denied: not approved");
                return Ok(Decision::Deny(DenyReason::Unapproved));
            }
        }

        if !self.feature_enabled(feature) {
            return Ok(Decision::Deny(DenyReason::FeatureDisabled));
        }

        if !admin && self.ledger.remaining_budget(identity_id)? <= 0.0 {
            warn!(identity = identity_id, "denied: budget exhausted");
            return Ok(Decision::Deny(DenyReason::BudgetExhausted));
        }

        Ok(Decision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BudgetPeriod;
    use crate::store::MemoryStore;
    use crate::types::{Identity, IdentityStatus, UsageAmount};

    fn setup(config: RelayConfig) -> (Arc<MemoryStore>, Arc<UsageLedger>, AdmissionGate) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(UsageLedger::new(
            store.clone(),
            config.prices.clone(),
            BudgetPeriod::Monthly,
            config.user_budgets.clone(),
            config.guest_budget,
            config.allowed_ids.clone(),
        ));
        let gate = AdmissionGate::new(store.clone(), ledger.clone(), &config);
        (store, ledger, gate)
    }

    fn approved(id: &str) -> Identity {
        let mut identity = Identity::new(id, format!("user-{}", id));
        identity.status = IdentityStatus::Approved;
        identity
    }

    #[test]
    fn test_pending_identity_is_denied_unapproved() {
        let (store, _, gate) = setup(RelayConfig::default());
        store.put(&Identity::new("1", "alice")).unwrap();

        let decision = gate.authorize("1", Feature::Chat).unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::Unapproved));
    }

    #[test]
    fn test_unknown_identity_is_denied_unapproved() {
        let (_, _, gate) = setup(RelayConfig::default());
        let decision = gate.authorize("404", Feature::Chat).unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::Unapproved));
    }

    #[test]
    fn test_blocked_beats_all_other_checks() {
        let (store, _, gate) = setup(RelayConfig::default());
        let mut identity = approved("1");
        identity.status = IdentityStatus::Blocked;
        store.put(&identity).unwrap();

        let decision = gate.authorize("1", Feature::Chat).unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::Blocked));
    }

    #[test]
    fn test_approved_identity_is_allowed() {
        let mut config = RelayConfig::default();
        config.allowed_ids = vec!["1".to_string()];
        let (store, _, gate) = setup(config);
        store.put(&approved("1")).unwrap();

        assert_eq!(gate.authorize("1", Feature::Chat).unwrap(), Decision::Allow);
    }

    #[test]
    fn test_feature_flag_denies_even_admins() {
        let mut config = RelayConfig::default();
        config.admin_ids = vec!["boss".to_string()];
        config.enable_image_generation = false;
        let (_, _, gate) = setup(config);

        let decision = gate.authorize("boss", Feature::ImageGeneration).unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::FeatureDisabled));
    }

    #[test]
    fn test_admin_bypasses_approval_and_budget() {
        let mut config = RelayConfig::default();
        config.admin_ids = vec!["boss".to_string()];
        let (_, _, gate) = setup(config);

        // Admin has no identity record at all and still passes
        assert_eq!(
            gate.authorize("boss", Feature::Chat).unwrap(),
            Decision::Allow
        );
    }

    #[test]
    fn test_exhausted_budget_is_denied() {
        let mut config = RelayConfig::default();
        config.allowed_ids = vec!["1".to_string()];
        config.user_budgets.insert("1".to_string(), 0.001);
        let (store, ledger, gate) = setup(config);
        store.put(&approved("1")).unwrap();

        assert_eq!(gate.authorize("1", Feature::Chat).unwrap(), Decision::Allow);
        ledger.record("1", UsageAmount::ChatTokens(10_000)).unwrap();
        assert_eq!(
            gate.authorize("1", Feature::Chat).unwrap(),
            Decision::Deny(DenyReason::BudgetExhausted)
        );
    }
}
