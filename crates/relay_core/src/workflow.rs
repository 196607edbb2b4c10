//! Join-request workflow.
//!
//! Drives identity status transitions:
//!
//! ```text
//! none → pending → approved
//!             └──→ blocked (reject)
//! approved ⇄ blocked (block / reinstate)
//! blocked → pending (unblock)
//! ```
//!
//! Rejection is modeled as a transition into `blocked` rather than a
//! separate terminal state; a silently-dropped request would let the user
//! immediately re-request. All transitions are idempotent: repeating an
//! operation returns the current state instead of failing.

use std::sync::Arc;
use tracing::info;

use crate::error::CoreResult;
use crate::store::IdentityStore;
use crate::types::{Identity, IdentityStatus, JoinRequest};

/// Operator-driven state machine over the identity store.
pub struct JoinWorkflow {
    identities: Arc<dyn IdentityStore>,
}

impl JoinWorkflow {
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }

    /// Register first contact from an unapproved identity.
    ///
    /// Creates a pending record if none exists. Re-requesting while already
    /// pending is a no-op; approved and blocked identities keep their
    /// status (a blocked user cannot re-open a request).
    pub fn request_join(&self, identity_id: &str, display_name: &str) -> CoreResult<Identity> {
        if let Some(existing) = self.identities.get(identity_id)? {
            return Ok(existing);
        }
        let identity = Identity::new(identity_id, display_name);
        self.identities.put(&identity)?;
        info!(identity = identity_id, name = display_name, "join request created");
        Ok(identity)
    }

    /// Approve an identity. Idempotent; also reinstates a blocked identity.
    pub fn approve(&self, identity_id: &str) -> CoreResult<Identity> {
        self.transition(identity_id, IdentityStatus::Approved, "approved")
    }

    /// Reject a pending request, which blocks the identity.
    ///
    /// Identities that are not pending are left untouched.
    pub fn reject(&self, identity_id: &str) -> CoreResult<Identity> {
        let Some(mut identity) = self.identities.get(identity_id)? else {
            // Nothing to reject; record the contact as blocked so a repeat
            // request cannot slip through
            let mut identity = Identity::new(identity_id, identity_id);
            identity.status = IdentityStatus::Blocked;
            self.identities.put(&identity)?;
            return Ok(identity);
        };
        if identity.status == IdentityStatus::Pending {
            identity.status = IdentityStatus::Blocked;
            self.identities.put(&identity)?;
            info!(identity = identity_id, "join request rejected");
        }
        Ok(identity)
    }

    /// Block an identity regardless of its current status. The record is
    /// retained, only the status changes.
    pub fn block(&self, identity_id: &str) -> CoreResult<Identity> {
        self.transition(identity_id, IdentityStatus::Blocked, "blocked")
    }

    /// Lift a block, returning the identity to `pending` for re-approval.
    pub fn unblock(&self, identity_id: &str) -> CoreResult<Identity> {
        let Some(mut identity) = self.identities.get(identity_id)? else {
            return Ok(Identity::new(identity_id, identity_id));
        };
        if identity.status == IdentityStatus::Blocked {
            identity.status = IdentityStatus::Pending;
            self.identities.put(&identity)?;
            info!(identity = identity_id, "unblocked");
        }
        Ok(identity)
    }

    /// Open join requests, derived from pending identities.
    pub fn list_pending(&self) -> CoreResult<Vec<JoinRequest>> {
        Ok(self
            .identities
            .list()?
            .into_iter()
            .filter(|i| i.status == IdentityStatus::Pending)
            .map(|i| JoinRequest {
                identity_id: i.id,
                display_name: i.display_name,
                requested_at: i.joined_at,
            })
            .collect())
    }

    fn transition(
        &self,
        identity_id: &str,
        status: IdentityStatus,
        verb: &str,
    ) -> CoreResult<Identity> {
        let mut identity = self
            .identities
            .get(identity_id)?
            .unwrap_or_else(|| Identity::new(identity_id, identity_id));
        if identity.status != status {
            identity.status = status;
            self.identities.put(&identity)?;
            info!(identity = identity_id, "{}", verb);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn workflow() -> (Arc<MemoryStore>, JoinWorkflow) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), JoinWorkflow::new(store))
    }

    #[test]
    fn test_request_then_approve() {
        let (_, wf) = workflow();
        let identity = wf.request_join("1", "alice").unwrap();
        assert_eq!(identity.status, IdentityStatus::Pending);
        assert_eq!(wf.list_pending().unwrap().len(), 1);

        let identity = wf.approve("1").unwrap();
        assert_eq!(identity.status, IdentityStatus::Approved);
        assert!(wf.list_pending().unwrap().is_empty());
    }

    #[test]
    fn test_approve_is_idempotent() {
        let (store, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        wf.approve("1").unwrap();
        let again = wf.approve("1").unwrap();

        assert_eq!(again.status, IdentityStatus::Approved);
        // No duplicate record appears
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_re_request_while_pending_is_noop() {
        let (store, wf) = workflow();
        let first = wf.request_join("1", "alice").unwrap();
        let second = wf.request_join("1", "alice-renamed").unwrap();

        assert_eq!(second.display_name, first.display_name);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_reject_blocks_the_identity() {
        let (_, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        let identity = wf.reject("1").unwrap();

        assert_eq!(identity.status, IdentityStatus::Blocked);
        assert!(wf.list_pending().unwrap().is_empty());
    }

    #[test]
    fn test_reject_does_not_touch_approved() {
        let (_, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        wf.approve("1").unwrap();
        let identity = wf.reject("1").unwrap();
        assert_eq!(identity.status, IdentityStatus::Approved);
    }

    #[test]
    fn test_block_retains_record() {
        let (store, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        wf.approve("1").unwrap();
        wf.block("1").unwrap();

        let identity = store.get("1").unwrap().unwrap();
        assert_eq!(identity.status, IdentityStatus::Blocked);
        assert_eq!(identity.display_name, "alice");
    }

    #[test]
    fn test_unblock_then_approve_restores_access() {
        let (_, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        wf.reject("1").unwrap();

        let identity = wf.unblock("1").unwrap();
        assert_eq!(identity.status, IdentityStatus::Pending);
        let identity = wf.approve("1").unwrap();
        assert_eq!(identity.status, IdentityStatus::Approved);
    }

    #[test]
    fn test_blocked_identity_cannot_re_request() {
        let (_, wf) = workflow();
        wf.request_join("1", "alice").unwrap();
        wf.reject("1").unwrap();

        let identity = wf.request_join("1", "alice").unwrap();
        assert_eq!(identity.status, IdentityStatus::Blocked);
    }
}
