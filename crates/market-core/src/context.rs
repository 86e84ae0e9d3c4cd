//! Request Context
//!
//! Carries the authenticated actor and a request id into every domain
//! operation explicitly, instead of reading session state from globals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MarketError, Result};
use crate::ids::UserId;

/// Per-request context built at the edge (HTTP layer, webhook, tests)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlates log lines for one request
    pub request_id: Uuid,

    /// User id supplied by the auth provider; `None` for anonymous visitors
    pub actor: Option<UserId>,
}

impl RequestContext {
    /// Anonymous visitor
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: None,
        }
    }

    /// Authenticated as `user`
    pub fn for_user(user: UserId) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: Some(user),
        }
    }

    pub const fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }

    /// The acting user, or `Authorization` when the visitor is anonymous
    pub fn require_actor(&self) -> Result<UserId> {
        self.actor
            .ok_or_else(|| MarketError::authorization("sign in required"))
    }

    /// Fails unless the actor is `owner`
    pub fn require_owner(&self, owner: UserId, what: &str) -> Result<UserId> {
        let actor = self.require_actor()?;
        if actor == owner {
            Ok(actor)
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                actor = %actor,
                owner = %owner,
                resource = what,
                "Rejected mutation by non-owner"
            );
            Err(MarketError::authorization(format!("{what} belongs to another user")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_actor() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(matches!(ctx.require_actor(), Err(MarketError::Authorization(_))));
    }

    #[test]
    fn test_require_owner() {
        let owner = UserId::new();
        let ctx = RequestContext::for_user(owner);
        assert_eq!(ctx.require_owner(owner, "tier").unwrap(), owner);

        let other = RequestContext::for_user(UserId::new());
        assert!(other.require_owner(owner, "tier").is_err());
    }
}
