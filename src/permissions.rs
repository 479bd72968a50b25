use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::models::{OperationRole, UserId};

/// Identity of the caller for a single request.
///
/// Built by the host's authentication layer and passed to every call; this
/// crate never derives it from request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl ActorContext {
    pub fn new(user_id: UserId, is_admin: bool) -> Self {
        Self { user_id, is_admin }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, true)
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(user_id, false)
    }
}

/// Role required on an operation before its user groups can be listed.
pub const OPERATION_GROUPS_LIST_ROLE: OperationRole = OperationRole::Admin;

/// Global-admin gate shared by every user group CRUD entry point.
pub fn require_admin(actor: &ActorContext, public: &'static str) -> Result<()> {
    if actor.is_admin {
        return Ok(());
    }

    tracing::warn!(user_id = %actor.user_id, "user group admin action denied");
    Err(LibError::forbidden(
        public,
        anyhow!("user {} is not an admin", actor.user_id),
    ))
}

#[cfg(test)]
mod tests {
    use super::{ActorContext, require_admin};
    use crate::error::ErrorKind;
    use crate::models::UserId;

    #[test]
    fn admins_pass_the_gate() {
        let dumbledore = ActorContext::admin(UserId(1));
        require_admin(&dumbledore, "denied").expect("admin should pass");
    }

    #[test]
    fn non_admins_are_forbidden() {
        let ron = ActorContext::user(UserId(3));
        let err = require_admin(&ron, "You cannot manage user groups")
            .expect_err("non-admin should be rejected");
        assert_eq!(err.kind, ErrorKind::Forbidden);
        assert_eq!(err.public, "You cannot manage user groups");
    }
}
