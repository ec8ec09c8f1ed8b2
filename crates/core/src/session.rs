//! The authenticated session threaded through every operation.
//!
//! A [`SessionContext`] is created by the host once the identity handshake has produced an
//! [`AuthenticatedFetch`], and dropped on logout. There is no global session.

use crate::client::ResourceClient;
use crate::fetch::AuthenticatedFetch;
use crate::{PodError, PodResult};
use pod_types::{Role, RoleTable, WebId};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct SessionContext {
    web_id: WebId,
    role: Role,
    fetch: Arc<dyn AuthenticatedFetch>,
}

impl SessionContext {
    /// Resolve the identity behind `fetch` against `roles`.
    ///
    /// # Errors
    ///
    /// Returns [`PodError::UnknownIdentity`] when the identity has no configured role.
    pub fn new(fetch: Arc<dyn AuthenticatedFetch>, roles: &RoleTable) -> PodResult<Self> {
        let web_id = fetch.web_id().clone();
        let role = roles
            .role_of(&web_id)
            .ok_or_else(|| PodError::UnknownIdentity(web_id.clone()))?;
        tracing::debug!(web_id = %web_id, role = %role, "session established");
        Ok(Self {
            web_id,
            role,
            fetch,
        })
    }

    /// Session with an explicitly chosen role.
    pub fn with_role(fetch: Arc<dyn AuthenticatedFetch>, role: Role) -> Self {
        Self {
            web_id: fetch.web_id().clone(),
            role,
            fetch,
        }
    }

    pub fn web_id(&self) -> &WebId {
        &self.web_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn client(&self) -> ResourceClient {
        ResourceClient::new(self.fetch.clone())
    }

    /// Fail with [`PodError::NotPermitted`] unless the session acts as `role`.
    pub fn require_role(&self, role: Role, action: &'static str) -> PodResult<()> {
        if self.role != role {
            return Err(PodError::NotPermitted {
                web_id: self.web_id.clone(),
                action,
            });
        }
        Ok(())
    }

    /// Fail with [`PodError::NotPermitted`] unless the session identity is `web_id`.
    pub fn require_identity(&self, web_id: &WebId, action: &'static str) -> PodResult<()> {
        if &self.web_id != web_id {
            return Err(PodError::NotPermitted {
                web_id: self.web_id.clone(),
                action,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("web_id", &self.web_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPod;

    #[test]
    fn test_role_resolved_from_table() {
        let alice = WebId::parse("https://alice.example/#me").unwrap();
        let roles = RoleTable::new().with(alice.clone(), Role::Patient);
        let pod = MemoryPod::new();

        let session = SessionContext::new(Arc::new(pod.session(alice.clone())), &roles).unwrap();
        assert_eq!(session.role(), Role::Patient);
        assert!(session.require_role(Role::Patient, "edit").is_ok());
        assert!(matches!(
            session.require_role(Role::Doctor, "read"),
            Err(PodError::NotPermitted { action: "read", .. })
        ));
        assert!(session.require_identity(&alice, "grant").is_ok());
    }

    #[test]
    fn test_unknown_identity_rejected() {
        let mallory = WebId::parse("https://mallory.example/#me").unwrap();
        let result = SessionContext::new(
            Arc::new(MemoryPod::new().session(mallory)),
            &RoleTable::new(),
        );
        assert!(matches!(result, Err(PodError::UnknownIdentity(_))));
    }
}
