//! Governance store: layout and bootstrap of the governance root.
//!
//! The governance root holds six containers, each with its own access-control document:
//!
//! | Container | Write | Read |
//! |---|---|---|
//! | `notices/` | governance | governance, patients, doctors |
//! | `grants/` | governance | governance, patients, doctors |
//! | `grants/state/` | governance, patients | governance, patients, doctors |
//! | `grants/acks/` | governance, doctors | governance, patients, doctors |
//! | `audit/` | governance | governance |
//! | `audit/events/` | governance; append for every known actor | governance |
//!
//! Bootstrap is idempotent and safe to re-run: containers are created only when absent, ACDs
//! are rewritten with identical content and the terms document is written only when missing.

use crate::audit::{AuditEvent, AuditLog, NewAuditEvent};
use crate::client::ContainerState;
use crate::constants::{
    AUDIT_DIR, AUDIT_EVENTS_DIR, CONTENT_TYPE_TEXT, CONTENT_TYPE_TURTLE, GRANTS_DIR,
    GRANT_ACKS_DIR, GRANT_STATE_DIR, NOTICES_DIR, TERMS_DIR,
};
use crate::grants::GrantKey;
use crate::session::SessionContext;
use crate::{CoreConfig, PodResult};
use acp::{AccessBlock, AccessControl, AccessControlDocument, AccessMode, AccessTarget, Matcher};
use pod_types::{Role, WebId};
use pod_uuid::UuidService;
use std::sync::Arc;
use url::Url;

/// The containers under the governance root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GovernanceContainer {
    Notices,
    Grants,
    GrantState,
    GrantAcks,
    Audit,
    AuditEvents,
}

impl GovernanceContainer {
    /// In creation order (parents first).
    pub const ALL: [GovernanceContainer; 6] = [
        GovernanceContainer::Notices,
        GovernanceContainer::Grants,
        GovernanceContainer::GrantState,
        GovernanceContainer::GrantAcks,
        GovernanceContainer::Audit,
        GovernanceContainer::AuditEvents,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            GovernanceContainer::Notices => NOTICES_DIR,
            GovernanceContainer::Grants => GRANTS_DIR,
            GovernanceContainer::GrantState => GRANT_STATE_DIR,
            GovernanceContainer::GrantAcks => GRANT_ACKS_DIR,
            GovernanceContainer::Audit => AUDIT_DIR,
            GovernanceContainer::AuditEvents => AUDIT_EVENTS_DIR,
        }
    }

    /// Roles, besides governance, that may read.
    fn readers(&self) -> &'static [Role] {
        match self {
            GovernanceContainer::Notices
            | GovernanceContainer::Grants
            | GovernanceContainer::GrantState
            | GovernanceContainer::GrantAcks => &[Role::Patient, Role::Doctor],
            GovernanceContainer::Audit | GovernanceContainer::AuditEvents => &[],
        }
    }

    /// Roles, besides governance, that may write.
    fn writers(&self) -> &'static [Role] {
        match self {
            GovernanceContainer::GrantState => &[Role::Patient],
            GovernanceContainer::GrantAcks => &[Role::Doctor],
            _ => &[],
        }
    }

    /// Whether every non-governance actor may append.
    fn open_append(&self) -> bool {
        matches!(self, GovernanceContainer::AuditEvents)
    }
}

/// Result of [`GovernanceStore::bootstrap`].
#[derive(Clone, Debug)]
pub struct BootstrapReport {
    pub created: Vec<Url>,
    pub existing: Vec<Url>,
    /// `false` when the current terms were already stored.
    pub terms_written: bool,
    pub event: AuditEvent,
}

/// Paths and bootstrap for the governance root.
#[derive(Clone, Debug)]
pub struct GovernanceStore {
    cfg: Arc<CoreConfig>,
}

impl GovernanceStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    pub fn container_url(&self, container: GovernanceContainer) -> PodResult<Url> {
        self.cfg.governance_url(container.path())
    }

    /// `notices/terms/<version>.txt`
    pub fn terms_url(&self, version: &str) -> PodResult<Url> {
        self.cfg.governance_url(&format!("{TERMS_DIR}{version}.txt"))
    }

    /// `grants/state/<key>.json`
    pub fn grant_state_url(&self, key: &GrantKey) -> PodResult<Url> {
        self.cfg.governance_url(&format!("{GRANT_STATE_DIR}{key}.json"))
    }

    /// `grants/acks/<key>-<grantId>.json`
    pub fn ack_url(&self, key: &GrantKey, grant_id: &UuidService) -> PodResult<Url> {
        self.cfg
            .governance_url(&format!("{GRANT_ACKS_DIR}{key}-{grant_id}.json"))
    }

    pub fn audit_events_url(&self) -> PodResult<Url> {
        self.container_url(GovernanceContainer::AuditEvents)
    }

    /// `audit/events/<eventId>.json`
    pub fn audit_event_url(&self, event_id: &UuidService) -> PodResult<Url> {
        self.cfg
            .governance_url(&format!("{AUDIT_EVENTS_DIR}{event_id}.json"))
    }

    /// Governance identities: the owner plus anyone configured with the governance role.
    fn governance_agents(&self) -> Vec<WebId> {
        let mut agents = vec![self.cfg.governance_owner().clone()];
        for member in self.cfg.roles().members(Role::Governance) {
            if !agents.contains(&member) {
                agents.push(member);
            }
        }
        agents
    }

    fn role_agents(&self, roles: &[Role]) -> Vec<WebId> {
        roles
            .iter()
            .flat_map(|role| self.cfg.roles().members(*role))
            .collect()
    }

    /// Render the access-control document for `container`.
    ///
    /// Blocks with nobody to match are left out.
    pub fn container_acd(&self, container: GovernanceContainer) -> PodResult<String> {
        let url = self.container_url(container)?;
        let mode = self.cfg.matcher_mode();
        let target = AccessTarget::new("root", url.as_str())?.with_members();

        let mut blocks = vec![AccessBlock::new(
            "governance",
            &AccessMode::FULL,
            Matcher::new(self.governance_agents(), mode.clone()),
        )?];

        let candidates = [
            ("reader", vec![AccessMode::Read], self.role_agents(container.readers())),
            ("writer", vec![AccessMode::Write], self.role_agents(container.writers())),
            (
                "appender",
                vec![AccessMode::Append, AccessMode::Write],
                if container.open_append() {
                    self.cfg.roles().actors()
                } else {
                    Vec::new()
                },
            ),
        ];
        for (stem, modes, agents) in candidates {
            if agents.is_empty() {
                continue;
            }
            blocks.push(AccessBlock::new(
                stem,
                &modes,
                Matcher::new(agents, mode.clone()),
            )?);
        }

        let document = AccessControlDocument::new(vec![target], blocks)?;
        Ok(AccessControl::render(&document))
    }

    /// Create the governance layout, write the current terms if missing and record a
    /// `BOOTSTRAP` audit event.
    ///
    /// # Errors
    ///
    /// [`crate::PodError::NotPermitted`] unless `session` is the governance owner. Storage
    /// failures are surfaced as they occur; a partial bootstrap is completed by re-running.
    pub async fn bootstrap(&self, session: &SessionContext) -> PodResult<BootstrapReport> {
        session.require_identity(self.cfg.governance_owner(), "bootstrap governance storage")?;
        let client = session.client();

        let mut created = Vec::new();
        let mut existing = Vec::new();
        for container in GovernanceContainer::ALL {
            let url = self.container_url(container)?;
            match client.ensure_container(&url).await? {
                ContainerState::Created => created.push(url.clone()),
                ContainerState::Existing => existing.push(url.clone()),
            }

            let acd = self.container_acd(container)?;
            client
                .put_text(&self.cfg.acd_url(&url)?, &acd, CONTENT_TYPE_TURTLE)
                .await?;
            tracing::debug!(container = %url, "governance container ready");
        }

        let terms = self.cfg.terms();
        let terms_url = self.terms_url(terms.version())?;
        let terms_written = if client.get_text(&terms_url).await?.is_none() {
            client
                .put_text(&terms_url, terms.text(), CONTENT_TYPE_TEXT)
                .await?;
            tracing::info!(version = terms.version(), url = %terms_url, "terms of use published");
            true
        } else {
            false
        };

        let event = AuditLog::new(self.cfg.clone(), session.clone())
            .append(NewAuditEvent::bootstrap().with_terms(terms.version(), terms.hash()))
            .await?;

        tracing::info!(
            created = created.len(),
            existing = existing.len(),
            terms_written,
            "governance bootstrap complete"
        );
        Ok(BootstrapReport {
            created,
            existing,
            terms_written,
            event,
        })
    }
}
