//! Role-based access control on a patient's health container.
//!
//! The patient's "apply" action writes one Access-Control Document per protected resource (the
//! health container, the files listing and the record document, each at `<resource>.acl`) and
//! then brings the governance grant in line with the doctor toggle.
//!
//! Reading access back is a substring test for the deterministic block identifiers, and it fails
//! closed: an absent, forbidden or unreadable document reports no access at all.

use crate::constants::CONTENT_TYPE_TURTLE;
use crate::grants::{GrantService, GrantState};
use crate::records::{HealthPaths, PatientPod};
use crate::session::SessionContext;
use crate::{CoreConfig, PodResult};
use acp::roles::detect_role_blocks;
use acp::{MatcherMode, RoleDocument, RoleGrant, SharedRole};
use pod_types::{Role, WebId};
use std::sync::Arc;

/// Which roles the patient wants to share with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessToggles {
    pub doctor: bool,
    pub emergency: bool,
    pub pharmacy: bool,
    pub nurse: bool,
}

impl AccessToggles {
    fn is_on(&self, role: SharedRole) -> bool {
        match role {
            SharedRole::Doctor => self.doctor,
            SharedRole::Emergency => self.emergency,
            SharedRole::Pharmacy => self.pharmacy,
            SharedRole::Nurse => self.nurse,
        }
    }
}

/// Identities to name in each role block. Empty lists produce no block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleGrants {
    pub doctor: Vec<WebId>,
    pub emergency: Vec<WebId>,
    pub pharmacy: Vec<WebId>,
    pub nurse: Vec<WebId>,
}

impl RoleGrants {
    /// Every configured identity of each toggled role.
    pub fn from_toggles(cfg: &CoreConfig, toggles: AccessToggles) -> Self {
        let members = |role: SharedRole| {
            if toggles.is_on(role) {
                cfg.roles().members(role.role())
            } else {
                Vec::new()
            }
        };
        Self {
            doctor: members(SharedRole::Doctor),
            emergency: members(SharedRole::Emergency),
            pharmacy: members(SharedRole::Pharmacy),
            nurse: members(SharedRole::Nurse),
        }
    }

    fn to_role_grants(&self) -> Vec<RoleGrant> {
        [
            (SharedRole::Doctor, &self.doctor),
            (SharedRole::Emergency, &self.emergency),
            (SharedRole::Pharmacy, &self.pharmacy),
            (SharedRole::Nurse, &self.nurse),
        ]
        .into_iter()
        .map(|(role, agents)| RoleGrant {
            role,
            agents: agents.clone(),
        })
        .collect()
    }
}

/// What the ACD on a health container grants, as far as substring read-back can tell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessGrants {
    pub doctor_granted: bool,
    pub emergency_granted: bool,
    pub pharmacy_granted: bool,
    pub nurse_granted: bool,
}

/// Render the ACD protecting the health container and its two documents.
pub fn build_access_control_document(
    paths: &HealthPaths,
    owner: &WebId,
    grants: &RoleGrants,
    mode: &MatcherMode,
) -> PodResult<String> {
    let document = RoleDocument {
        container: paths.container.to_string(),
        files: paths.files.to_string(),
        record: paths.record.to_string(),
    };
    Ok(document.build(owner, &grants.to_role_grants(), mode)?)
}

/// Result of [`AccessControlService::apply_access_control`].
#[derive(Clone, Debug, Default)]
pub struct ApplyReport {
    pub granted: Vec<GrantState>,
    pub revoked: Vec<GrantState>,
}

#[derive(Clone, Debug)]
pub struct AccessControlService {
    cfg: Arc<CoreConfig>,
    session: SessionContext,
}

impl AccessControlService {
    pub fn new(cfg: Arc<CoreConfig>, session: SessionContext) -> Self {
        Self { cfg, session }
    }

    /// Read back which role blocks the container ACD declares. Never fails.
    pub async fn read_access_grants(&self, pod: &PatientPod) -> AccessGrants {
        match self.try_read_access_grants(pod).await {
            Ok(grants) => grants,
            Err(e) => {
                tracing::debug!(pod = %pod.root(), error = %e, "access read failed, reporting no access");
                AccessGrants::default()
            }
        }
    }

    async fn try_read_access_grants(&self, pod: &PatientPod) -> PodResult<AccessGrants> {
        let paths = HealthPaths::resolve(&self.cfg, pod)?;
        let acd_url = self.cfg.acd_url(&paths.container)?;
        let Some(text) = self.session.client().get_text(&acd_url).await? else {
            return Ok(AccessGrants::default());
        };
        let detected = detect_role_blocks(&text);
        Ok(AccessGrants {
            doctor_granted: detected.doctor,
            emergency_granted: detected.emergency,
            pharmacy_granted: detected.pharmacy,
            nurse_granted: detected.nurse,
        })
    }

    /// Write the ACD for the container, the files listing and the record (full replace).
    pub async fn write_access_control(&self, pod: &PatientPod, grants: &RoleGrants) -> PodResult<()> {
        self.session
            .require_identity(pod.owner(), "change access to this pod")?;
        let paths = HealthPaths::resolve(&self.cfg, pod)?;
        let text = build_access_control_document(
            &paths,
            pod.owner(),
            grants,
            self.cfg.matcher_mode(),
        )?;

        let client = self.session.client();
        client.ensure_container(&paths.container).await?;
        for resource in [&paths.container, &paths.files, &paths.record] {
            let acd_url = self.cfg.acd_url(resource)?;
            client.put_text(&acd_url, &text, CONTENT_TYPE_TURTLE).await?;
        }
        tracing::info!(pod = %pod.root(), "access control written");
        Ok(())
    }

    /// The patient's apply action.
    ///
    /// Writes the documents, then for every configured doctor either issues a new grant (doctor
    /// toggle on) or revokes the active one. A grant is re-issued on every apply with the doctor
    /// toggle on, even when nothing changed, so each apply requires a fresh acknowledgement.
    pub async fn apply_access_control(
        &self,
        pod: &PatientPod,
        toggles: AccessToggles,
        scope: &str,
    ) -> PodResult<ApplyReport> {
        self.session.require_role(Role::Patient, "change access to this pod")?;
        let grants = RoleGrants::from_toggles(&self.cfg, toggles);
        self.write_access_control(pod, &grants).await?;

        let service = GrantService::new(self.cfg.clone(), self.session.clone());
        let mut report = ApplyReport::default();
        for doctor in self.cfg.roles().members(Role::Doctor) {
            if toggles.doctor {
                report
                    .granted
                    .push(service.create_grant_and_activate(pod.owner(), &doctor, scope).await?);
            } else if let Some(state) = service.revoke_active_grant(pod.owner(), &doctor, scope).await? {
                report.revoked.push(state);
            }
        }
        Ok(report)
    }
}
