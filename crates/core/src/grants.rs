//! Grant state machine.
//!
//! ```text
//! NO_GRANT --create--> ACTIVE --revoke--> REVOKED
//!                        ^                   |
//!                        +------create-------+
//! ```
//!
//! One state record lives at a deterministic key derived from `(patient, doctor, scope)`, so
//! patient and doctor agree on its location without coordination. Every grant event writes a
//! fresh grant id and therefore a fresh acknowledgement location: a doctor must acknowledge the
//! terms again after each re-grant.

use crate::audit::{AuditEventType, AuditLog, NewAuditEvent};
use crate::governance::GovernanceStore;
use crate::session::SessionContext;
use crate::{CoreConfig, PodError, PodResult};
use pod_types::WebId;
use pod_uuid::{Sha256Hash, Timestamp, TimestampGenerator, UuidService};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Deterministic grant state key: the leading hex characters of
/// `sha256("<patient>::<doctor>::<scope>")`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantKey(String);

impl GrantKey {
    pub fn derive(patient: &WebId, doctor: &WebId, scope: &str, len: usize) -> Self {
        let digest = Sha256Hash::digest(format!("{patient}::{doctor}::{scope}"));
        Self(digest.prefix(len).to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Revoked,
}

/// The stored grant record at `grants/state/<key>.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantState {
    pub key: GrantKey,
    pub patient: WebId,
    pub doctor: WebId,
    pub scope: String,
    pub status: GrantStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub terms_version: String,
    pub terms_hash: Sha256Hash,
    pub terms_url: String,
    pub grant_id: UuidService,
    pub ack_url: String,
}

impl GrantState {
    pub fn is_active(&self) -> bool {
        self.status == GrantStatus::Active
    }
}

fn validate_scope(scope: &str) -> PodResult<()> {
    if scope.trim().is_empty() {
        return Err(PodError::InvalidInput("scope cannot be empty".into()));
    }
    if scope.contains("::") {
        return Err(PodError::InvalidInput(format!(
            "scope cannot contain '::': '{scope}'"
        )));
    }
    Ok(())
}

/// Grant operations for one session.
///
/// Creation and revocation are patient actions on the patient's own grants. Reads are open to
/// any session the storage lets through.
#[derive(Clone, Debug)]
pub struct GrantService {
    cfg: Arc<CoreConfig>,
    store: GovernanceStore,
    session: SessionContext,
    audit: AuditLog,
}

impl GrantService {
    pub fn new(cfg: Arc<CoreConfig>, session: SessionContext) -> Self {
        Self {
            store: GovernanceStore::new(cfg.clone()),
            audit: AuditLog::new(cfg.clone(), session.clone()),
            cfg,
            session,
        }
    }

    pub fn grant_key(&self, patient: &WebId, doctor: &WebId, scope: &str) -> GrantKey {
        GrantKey::derive(patient, doctor, scope, self.cfg.grant_key_len())
    }

    /// Read the state record for the triple, whatever its status.
    ///
    /// Pure read; callers decide what a non-active status means.
    pub async fn get_active_grant_state(
        &self,
        patient: &WebId,
        doctor: &WebId,
        scope: &str,
    ) -> PodResult<Option<GrantState>> {
        validate_scope(scope)?;
        let key = self.grant_key(patient, doctor, scope);
        let url = self.store.grant_state_url(&key)?;
        self.session.client().get_json(&url).await
    }

    /// Issue a fresh grant and mark it active.
    ///
    /// Always writes a new grant id, even when an active grant already exists, which invalidates
    /// any earlier acknowledgement.
    pub async fn create_grant_and_activate(
        &self,
        patient: &WebId,
        doctor: &WebId,
        scope: &str,
    ) -> PodResult<GrantState> {
        validate_scope(scope)?;
        self.session.require_identity(patient, "grant access to this record")?;

        let key = self.grant_key(patient, doctor, scope);
        let grant_id = UuidService::new();
        let terms = self.cfg.terms();
        let terms_url = self.store.terms_url(terms.version())?;
        let ack_url = self.store.ack_url(&key, &grant_id)?;
        let now = TimestampGenerator::now();

        let state = GrantState {
            key: key.clone(),
            patient: patient.clone(),
            doctor: doctor.clone(),
            scope: scope.to_owned(),
            status: GrantStatus::Active,
            created_at: now,
            updated_at: now,
            terms_version: terms.version().to_owned(),
            terms_hash: terms.hash().clone(),
            terms_url: terms_url.to_string(),
            grant_id: grant_id.clone(),
            ack_url: ack_url.to_string(),
        };

        let url = self.store.grant_state_url(&key)?;
        self.session.client().put_json(&url, &state).await?;
        tracing::info!(
            patient = %patient,
            doctor = %doctor,
            scope,
            grant_id = %grant_id,
            "grant activated"
        );

        self.audit
            .append(
                NewAuditEvent::for_grant(AuditEventType::Grant, patient, doctor, scope)
                    .with_grant_id(&grant_id)
                    .with_ack_url(&state.ack_url)
                    .with_terms(&state.terms_version, &state.terms_hash),
            )
            .await?;

        Ok(state)
    }

    /// Revoke the active grant, if there is one.
    ///
    /// Returns `Ok(None)` when there was nothing to revoke. The acknowledgement record is left
    /// in place; the status flip alone closes the gate.
    pub async fn revoke_active_grant(
        &self,
        patient: &WebId,
        doctor: &WebId,
        scope: &str,
    ) -> PodResult<Option<GrantState>> {
        self.session.require_identity(patient, "revoke access to this record")?;

        let Some(mut state) = self.get_active_grant_state(patient, doctor, scope).await? else {
            tracing::debug!(patient = %patient, doctor = %doctor, scope, "no grant to revoke");
            return Ok(None);
        };
        if !state.is_active() {
            tracing::debug!(patient = %patient, doctor = %doctor, scope, "grant already revoked");
            return Ok(None);
        }

        state.status = GrantStatus::Revoked;
        state.updated_at = TimestampGenerator::now();

        let url = self.store.grant_state_url(&state.key)?;
        self.session.client().put_json(&url, &state).await?;
        tracing::info!(
            patient = %patient,
            doctor = %doctor,
            scope,
            grant_id = %state.grant_id,
            "grant revoked"
        );

        self.audit
            .append(
                NewAuditEvent::for_grant(AuditEventType::Revoke, patient, doctor, scope)
                    .with_grant_id(&state.grant_id),
            )
            .await?;

        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::test_support::Fixture;

    #[test]
    fn test_grant_key_is_deterministic() {
        let patient = WebId::parse("https://alice.example/profile/card#me").unwrap();
        let doctor = WebId::parse("https://drbob.example/profile/card#me").unwrap();

        let a = GrantKey::derive(&patient, &doctor, "record", 32);
        let b = GrantKey::derive(&patient, &doctor, "record", 32);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);

        let expected = Sha256Hash::digest(format!("{patient}::{doctor}::record"));
        assert!(expected.as_str().starts_with(a.as_str()));

        assert_ne!(a, GrantKey::derive(&patient, &doctor, "files", 32));
        assert_ne!(a, GrantKey::derive(&doctor, &patient, "record", 32));
    }

    #[test]
    fn test_state_wire_format() {
        let json = serde_json::json!({
            "key": "0123456789abcdef0123456789abcdef",
            "patient": "https://alice.example/#me",
            "doctor": "https://drbob.example/#me",
            "scope": "record",
            "status": "active",
            "createdAt": "2026-10-18T09:15:02.123Z",
            "updatedAt": "2026-10-18T09:15:02.123Z",
            "termsVersion": "v1",
            "termsHash": Sha256Hash::digest("terms").as_str(),
            "termsUrl": "https://gov.example/notices/terms/v1.txt",
            "grantId": "550e8400e29b41d4a716446655440000",
            "ackUrl": "https://gov.example/grants/acks/x.json",
        });
        let state: GrantState = serde_json::from_value(json.clone()).unwrap();
        assert!(state.is_active());
        assert_eq!(serde_json::to_value(&state).unwrap(), json);
    }

    #[tokio::test]
    async fn test_absent_grant() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.patient_session());
        let state = grants
            .get_active_grant_state(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_create_then_revoke() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.patient_session());

        let created = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        assert!(created.is_active());
        assert_eq!(created.terms_version, "v1");
        assert_eq!(&created.terms_hash, fx.cfg.terms().hash());
        assert!(created.ack_url.ends_with(&format!("{}-{}.json", created.key, created.grant_id)));

        let revoked = grants
            .revoke_active_grant(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revoked.status, GrantStatus::Revoked);
        assert_eq!(revoked.grant_id, created.grant_id);
        assert!(revoked.updated_at > created.updated_at);

        let stored = grants
            .get_active_grant_state(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, revoked);

        let again = grants
            .revoke_active_grant(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_regrant_issues_new_grant_id() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.patient_session());

        let first = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        grants
            .revoke_active_grant(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        let second = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();

        assert_eq!(first.key, second.key);
        assert_ne!(first.grant_id, second.grant_id);
        assert_ne!(first.ack_url, second.ack_url);
        assert!(second.is_active());
    }

    #[tokio::test]
    async fn test_grant_events_are_audited() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.patient_session());
        grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();
        grants
            .revoke_active_grant(&fx.patient, &fx.doctor, "record")
            .await
            .unwrap();

        let log = AuditLog::new(fx.cfg.clone(), fx.governance_session());
        let events = log.list_filtered(&AuditFilter::default(), 10).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![AuditEventType::Revoke, AuditEventType::Grant]);
        assert!(events.iter().all(|e| e.actor == fx.patient));
    }

    #[tokio::test]
    async fn test_only_the_patient_may_grant() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.doctor_session());
        let result = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "record")
            .await;
        assert!(matches!(result, Err(PodError::NotPermitted { .. })));

        let result = grants
            .revoke_active_grant(&fx.patient, &fx.doctor, "record")
            .await;
        assert!(matches!(result, Err(PodError::NotPermitted { .. })));
    }

    #[tokio::test]
    async fn test_scope_validation() {
        let fx = Fixture::new();
        let grants = GrantService::new(fx.cfg.clone(), fx.patient_session());
        let result = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, " ")
            .await;
        assert!(matches!(result, Err(PodError::InvalidInput(_))));
        let result = grants
            .create_grant_and_activate(&fx.patient, &fx.doctor, "a::b")
            .await;
        assert!(matches!(result, Err(PodError::InvalidInput(_))));
    }
}
