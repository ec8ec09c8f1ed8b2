//! Doctor gate: enforce an active grant and a one-time legal-notice acknowledgement per grant.
//!
//! A doctor may read a patient's record under a scope only when:
//!
//! 1. the grant state for `(patient, doctor, scope)` exists and is active, and
//! 2. an acknowledgement for the *current* grant id exists at the state's acknowledgement URL.
//!
//! Otherwise the read is refused with a [`GateError`]. A refusal because of missing
//! acknowledgement carries the [`LegalNotice`] to present; acknowledging it clears the gate.
//!
//! An acknowledgement that exists but does not parse is treated as satisfied and logged at
//! `warn`. Refusals are audited as `READ_BLOCKED` on a best-effort basis.

use crate::audit::{AuditEventType, AuditLog, NewAuditEvent};
use crate::client::parse_url;
use crate::error::{GateError, GateResult};
use crate::grants::{GrantService, GrantState};
use crate::session::SessionContext;
use crate::{CoreConfig, PodError};
use pod_types::{Role, WebId};
use pod_uuid::{Sha256Hash, Timestamp, TimestampGenerator, UuidService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terms the doctor must accept before reading under `grant_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalNotice {
    pub terms_version: String,
    pub terms_hash: Sha256Hash,
    pub terms_url: String,
    pub text: String,
    pub grant_id: UuidService,
}

/// The record at a grant's acknowledgement URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub grant_id: UuidService,
    pub actor: WebId,
    pub acknowledged_at: Timestamp,
    pub terms_version: String,
    pub terms_hash: Sha256Hash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Recorded(Acknowledgement),
    /// A valid acknowledgement for the current grant already existed; nothing was written.
    AlreadyAcknowledged,
}

enum AckStatus {
    Valid,
    Missing,
}

/// Gate checks for a doctor session.
#[derive(Clone, Debug)]
pub struct DoctorGate {
    session: SessionContext,
    grants: GrantService,
    audit: AuditLog,
}

impl DoctorGate {
    pub fn new(cfg: Arc<CoreConfig>, session: SessionContext) -> Self {
        Self {
            grants: GrantService::new(cfg.clone(), session.clone()),
            audit: AuditLog::new(cfg, session.clone()),
            session,
        }
    }

    /// Pass, returning the active grant, or fail with the reason the read is blocked.
    ///
    /// # Errors
    ///
    /// - [`GateError::NoActiveGrant`] when there is no grant or it was revoked
    /// - [`GateError::LegalNoticeRequired`] when the current grant has not been acknowledged
    /// - [`GateError::Pod`] for storage failures, including [`PodError::MissingTerms`]
    pub async fn gate_or_throw(&self, patient: &WebId, scope: &str) -> GateResult<GrantState> {
        self.session.require_role(Role::Doctor, "read patient records")?;
        let doctor = self.session.web_id();

        let state = match self.grants.get_active_grant_state(patient, doctor, scope).await? {
            Some(state) if state.is_active() => state,
            _ => {
                tracing::info!(patient = %patient, doctor = %doctor, scope, "read blocked: no active grant");
                self.record_blocked(patient, scope, None).await;
                return Err(GateError::NoActiveGrant);
            }
        };

        match self.acknowledgement_status(&state).await? {
            AckStatus::Valid => {
                tracing::debug!(patient = %patient, doctor = %doctor, scope, grant_id = %state.grant_id, "gate passed");
                Ok(state)
            }
            AckStatus::Missing => {
                let notice = self.legal_notice(&state).await?;
                tracing::info!(
                    patient = %patient,
                    doctor = %doctor,
                    scope,
                    grant_id = %state.grant_id,
                    "read blocked: legal notice not acknowledged"
                );
                self.record_blocked(patient, scope, Some(&state)).await;
                Err(GateError::LegalNoticeRequired(Box::new(notice)))
            }
        }
    }

    /// Acknowledge the terms of the current active grant.
    ///
    /// Terms version and hash are copied from the grant record, not from the live
    /// configuration, so the acknowledgement names exactly what was granted.
    pub async fn acknowledge_grant(&self, patient: &WebId, scope: &str) -> GateResult<AckOutcome> {
        self.session.require_role(Role::Doctor, "acknowledge legal notices")?;
        let doctor = self.session.web_id();

        let state = match self.grants.get_active_grant_state(patient, doctor, scope).await? {
            Some(state) if state.is_active() => state,
            _ => return Err(GateError::NoActiveGrant),
        };

        if let AckStatus::Valid = self.acknowledgement_status(&state).await? {
            tracing::debug!(grant_id = %state.grant_id, "grant already acknowledged");
            return Ok(AckOutcome::AlreadyAcknowledged);
        }

        let ack = Acknowledgement {
            grant_id: state.grant_id.clone(),
            actor: doctor.clone(),
            acknowledged_at: TimestampGenerator::now(),
            terms_version: state.terms_version.clone(),
            terms_hash: state.terms_hash.clone(),
        };
        let ack_url = parse_url(&state.ack_url)?;
        self.session.client().put_json(&ack_url, &ack).await?;
        tracing::info!(
            patient = %patient,
            doctor = %doctor,
            scope,
            grant_id = %state.grant_id,
            terms_version = %state.terms_version,
            "legal notice acknowledged"
        );

        self.audit
            .append(
                NewAuditEvent::for_grant(AuditEventType::NoticeAck, patient, doctor, scope)
                    .with_grant_id(&state.grant_id)
                    .with_ack_url(&state.ack_url)
                    .with_terms(&state.terms_version, &state.terms_hash),
            )
            .await?;

        Ok(AckOutcome::Recorded(ack))
    }

    async fn acknowledgement_status(&self, state: &GrantState) -> GateResult<AckStatus> {
        let url = parse_url(&state.ack_url)?;
        let Some(body) = self.session.client().get_text(&url).await? else {
            return Ok(AckStatus::Missing);
        };

        match serde_json::from_str::<Acknowledgement>(&body) {
            Ok(ack) if ack.actor == *self.session.web_id() && ack.grant_id == state.grant_id => {
                Ok(AckStatus::Valid)
            }
            Ok(ack) => {
                tracing::warn!(
                    url = %url,
                    actor = %ack.actor,
                    grant_id = %ack.grant_id,
                    "acknowledgement does not match the current grant"
                );
                Ok(AckStatus::Missing)
            }
            Err(e) => {
                // Fail-open: an unreadable acknowledgement still counts.
                tracing::warn!(url = %url, error = %e, "unparseable acknowledgement treated as valid");
                Ok(AckStatus::Valid)
            }
        }
    }

    async fn legal_notice(&self, state: &GrantState) -> GateResult<LegalNotice> {
        let url = parse_url(&state.terms_url)?;
        let text = self
            .session
            .client()
            .get_text(&url)
            .await?
            .ok_or_else(|| PodError::MissingTerms {
                url: state.terms_url.clone(),
            })?;

        Ok(LegalNotice {
            terms_version: state.terms_version.clone(),
            terms_hash: state.terms_hash.clone(),
            terms_url: state.terms_url.clone(),
            text,
            grant_id: state.grant_id.clone(),
        })
    }

    /// Append `READ_BLOCKED`; a failure here is logged and never replaces the gate error.
    async fn record_blocked(&self, patient: &WebId, scope: &str, state: Option<&GrantState>) {
        let mut event = NewAuditEvent::for_grant(
            AuditEventType::ReadBlocked,
            patient,
            self.session.web_id(),
            scope,
        );
        if let Some(state) = state {
            event = event
                .with_grant_id(&state.grant_id)
                .with_terms(&state.terms_version, &state.terms_hash);
        }
        if let Err(e) = self.audit.append(event).await {
            tracing::warn!(patient = %patient, scope, error = %e, "failed to audit blocked read");
        }
    }
}
