//! Append-only audit log under `audit/events/`.
//!
//! Each event is its own resource, named by a fresh identifier, so concurrent appenders never
//! overwrite each other. Every event carries a SHA-256 content hash over the sorted-key JSON of
//! all its other fields. The hash is advisory: it shows an event is self-consistent, not that the
//! log is complete or unmodified as a whole.

use crate::governance::GovernanceStore;
use crate::session::SessionContext;
use crate::{CoreConfig, PodError, PodResult};
use futures::future::join_all;
use pod_types::WebId;
use pod_uuid::{Sha256Hash, Timestamp, TimestampGenerator, UuidService};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Grant,
    NoticeAck,
    Revoke,
    ReadBlocked,
    Bootstrap,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditEventType::Grant => "GRANT",
            AuditEventType::NoticeAck => "NOTICE_ACK",
            AuditEventType::Revoke => "REVOKE",
            AuditEventType::ReadBlocked => "READ_BLOCKED",
            AuditEventType::Bootstrap => "BOOTSTRAP",
        };
        f.write_str(name)
    }
}

/// Event fields supplied by the caller; id, timestamp, actor and hash are assigned on append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub patient: Option<WebId>,
    pub doctor: Option<WebId>,
    pub scope: Option<String>,
    pub grant_id: Option<UuidService>,
    pub ack_url: Option<String>,
    pub terms_version: Option<String>,
    pub terms_hash: Option<Sha256Hash>,
}

impl NewAuditEvent {
    /// An event about the (patient, doctor, scope) triple.
    pub fn for_grant(event_type: AuditEventType, patient: &WebId, doctor: &WebId, scope: &str) -> Self {
        Self {
            event_type,
            patient: Some(patient.clone()),
            doctor: Some(doctor.clone()),
            scope: Some(scope.to_owned()),
            grant_id: None,
            ack_url: None,
            terms_version: None,
            terms_hash: None,
        }
    }

    pub fn bootstrap() -> Self {
        Self {
            event_type: AuditEventType::Bootstrap,
            patient: None,
            doctor: None,
            scope: None,
            grant_id: None,
            ack_url: None,
            terms_version: None,
            terms_hash: None,
        }
    }

    pub fn with_grant_id(mut self, grant_id: &UuidService) -> Self {
        self.grant_id = Some(grant_id.clone());
        self
    }

    pub fn with_ack_url(mut self, ack_url: &str) -> Self {
        self.ack_url = Some(ack_url.to_owned());
        self
    }

    pub fn with_terms(mut self, version: &str, hash: &Sha256Hash) -> Self {
        self.terms_version = Some(version.to_owned());
        self.terms_hash = Some(hash.clone());
        self
    }
}

/// A stored audit event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: UuidService,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub actor: WebId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<WebId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor: Option<WebId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<UuidService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_hash: Option<Sha256Hash>,
    pub hash: Sha256Hash,
    /// Keys this version does not know about. Kept so they stay covered by the hash.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Recompute the content hash and compare it with the stored one.
    pub fn verify_hash(&self) -> bool {
        match content_hash(self) {
            Ok(hash) => hash == self.hash,
            Err(e) => {
                tracing::warn!(event_id = %self.id, error = %e, "audit event could not be hashed");
                false
            }
        }
    }
}

/// SHA-256 over the canonical JSON of every field except `hash`.
fn content_hash(event: &AuditEvent) -> PodResult<Sha256Hash> {
    let mut value = serde_json::to_value(event).map_err(PodError::Serialization)?;
    if let Value::Object(map) = &mut value {
        map.remove("hash");
    }
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;
    Ok(Sha256Hash::digest(canonical.as_bytes()))
}

/// Compact JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) -> PodResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).map_err(PodError::Serialization)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).map_err(PodError::Serialization)?),
    }
    Ok(())
}

/// Conjunctive filter for [`AuditLog::list_filtered`]. `None` matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub patient: Option<WebId>,
    pub doctor: Option<WebId>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.event_type.map_or(true, |t| t == event.event_type)
            && self
                .patient
                .as_ref()
                .map_or(true, |p| event.patient.as_ref() == Some(p))
            && self
                .doctor
                .as_ref()
                .map_or(true, |d| event.doctor.as_ref() == Some(d))
    }
}

/// Audit log bound to one session; events are attributed to the session identity.
#[derive(Clone, Debug)]
pub struct AuditLog {
    cfg: Arc<CoreConfig>,
    store: GovernanceStore,
    session: SessionContext,
}

impl AuditLog {
    pub fn new(cfg: Arc<CoreConfig>, session: SessionContext) -> Self {
        Self {
            store: GovernanceStore::new(cfg.clone()),
            cfg,
            session,
        }
    }

    /// Stamp `event` with an id, timestamp, actor and hash, and write it.
    pub async fn append(&self, event: NewAuditEvent) -> PodResult<AuditEvent> {
        let mut stored = AuditEvent {
            id: UuidService::new(),
            timestamp: TimestampGenerator::now(),
            event_type: event.event_type,
            actor: self.session.web_id().clone(),
            patient: event.patient,
            doctor: event.doctor,
            scope: event.scope,
            grant_id: event.grant_id,
            ack_url: event.ack_url,
            terms_version: event.terms_version,
            terms_hash: event.terms_hash,
            hash: Sha256Hash::digest(b""),
            extra: BTreeMap::new(),
        };
        stored.hash = content_hash(&stored)?;

        let url = self.store.audit_event_url(&stored.id)?;
        self.session.client().put_json(&url, &stored).await?;
        tracing::info!(
            event_id = %stored.id,
            event_type = %stored.event_type,
            actor = %stored.actor,
            "audit event appended"
        );
        Ok(stored)
    }

    /// The most recent `limit` events, newest first.
    ///
    /// Members are fetched concurrently in batches. Members that fail to fetch or parse are
    /// skipped.
    pub async fn list(&self, limit: usize) -> PodResult<Vec<AuditEvent>> {
        self.list_filtered(&AuditFilter::default(), limit).await
    }

    pub async fn list_filtered(&self, filter: &AuditFilter, limit: usize) -> PodResult<Vec<AuditEvent>> {
        let client = self.session.client();
        let container = self.store.audit_events_url()?;
        let members: Vec<_> = client
            .list_container(&container)
            .await?
            .into_iter()
            .filter(|m| m.path().ends_with(".json"))
            .collect();

        let mut events = Vec::with_capacity(members.len());
        for batch in members.chunks(self.cfg.audit_batch_size()) {
            let fetched = join_all(batch.iter().map(|url| client.get_json::<AuditEvent>(url))).await;
            for (url, result) in batch.iter().zip(fetched) {
                match result {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {
                        tracing::debug!(url = %url, "audit member vanished while listing");
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "skipping unreadable audit event");
                    }
                }
            }
        }

        events.retain(|e| filter.matches(e));
        events.sort_by(|a, b| b.timestamp.to_string().cmp(&a.timestamp.to_string()));
        events.truncate(limit);
        Ok(events)
    }
}
