//! # Pod Core
//!
//! Governance and access-control core for a multi-role health record front-end built on
//! per-user web storage ("pods").
//!
//! This crate contains:
//! - a resource client over an injected [`fetch::AuthenticatedFetch`] capability
//! - role-based Access-Control Documents for a patient's health container ([`access`])
//! - the governance store layout and bootstrap ([`governance`])
//! - the grant/acknowledge/revoke state machine ([`grants`]) and the doctor gate ([`gate`])
//! - an advisory, content-hashed audit log ([`audit`])
//! - health record and files resources ([`records`])
//! - the doctor view with its revocation poller ([`poller`])
//!
//! **No presentation or identity handshake concerns**: hosts authenticate however they like and
//! hand the core a fetch bound to the resulting identity. All state lives in remote storage.

pub mod access;
pub mod audit;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod governance;
pub mod grants;
pub mod memory;
pub mod poller;
pub mod records;
pub mod session;

pub use access::{AccessControlService, AccessGrants, AccessToggles, RoleGrants};
pub use audit::{AuditEvent, AuditEventType, AuditFilter, AuditLog, NewAuditEvent};
pub use client::{ContainerState, ResourceClient};
pub use config::{CoreConfig, TermsOfUse};
pub use error::{GateError, GateResult, PodError, PodResult};
pub use fetch::{AuthenticatedFetch, FetchError, FetchRequest, FetchResponse, ReqwestFetch};
pub use gate::{AckOutcome, Acknowledgement, DoctorGate, LegalNotice};
pub use governance::{BootstrapReport, GovernanceContainer, GovernanceStore};
pub use grants::{GrantKey, GrantService, GrantState, GrantStatus};
pub use memory::{MemoryFetch, MemoryPod};
pub use poller::{CancelFlag, DoctorView, PatientData, RevocationPoller};
pub use records::{FileDraft, FileEntry, FileKind, HealthRecord, PatientPod, RecordStore, SharingFlags};
pub use session::SessionContext;
