//! Constants used throughout the pod core crate.
//!
//! Relative paths under the governance root and the patient's pod, default tunables, and the
//! built-in terms of use.

/// Container for legal notices.
pub const NOTICES_DIR: &str = "notices/";

/// Versioned terms documents: `notices/terms/<version>.txt`.
pub const TERMS_DIR: &str = "notices/terms/";

/// Container for grant bookkeeping.
pub const GRANTS_DIR: &str = "grants/";

/// Grant state records: `grants/state/<key>.json`.
pub const GRANT_STATE_DIR: &str = "grants/state/";

/// Acknowledgement records: `grants/acks/<key>-<grantId>.json`.
pub const GRANT_ACKS_DIR: &str = "grants/acks/";

/// Container for audit data.
pub const AUDIT_DIR: &str = "audit/";

/// Audit events: `audit/events/<eventId>.json`.
pub const AUDIT_EVENTS_DIR: &str = "audit/events/";

/// Default location of the health container relative to a pod root.
pub const DEFAULT_HEALTH_PATH: &str = "health/";

/// Full health record document inside the health container.
pub const RECORD_FILENAME: &str = "record.json";

/// Structured files listing inside the health container.
pub const FILES_FILENAME: &str = "files.json";

/// Suffix appended to a resource URL to locate its access-control document.
pub const DEFAULT_ACD_SUFFIX: &str = ".acl";

/// Number of hex characters of the grant key digest.
pub const DEFAULT_GRANT_KEY_LEN: usize = 32;

/// Audit members fetched concurrently per batch.
pub const DEFAULT_AUDIT_BATCH_SIZE: usize = 15;

/// Seconds between revocation checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Body written when creating a container.
pub const CONTAINER_BODY: &str =
    "@prefix ldp: <http://www.w3.org/ns/ldp#>.\n<> a ldp:Container, ldp:BasicContainer.\n";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TURTLE: &str = "text/turtle";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Version label of the built-in terms of use.
pub const DEFAULT_TERMS_VERSION: &str = "v1";

/// Built-in terms of use shown to a doctor before the first read under a grant.
pub const DEFAULT_TERMS_TEXT: &str = "\
LEGAL NOTICE: ACCESS TO PATIENT HEALTH INFORMATION

You have been granted access to a patient's health record by the patient.

1. Access is limited to the purpose of providing care to this patient.
2. You must not copy, export or disclose the record to any third party
   except as required by law.
3. Every grant, acknowledgement, revocation and blocked read is recorded
   in an audit log kept by the governance authority.
4. The patient may revoke access at any time. Locally displayed data is
   cleared when revocation is detected.

By continuing you confirm that you have read and accept these terms.
";
