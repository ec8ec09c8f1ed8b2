//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as
//! `Arc<CoreConfig>`. Core code never reads process-wide environment variables while handling an
//! operation; [`from_env`] exists for host applications and runs exactly once, before any
//! service is constructed.

use crate::constants::{
    DEFAULT_ACD_SUFFIX, DEFAULT_AUDIT_BATCH_SIZE, DEFAULT_GRANT_KEY_LEN, DEFAULT_HEALTH_PATH,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TERMS_TEXT, DEFAULT_TERMS_VERSION, FILES_FILENAME,
    RECORD_FILENAME,
};
use crate::{PodError, PodResult};
use acp::MatcherMode;
use pod_types::{NonEmptyText, Role, RoleTable, WebId};
use pod_uuid::Sha256Hash;
use std::time::Duration;
use url::Url;

/// Allowed hex lengths for grant keys.
const GRANT_KEY_LEN_RANGE: std::ops::RangeInclusive<usize> = 8..=64;

/// The terms a doctor must acknowledge before reading under a grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermsOfUse {
    version: String,
    text: String,
    hash: Sha256Hash,
}

impl TermsOfUse {
    pub fn new(version: &str, text: impl Into<String>) -> PodResult<Self> {
        let version = NonEmptyText::new(version)
            .map_err(|_| PodError::InvalidInput("terms version cannot be empty".into()))?
            .as_str()
            .to_owned();
        if version.contains(['/', '\\', '?', '#']) {
            return Err(PodError::InvalidInput(format!(
                "terms version '{}' cannot be used in a resource path",
                version
            )));
        }
        let text = text.into();
        let hash = Sha256Hash::digest(text.as_bytes());
        Ok(Self {
            version,
            text,
            hash,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the text.
    pub fn hash(&self) -> &Sha256Hash {
        &self.hash
    }
}

impl Default for TermsOfUse {
    fn default() -> Self {
        Self {
            version: DEFAULT_TERMS_VERSION.to_owned(),
            text: DEFAULT_TERMS_TEXT.to_owned(),
            hash: Sha256Hash::digest(DEFAULT_TERMS_TEXT.as_bytes()),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    governance_root: Url,
    governance_owner: WebId,
    roles: RoleTable,
    matcher_mode: MatcherMode,
    terms: TermsOfUse,
    health_path: String,
    record_filename: String,
    files_filename: String,
    acd_suffix: String,
    grant_key_len: usize,
    audit_batch_size: usize,
    poll_interval: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig` with default tunables.
    ///
    /// `governance_root` must be an absolute http(s) URL ending in `/`. The governance owner is
    /// added to `roles` as [`Role::Governance`].
    pub fn new(
        governance_root: &str,
        governance_owner: WebId,
        mut roles: RoleTable,
        matcher_mode: MatcherMode,
    ) -> PodResult<Self> {
        let governance_root = parse_container_url(governance_root)?;
        roles.insert(governance_owner.clone(), Role::Governance);

        Ok(Self {
            governance_root,
            governance_owner,
            roles,
            matcher_mode,
            terms: TermsOfUse::default(),
            health_path: DEFAULT_HEALTH_PATH.to_owned(),
            record_filename: RECORD_FILENAME.to_owned(),
            files_filename: FILES_FILENAME.to_owned(),
            acd_suffix: DEFAULT_ACD_SUFFIX.to_owned(),
            grant_key_len: DEFAULT_GRANT_KEY_LEN,
            audit_batch_size: DEFAULT_AUDIT_BATCH_SIZE,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        })
    }

    pub fn with_terms(mut self, terms: TermsOfUse) -> Self {
        self.terms = terms;
        self
    }

    /// Health container path relative to a pod root, for example `health/`.
    pub fn with_health_path(mut self, health_path: &str) -> PodResult<Self> {
        let trimmed = health_path.trim();
        if trimmed.is_empty() || trimmed.starts_with('/') || !trimmed.ends_with('/') {
            return Err(PodError::InvalidInput(format!(
                "health path must be relative and end with '/': '{health_path}'"
            )));
        }
        self.health_path = trimmed.to_owned();
        Ok(self)
    }

    pub fn with_acd_suffix(mut self, suffix: &str) -> PodResult<Self> {
        if suffix.is_empty() || suffix.contains('/') {
            return Err(PodError::InvalidInput(format!(
                "invalid access-control suffix: '{suffix}'"
            )));
        }
        self.acd_suffix = suffix.to_owned();
        Ok(self)
    }

    pub fn with_grant_key_len(mut self, len: usize) -> PodResult<Self> {
        if !GRANT_KEY_LEN_RANGE.contains(&len) {
            return Err(PodError::InvalidInput(format!(
                "grant key length must be between {} and {}, got {len}",
                GRANT_KEY_LEN_RANGE.start(),
                GRANT_KEY_LEN_RANGE.end()
            )));
        }
        self.grant_key_len = len;
        Ok(self)
    }

    pub fn with_audit_batch_size(mut self, size: usize) -> PodResult<Self> {
        if size == 0 {
            return Err(PodError::InvalidInput(
                "audit batch size must be greater than zero".into(),
            ));
        }
        self.audit_batch_size = size;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> PodResult<Self> {
        if interval.is_zero() {
            return Err(PodError::InvalidInput(
                "poll interval must be greater than zero".into(),
            ));
        }
        self.poll_interval = interval;
        Ok(self)
    }

    pub fn governance_root(&self) -> &Url {
        &self.governance_root
    }

    pub fn governance_owner(&self) -> &WebId {
        &self.governance_owner
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn matcher_mode(&self) -> &MatcherMode {
        &self.matcher_mode
    }

    pub fn terms(&self) -> &TermsOfUse {
        &self.terms
    }

    pub fn health_path(&self) -> &str {
        &self.health_path
    }

    pub fn record_filename(&self) -> &str {
        &self.record_filename
    }

    pub fn files_filename(&self) -> &str {
        &self.files_filename
    }

    pub fn acd_suffix(&self) -> &str {
        &self.acd_suffix
    }

    pub fn grant_key_len(&self) -> usize {
        self.grant_key_len
    }

    pub fn audit_batch_size(&self) -> usize {
        self.audit_batch_size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolve `relative` against the governance root.
    pub fn governance_url(&self, relative: &str) -> PodResult<Url> {
        self.governance_root
            .join(relative)
            .map_err(|e| PodError::InvalidUrl {
                url: format!("{}{relative}", self.governance_root),
                reason: e.to_string(),
            })
    }

    /// Location of the access-control document for `resource`.
    pub fn acd_url(&self, resource: &Url) -> PodResult<Url> {
        let raw = format!("{resource}{}", self.acd_suffix);
        Url::parse(&raw).map_err(|e| PodError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }
}

/// Parse an absolute http(s) URL that names a container (ends with `/`).
pub fn parse_container_url(raw: &str) -> PodResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| PodError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PodError::InvalidUrl {
            url: raw.to_owned(),
            reason: "scheme must be http or https".into(),
        });
    }
    if !url.path().ends_with('/') {
        return Err(PodError::InvalidUrl {
            url: raw.to_owned(),
            reason: "container URL must end with '/'".into(),
        });
    }
    Ok(url)
}

/// Parse a role table from `role=webid` pairs separated by commas or whitespace.
///
/// Role names are the snake_case forms (`patient`, `doctor`, `emergency_contact`, `pharmacy`,
/// `nurse`, `governance`). `None` or an empty value yields an empty table.
pub fn roles_from_env_value(value: Option<String>) -> PodResult<RoleTable> {
    let mut roles = RoleTable::new();
    let Some(value) = value else {
        return Ok(roles);
    };

    for entry in value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|e| !e.is_empty())
    {
        let (role, web_id) = entry.split_once('=').ok_or_else(|| {
            PodError::InvalidInput(format!("role entry must be 'role=webid': '{entry}'"))
        })?;
        let role = role_from_name(role)?;
        let web_id = WebId::parse(web_id)
            .map_err(|e| PodError::InvalidInput(format!("invalid WebID '{web_id}': {e}")))?;
        roles.insert(web_id, role);
    }
    Ok(roles)
}

fn role_from_name(name: &str) -> PodResult<Role> {
    serde_json::from_value(serde_json::Value::String(name.to_owned()))
        .map_err(|_| PodError::InvalidInput(format!("unknown role: '{name}'")))
}

/// Resolve the matcher mode from `POD_MATCHER_MODE`, `POD_CLIENT_ID` and `POD_ISSUER` values.
///
/// `open` selects [`MatcherMode::Open`]. Anything else (or nothing) selects the restricted
/// mode, which needs both a client id and an issuer.
pub fn matcher_mode_from_env_values(
    mode: Option<String>,
    client_id: Option<String>,
    issuer: Option<String>,
) -> PodResult<MatcherMode> {
    let mode = mode.map(|m| m.trim().to_ascii_lowercase());
    match mode.as_deref() {
        Some("open") => Ok(MatcherMode::Open),
        None | Some("") | Some("restricted") => match (non_empty(client_id), non_empty(issuer)) {
            (Some(client_id), Some(issuer)) => Ok(MatcherMode::restricted(client_id, issuer)?),
            _ => Err(PodError::InvalidInput(
                "POD_CLIENT_ID and POD_ISSUER are required unless POD_MATCHER_MODE=open".into(),
            )),
        },
        Some(other) => Err(PodError::InvalidInput(format!(
            "unknown matcher mode: '{other}'"
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number_from_env_value<T: std::str::FromStr>(name: &str, value: Option<String>) -> PodResult<Option<T>> {
    non_empty(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| PodError::InvalidInput(format!("{name} must be a number, got '{v}'")))
        })
        .transpose()
}

/// Build a [`CoreConfig`] from `POD_*` values supplied by `lookup`.
///
/// | Variable | Default |
/// |---|---|
/// | `POD_GOVERNANCE_ROOT` | required |
/// | `POD_GOVERNANCE_OWNER` | required |
/// | `POD_ROLES` | empty table |
/// | `POD_MATCHER_MODE`, `POD_CLIENT_ID`, `POD_ISSUER` | restricted (client id and issuer required) |
/// | `POD_TERMS_VERSION` + `POD_TERMS_FILE` | built-in terms |
/// | `POD_HEALTH_PATH` | `health/` |
/// | `POD_ACD_SUFFIX` | `.acl` |
/// | `POD_GRANT_KEY_LEN` | 32 |
/// | `POD_AUDIT_BATCH_SIZE` | 15 |
/// | `POD_POLL_INTERVAL_SECS` | 10 |
pub fn from_env_values(lookup: impl Fn(&str) -> Option<String>) -> PodResult<CoreConfig> {
    let root = non_empty(lookup("POD_GOVERNANCE_ROOT"))
        .ok_or_else(|| PodError::InvalidInput("POD_GOVERNANCE_ROOT is required".into()))?;
    let owner = non_empty(lookup("POD_GOVERNANCE_OWNER"))
        .ok_or_else(|| PodError::InvalidInput("POD_GOVERNANCE_OWNER is required".into()))?;
    let owner = WebId::parse(&owner)
        .map_err(|e| PodError::InvalidInput(format!("invalid POD_GOVERNANCE_OWNER: {e}")))?;

    let roles = roles_from_env_value(lookup("POD_ROLES"))?;
    let matcher_mode = matcher_mode_from_env_values(
        lookup("POD_MATCHER_MODE"),
        lookup("POD_CLIENT_ID"),
        lookup("POD_ISSUER"),
    )?;

    let mut cfg = CoreConfig::new(&root, owner, roles, matcher_mode)?;

    match (
        non_empty(lookup("POD_TERMS_VERSION")),
        non_empty(lookup("POD_TERMS_FILE")),
    ) {
        (None, None) => {}
        (Some(version), Some(path)) => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                PodError::InvalidInput(format!("failed to read POD_TERMS_FILE '{path}': {e}"))
            })?;
            cfg = cfg.with_terms(TermsOfUse::new(&version, text)?);
        }
        _ => {
            return Err(PodError::InvalidInput(
                "POD_TERMS_VERSION and POD_TERMS_FILE must be set together".into(),
            ))
        }
    }

    if let Some(path) = non_empty(lookup("POD_HEALTH_PATH")) {
        cfg = cfg.with_health_path(&path)?;
    }
    if let Some(suffix) = non_empty(lookup("POD_ACD_SUFFIX")) {
        cfg = cfg.with_acd_suffix(&suffix)?;
    }
    if let Some(len) = number_from_env_value("POD_GRANT_KEY_LEN", lookup("POD_GRANT_KEY_LEN"))? {
        cfg = cfg.with_grant_key_len(len)?;
    }
    if let Some(size) =
        number_from_env_value("POD_AUDIT_BATCH_SIZE", lookup("POD_AUDIT_BATCH_SIZE"))?
    {
        cfg = cfg.with_audit_batch_size(size)?;
    }
    if let Some(secs) =
        number_from_env_value::<u64>("POD_POLL_INTERVAL_SECS", lookup("POD_POLL_INTERVAL_SECS"))?
    {
        cfg = cfg.with_poll_interval(Duration::from_secs(secs))?;
    }

    Ok(cfg)
}

/// Load `.env` (if present) and build a [`CoreConfig`] from the process environment.
///
/// Call once at startup.
pub fn from_env() -> PodResult<CoreConfig> {
    let _ = dotenvy::dotenv();
    from_env_values(|name| std::env::var(name).ok())
}
