//! Access-control wire/boundary support for pod resources.
//!
//! This crate provides **wire models** and **format helpers** for the documents a pod server
//! exchanges alongside resources:
//! - capability-based Access-Control Documents (ACDs) rendered as Turtle
//! - container listings (Turtle `ldp:contains` or JSON-LD)
//!
//! Only the vocabulary the governance core actually uses is modeled. Documents are rendered, not
//! parsed: reading an ACD back is a substring test for deterministic block identifiers (see
//! [`roles::detect_role_blocks`]), which tolerates any formatting a server may apply but is a
//! heuristic, not a policy evaluator.

pub mod document;
pub mod listing;
pub mod roles;

// Re-export facades
pub use document::AccessControl;
pub use listing::ContainerListing;

// Re-export public domain-level types
pub use document::{
    AccessBlock, AccessControlDocument, AccessMode, AccessTarget, Matcher, MatcherMode, NodeId,
};
pub use roles::{DetectedRoleBlocks, RoleDocument, RoleGrant, SharedRole, OWNER_BLOCK_ID};

/// Errors returned by the `acp` boundary crate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AcpError {
    #[error("invalid node identifier: '{0}'")]
    InvalidNodeId(String),

    #[error("invalid IRI: '{0}'")]
    InvalidIri(String),

    #[error("access block '{0}' has no agents")]
    EmptyMatcher(String),

    #[error("access block '{0}' grants no access modes")]
    EmptyModes(String),

    #[error("access-control document has no targets")]
    NoTargets,

    #[error("duplicate node identifier: '{0}'")]
    DuplicateNodeId(String),

    #[error("invalid container listing: {0}")]
    InvalidListing(String),
}

/// Type alias for Results that can fail with an [`AcpError`].
pub type AcpResult<T> = Result<T, AcpError>;

/// Checks that `iri` can be written between angle brackets in Turtle.
pub(crate) fn validate_iri(iri: &str) -> AcpResult<()> {
    let bad = iri.is_empty()
        || iri
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`'));
    if bad {
        return Err(AcpError::InvalidIri(iri.to_owned()));
    }
    Ok(())
}
