//! Access-Control Document model and Turtle rendering.
//!
//! A document is a set of targets (one `acp:AccessControlResource` root per protected resource)
//! that all reference the same list of access blocks. Each block renders as three nodes that share
//! its identifier stem:
//!
//! ```text
//! <#doctorAccess>   a acp:AccessControl; acp:apply <#doctorPolicy>.
//! <#doctorPolicy>   a acp:Policy; acp:allow acl:Read, acl:Write; acp:allOf <#doctorMatcher>.
//! <#doctorMatcher>  a acp:Matcher; acp:agent <...>; acp:client <...>; acp:issuer <...>.
//! ```
//!
//! Effective permission for an identity is the union of the allow-sets of every block whose
//! matcher includes it. Within a matcher the agents are alternatives, while the client and issuer
//! constraints (restricted mode) must all hold as well.

use crate::{validate_iri, AcpError, AcpResult};
use pod_types::WebId;
use std::collections::HashSet;

const ACP_PREFIX: &str = "http://www.w3.org/ns/solid/acp#";
const ACL_PREFIX: &str = "http://www.w3.org/ns/auth/acl#";

/// Local fragment identifier of a node inside a document (`#<id>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Accepts ASCII letters, digits, `-` and `_`.
    pub fn new(id: impl Into<String>) -> AcpResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(AcpError::InvalidNodeId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<#id>`
    pub fn reference(&self) -> String {
        format!("<#{}>", self.0)
    }
}

/// Permissions a policy may allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessMode {
    Read,
    Write,
    Append,
    Control,
}

impl AccessMode {
    pub const FULL: [AccessMode; 4] = [
        AccessMode::Read,
        AccessMode::Write,
        AccessMode::Append,
        AccessMode::Control,
    ];

    fn turtle(&self) -> &'static str {
        match self {
            AccessMode::Read => "acl:Read",
            AccessMode::Write => "acl:Write",
            AccessMode::Append => "acl:Append",
            AccessMode::Control => "acl:Control",
        }
    }
}

/// How matchers identify a permitted caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatcherMode {
    /// The bare identity is enough. Interoperability escape hatch.
    Open,
    /// The identity must also present a credential issued by `issuer` to the application
    /// `client_id`, so a bearer credential minted for another application cannot be replayed.
    Restricted { client_id: String, issuer: String },
}

impl MatcherMode {
    pub fn restricted(client_id: impl Into<String>, issuer: impl Into<String>) -> AcpResult<Self> {
        let client_id = client_id.into();
        let issuer = issuer.into();
        validate_iri(&client_id)?;
        validate_iri(&issuer)?;
        Ok(Self::Restricted { client_id, issuer })
    }
}

/// The set of callers a policy applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matcher {
    agents: Vec<WebId>,
    mode: MatcherMode,
}

impl Matcher {
    pub fn new(agents: Vec<WebId>, mode: MatcherMode) -> Self {
        let mut seen = HashSet::new();
        let agents = agents
            .into_iter()
            .filter(|a| seen.insert(a.clone()))
            .collect();
        Self { agents, mode }
    }

    pub fn agents(&self) -> &[WebId] {
        &self.agents
    }

    pub fn mode(&self) -> &MatcherMode {
        &self.mode
    }
}

/// One access control block: identifier, allow-set and matcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessBlock {
    stem: String,
    id: NodeId,
    modes: Vec<AccessMode>,
    matcher: Matcher,
}

impl AccessBlock {
    /// Creates a block named `<id>Access`, with `<id>Policy` and `<id>Matcher` companions.
    pub fn new(stem: &str, modes: &[AccessMode], matcher: Matcher) -> AcpResult<Self> {
        let id = NodeId::new(format!("{stem}Access"))?;
        if matcher.agents.is_empty() {
            return Err(AcpError::EmptyMatcher(id.0));
        }
        if modes.is_empty() {
            return Err(AcpError::EmptyModes(id.0));
        }
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();
        Ok(Self {
            stem: stem.to_owned(),
            id,
            modes,
            matcher,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn modes(&self) -> &[AccessMode] {
        &self.modes
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn stem(&self) -> &str {
        &self.stem
    }

    pub fn allows(&self, agent: &WebId, mode: AccessMode) -> bool {
        self.modes.contains(&mode) && self.matcher.agents.contains(agent)
    }
}

/// A resource protected by the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTarget {
    id: NodeId,
    resource: String,
    members: bool,
}

impl AccessTarget {
    pub fn new(id: &str, resource: impl Into<String>) -> AcpResult<Self> {
        let resource = resource.into();
        validate_iri(&resource)?;
        Ok(Self {
            id: NodeId::new(id)?,
            resource,
            members: false,
        })
    }

    /// Also apply the blocks to resources contained in this (container) target.
    pub fn with_members(mut self) -> Self {
        self.members = true;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn applies_to_members(&self) -> bool {
        self.members
    }
}

/// A complete Access-Control Document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessControlDocument {
    targets: Vec<AccessTarget>,
    blocks: Vec<AccessBlock>,
}

impl AccessControlDocument {
    pub fn new(targets: Vec<AccessTarget>, blocks: Vec<AccessBlock>) -> AcpResult<Self> {
        if targets.is_empty() {
            return Err(AcpError::NoTargets);
        }

        let mut seen = HashSet::new();
        let target_ids = targets.iter().map(|t| t.id.as_str().to_owned());
        let block_ids = blocks.iter().flat_map(|b| {
            let stem = b.stem();
            [
                b.id.as_str().to_owned(),
                format!("{stem}Policy"),
                format!("{stem}Matcher"),
            ]
        });
        for id in target_ids.chain(block_ids) {
            if !seen.insert(id.clone()) {
                return Err(AcpError::DuplicateNodeId(id));
            }
        }

        Ok(Self { targets, blocks })
    }

    pub fn targets(&self) -> &[AccessTarget] {
        &self.targets
    }

    pub fn blocks(&self) -> &[AccessBlock] {
        &self.blocks
    }

    /// Union of all blocks whose matcher includes `agent`.
    ///
    /// This evaluates the in-memory model; client/issuer constraints are assumed satisfied.
    pub fn effective_modes(&self, agent: &WebId) -> Vec<AccessMode> {
        let mut modes: Vec<AccessMode> = self
            .blocks
            .iter()
            .filter(|b| b.matcher.agents.contains(agent))
            .flat_map(|b| b.modes.iter().copied())
            .collect();
        modes.sort();
        modes.dedup();
        modes
    }
}

/// Access-Control Document operations.
///
/// This is a zero-sized type used for namespacing rendering operations.
pub struct AccessControl;

impl AccessControl {
    /// Render `document` as Turtle text.
    ///
    /// Output is deterministic: targets and blocks appear in insertion order.
    pub fn render(document: &AccessControlDocument) -> String {
        let mut out = String::new();
        out.push_str(&format!("@prefix acp: <{ACP_PREFIX}>.\n"));
        out.push_str(&format!("@prefix acl: <{ACL_PREFIX}>.\n"));

        let controls = document
            .blocks
            .iter()
            .map(|b| b.id.reference())
            .collect::<Vec<_>>()
            .join(", ");

        for target in &document.targets {
            out.push('\n');
            out.push_str(&target.id.reference());
            out.push('\n');
            out.push_str("    a acp:AccessControlResource;\n");
            if controls.is_empty() {
                out.push_str(&format!("    acp:resource <{}>.\n", target.resource));
            } else {
                out.push_str(&format!("    acp:resource <{}>;\n", target.resource));
                if target.members {
                    out.push_str(&format!("    acp:accessControl {controls};\n"));
                    out.push_str(&format!("    acp:memberAccessControl {controls}.\n"));
                } else {
                    out.push_str(&format!("    acp:accessControl {controls}.\n"));
                }
            }
        }

        for block in &document.blocks {
            out.push_str(&render_block(block));
        }

        out
    }
}

fn render_block(block: &AccessBlock) -> String {
    let stem = block.stem();
    let modes = block
        .modes
        .iter()
        .map(AccessMode::turtle)
        .collect::<Vec<_>>()
        .join(", ");
    let agents = block
        .matcher
        .agents
        .iter()
        .map(|a| format!("<{a}>"))
        .collect::<Vec<_>>()
        .join(", ");

    let matcher = match &block.matcher.mode {
        MatcherMode::Open => format!("    acp:agent {agents}.\n"),
        MatcherMode::Restricted { client_id, issuer } => format!(
            "    acp:agent {agents};\n    acp:client <{client_id}>;\n    acp:issuer <{issuer}>.\n"
        ),
    };

    format!(
        "\n{id}\n    a acp:AccessControl;\n    acp:apply <#{stem}Policy>.\n\
         \n<#{stem}Policy>\n    a acp:Policy;\n    acp:allow {modes};\n    acp:allOf <#{stem}Matcher>.\n\
         \n<#{stem}Matcher>\n    a acp:Matcher;\n{matcher}",
        id = block.id.reference(),
    )
}
