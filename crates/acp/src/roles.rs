//! Role-based Access-Control Documents for a patient's health container.
//!
//! The permission set of each role is a policy constant, not something callers choose:
//!
//! | Block | Modes |
//! |---|---|
//! | `#ownerAccess` | Read, Write, Append, Control |
//! | `#doctorAccess` | Read, Write |
//! | `#emergencyAccess` | Read |
//! | `#pharmacyAccess` | Read |
//! | `#nurseAccess` | Read, Write |
//!
//! ACDs are not inherited by sibling resources with different names, so the document declares
//! the same block set for three targets: the container, the files listing and the full record.

use crate::document::{
    AccessBlock, AccessControl, AccessControlDocument, AccessMode, AccessTarget, Matcher,
    MatcherMode,
};
use crate::AcpResult;
use pod_types::{Role, WebId};

/// Block identifier of the owner's full-control block.
pub const OWNER_BLOCK_ID: &str = "#ownerAccess";

const OWNER_STEM: &str = "owner";

/// Roles the owner may share a health container with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharedRole {
    Doctor,
    Emergency,
    Pharmacy,
    Nurse,
}

impl SharedRole {
    pub const ALL: [SharedRole; 4] = [
        SharedRole::Doctor,
        SharedRole::Emergency,
        SharedRole::Pharmacy,
        SharedRole::Nurse,
    ];

    fn stem(&self) -> &'static str {
        match self {
            SharedRole::Doctor => "doctor",
            SharedRole::Emergency => "emergency",
            SharedRole::Pharmacy => "pharmacy",
            SharedRole::Nurse => "nurse",
        }
    }

    /// The fragment that identifies this role's block in a rendered document.
    pub fn block_id(&self) -> &'static str {
        match self {
            SharedRole::Doctor => "#doctorAccess",
            SharedRole::Emergency => "#emergencyAccess",
            SharedRole::Pharmacy => "#pharmacyAccess",
            SharedRole::Nurse => "#nurseAccess",
        }
    }

    pub fn modes(&self) -> &'static [AccessMode] {
        match self {
            SharedRole::Doctor | SharedRole::Nurse => &[AccessMode::Read, AccessMode::Write],
            SharedRole::Emergency | SharedRole::Pharmacy => &[AccessMode::Read],
        }
    }

    /// The actor class whose identities receive this block.
    pub fn role(&self) -> Role {
        match self {
            SharedRole::Doctor => Role::Doctor,
            SharedRole::Emergency => Role::EmergencyContact,
            SharedRole::Pharmacy => Role::Pharmacy,
            SharedRole::Nurse => Role::Nurse,
        }
    }
}

/// A role block to include, with the identities it names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: SharedRole,
    pub agents: Vec<WebId>,
}

/// Locations protected by a role document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleDocument {
    pub container: String,
    pub files: String,
    pub record: String,
}

impl RoleDocument {
    /// Build and render the document for `owner` plus every grant in `grants`.
    ///
    /// Grants with no agents are skipped: a block nobody can match would only make read-back
    /// report access that does not exist.
    pub fn build(
        &self,
        owner: &WebId,
        grants: &[RoleGrant],
        mode: &MatcherMode,
    ) -> AcpResult<String> {
        let targets = vec![
            AccessTarget::new("root", self.container.as_str())?,
            AccessTarget::new("filesRoot", self.files.as_str())?,
            AccessTarget::new("recordRoot", self.record.as_str())?,
        ];

        let mut blocks = vec![AccessBlock::new(
            OWNER_STEM,
            &AccessMode::FULL,
            Matcher::new(vec![owner.clone()], mode.clone()),
        )?];

        for role in SharedRole::ALL {
            let agents: Vec<WebId> = grants
                .iter()
                .filter(|g| g.role == role)
                .flat_map(|g| g.agents.iter().cloned())
                .collect();
            if agents.is_empty() {
                continue;
            }
            blocks.push(AccessBlock::new(
                role.stem(),
                role.modes(),
                Matcher::new(agents, mode.clone()),
            )?);
        }

        let document = AccessControlDocument::new(targets, blocks)?;
        Ok(AccessControl::render(&document))
    }
}

/// Which role blocks a document text mentions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectedRoleBlocks {
    pub doctor: bool,
    pub emergency: bool,
    pub pharmacy: bool,
    pub nurse: bool,
}

/// Substring read-back of a role document.
///
/// This intentionally does not parse Turtle: it reports a role as present when its block
/// identifier occurs anywhere in `text`, so documents reformatted by a server still read back.
pub fn detect_role_blocks(text: &str) -> DetectedRoleBlocks {
    DetectedRoleBlocks {
        doctor: text.contains(SharedRole::Doctor.block_id()),
        emergency: text.contains(SharedRole::Emergency.block_id()),
        pharmacy: text.contains(SharedRole::Pharmacy.block_id()),
        nurse: text.contains(SharedRole::Nurse.block_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WebId {
        WebId::parse(s).unwrap()
    }

    fn locations() -> RoleDocument {
        RoleDocument {
            container: "https://alice.example/health/".into(),
            files: "https://alice.example/health/files.json".into(),
            record: "https://alice.example/health/record.json".into(),
        }
    }

    #[test]
    fn test_doctor_granted_emergency_not() {
        let grants = vec![RoleGrant {
            role: SharedRole::Doctor,
            agents: vec![id("https://dr.example/profile/card#me")],
        }];
        let text = locations()
            .build(
                &id("https://alice.example/profile/card#me"),
                &grants,
                &MatcherMode::Open,
            )
            .unwrap();

        assert!(text.contains(SharedRole::Doctor.block_id()));
        assert!(!text.contains(SharedRole::Emergency.block_id()));
        assert_eq!(text.matches(OWNER_BLOCK_ID).count(), 4);

        let detected = detect_role_blocks(&text);
        assert!(detected.doctor);
        assert!(!detected.emergency);
        assert!(!detected.pharmacy);
        assert!(!detected.nurse);
    }

    #[test]
    fn test_all_three_targets_declared() {
        let text = locations()
            .build(&id("https://alice.example/#me"), &[], &MatcherMode::Open)
            .unwrap();

        assert!(text.contains("acp:resource <https://alice.example/health/>;"));
        assert!(text.contains("acp:resource <https://alice.example/health/files.json>;"));
        assert!(text.contains("acp:resource <https://alice.example/health/record.json>;"));
        assert_eq!(text.matches("a acp:AccessControlResource;").count(), 3);
    }

    #[test]
    fn test_grant_without_agents_is_skipped() {
        let grants = vec![RoleGrant {
            role: SharedRole::Emergency,
            agents: vec![],
        }];
        let text = locations()
            .build(&id("https://alice.example/#me"), &grants, &MatcherMode::Open)
            .unwrap();
        assert!(!detect_role_blocks(&text).emergency);
    }

    #[test]
    fn test_role_permission_constants() {
        assert_eq!(
            SharedRole::Doctor.modes(),
            &[AccessMode::Read, AccessMode::Write]
        );
        assert_eq!(SharedRole::Emergency.modes(), &[AccessMode::Read]);
        assert_eq!(SharedRole::Pharmacy.modes(), &[AccessMode::Read]);
        assert_eq!(SharedRole::Nurse.modes(), &[AccessMode::Read, AccessMode::Write]);
        assert_eq!(SharedRole::Emergency.role(), Role::EmergencyContact);
    }

    #[test]
    fn test_restricted_mode_applies_to_every_block() {
        let mode =
            MatcherMode::restricted("https://app.example/id", "https://idp.example").unwrap();
        let grants = vec![
            RoleGrant {
                role: SharedRole::Doctor,
                agents: vec![id("https://dr.example/#me")],
            },
            RoleGrant {
                role: SharedRole::Nurse,
                agents: vec![id("https://nurse.example/#me")],
            },
        ];
        let text = locations()
            .build(&id("https://alice.example/#me"), &grants, &mode)
            .unwrap();
        assert_eq!(text.matches("acp:client <https://app.example/id>;").count(), 3);
        assert_eq!(text.matches("acp:issuer <https://idp.example>.").count(), 3);
    }

    #[test]
    fn test_detect_tolerates_reformatting() {
        let reformatted = "@prefix acp: <http://www.w3.org/ns/solid/acp#> .\n\
             <https://alice.example/health/.acl#doctorAccess> a acp:AccessControl .";
        let detected = detect_role_blocks(reformatted);
        assert!(detected.doctor);
        assert!(!detected.nurse);
    }
}
