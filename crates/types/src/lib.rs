//! Validated primitives shared by the pod governance crates.
//!
//! - [`NonEmptyText`]: trimmed, non-empty strings
//! - [`WebId`]: an opaque identity URI for a principal
//! - [`Role`] and [`RoleTable`]: the closed set of actor classes and the static
//!   identity-to-role lookup built from configuration

use std::collections::BTreeMap;
use std::fmt;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// Errors raised when an identity URI is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebIdError {
    #[error("WebID cannot be empty")]
    Empty,
    #[error("WebID must be an http(s) URI, got: '{0}'")]
    NotHttp(String),
    #[error("WebID must not contain whitespace or angle brackets: '{0}'")]
    InvalidCharacters(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText`, returning [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Identity URI of a principal (patient, doctor, governance authority, ...).
///
/// No structure is assumed beyond string equality. Construction only rejects values that could
/// not be written into a Turtle IRI (`<...>`) safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WebId(String);

impl WebId {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, WebIdError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(WebIdError::Empty);
        }
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(WebIdError::NotHttp(trimmed.to_owned()));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c == '<' || c == '>' || c == '"')
        {
            return Err(WebIdError::InvalidCharacters(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WebId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for WebId {
    type Err = WebIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WebId::parse(s)
    }
}

impl serde::Serialize for WebId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for WebId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        WebId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The closed set of actor classes.
///
/// Deliberately *closed*: every match over a role is exhaustive, so adding an actor class forces
/// every policy decision to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    EmergencyContact,
    Pharmacy,
    Nurse,
    Governance,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Patient,
        Role::Doctor,
        Role::EmergencyContact,
        Role::Pharmacy,
        Role::Nurse,
        Role::Governance,
    ];

    /// Human-readable label.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Doctor => "Doctor",
            Role::EmergencyContact => "Emergency contact",
            Role::Pharmacy => "Pharmacy",
            Role::Nurse => "Nurse",
            Role::Governance => "Governance authority",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Static identity-to-role table, built once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    entries: BTreeMap<WebId, Role>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identity. A later assignment for the same identity replaces the earlier one.
    pub fn with(mut self, web_id: WebId, role: Role) -> Self {
        self.entries.insert(web_id, role);
        self
    }

    pub fn insert(&mut self, web_id: WebId, role: Role) {
        self.entries.insert(web_id, role);
    }

    pub fn role_of(&self, web_id: &WebId) -> Option<Role> {
        self.entries.get(web_id).copied()
    }

    /// All identities assigned to `role`, in stable (sorted) order.
    pub fn members(&self, role: Role) -> Vec<WebId> {
        self.entries
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every identity in the table except the governance authority.
    pub fn actors(&self) -> Vec<WebId> {
        self.entries
            .iter()
            .filter(|(_, r)| **r != Role::Governance)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WebId {
        WebId::parse(s).unwrap()
    }

    #[test]
    fn test_non_empty_text_trims() {
        let text = NonEmptyText::new("  hello ").unwrap();
        assert_eq!(text.as_str(), "hello");
        assert!(NonEmptyText::new("   ").is_err());
    }

    #[test]
    fn test_web_id_rejects_non_http() {
        assert_eq!(WebId::parse(""), Err(WebIdError::Empty));
        assert!(matches!(
            WebId::parse("mailto:someone@example.com"),
            Err(WebIdError::NotHttp(_))
        ));
        assert!(matches!(
            WebId::parse("https://pod.example/profile/card#me> ."),
            Err(WebIdError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_web_id_serde_round_trip_validates() {
        let parsed: WebId =
            serde_json::from_str("\"https://alice.pod.example/profile/card#me\"").unwrap();
        assert_eq!(parsed.as_str(), "https://alice.pod.example/profile/card#me");

        let bad: Result<WebId, _> = serde_json::from_str("\"not a uri\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_role_table_lookup_and_members() {
        let table = RoleTable::new()
            .with(id("https://alice.example/#me"), Role::Patient)
            .with(id("https://bob.example/#me"), Role::Doctor)
            .with(id("https://carol.example/#me"), Role::Patient)
            .with(id("https://gov.example/#me"), Role::Governance);

        assert_eq!(table.role_of(&id("https://bob.example/#me")), Some(Role::Doctor));
        assert_eq!(table.role_of(&id("https://nobody.example/#me")), None);
        assert_eq!(
            table.members(Role::Patient),
            vec![id("https://alice.example/#me"), id("https://carol.example/#me")]
        );
        assert_eq!(table.actors().len(), 3);
    }

    #[test]
    fn test_role_serialises_snake_case() {
        let json = serde_json::to_string(&Role::EmergencyContact).unwrap();
        assert_eq!(json, "\"emergency_contact\"");
    }
}
