//! Container listing parsing.
//!
//! A pod server's container representation is content-negotiated, so member references may
//! arrive as Turtle (`ldp:contains <a>, <b>.`) or as JSON-LD (`"ldp:contains": [{"@id": "a"}]`).
//! Both are reduced to the list of member IRIs exactly as written (relative or absolute);
//! resolving them against the container URL is the caller's job.

use crate::{AcpError, AcpResult};
use serde_json::Value;

const CONTAINS_TURTLE: [&str; 2] = ["ldp:contains", "<http://www.w3.org/ns/ldp#contains>"];
const CONTAINS_JSON: [&str; 3] = ["ldp:contains", "contains", "http://www.w3.org/ns/ldp#contains"];

/// Container listing operations.
pub struct ContainerListing;

impl ContainerListing {
    /// Extract member IRIs from a listing body.
    ///
    /// `content_type` selects the parser: anything mentioning `json` is read as JSON-LD, everything
    /// else as Turtle. Duplicates are removed, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`AcpError::InvalidListing`] only when a JSON listing is not valid JSON. Turtle
    /// listings without any `ldp:contains` simply yield no members.
    pub fn parse(body: &str, content_type: Option<&str>) -> AcpResult<Vec<String>> {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        let members = if is_json {
            let value: Value = serde_json::from_str(body)
                .map_err(|e| AcpError::InvalidListing(e.to_string()))?;
            let mut members = Vec::new();
            collect_json_members(&value, &mut members);
            members
        } else {
            parse_turtle_members(body)
        };

        let mut seen = std::collections::HashSet::new();
        Ok(members
            .into_iter()
            .filter(|m| seen.insert(m.clone()))
            .collect())
    }
}

fn parse_turtle_members(body: &str) -> Vec<String> {
    let mut members = Vec::new();
    for predicate in CONTAINS_TURTLE {
        let mut rest = body;
        while let Some(pos) = rest.find(predicate) {
            rest = &rest[pos + predicate.len()..];
            rest = read_object_list(rest, &mut members);
        }
    }
    members
}

/// Reads `<iri>, <iri>, ...` and returns the unread remainder.
fn read_object_list<'a>(mut rest: &'a str, members: &mut Vec<String>) -> &'a str {
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
            continue;
        }
        let Some(after_open) = rest.strip_prefix('<') else {
            return rest;
        };
        let Some(close) = after_open.find('>') else {
            return after_open;
        };
        let iri = &after_open[..close];
        if !iri.is_empty() {
            members.push(iri.to_owned());
        }
        rest = &after_open[close + 1..];
    }
}

fn collect_json_members(value: &Value, members: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if CONTAINS_JSON.contains(&key.as_str()) {
                    push_json_references(inner, members);
                } else {
                    collect_json_members(inner, members);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_members(item, members);
            }
        }
        _ => {}
    }
}

fn push_json_references(value: &Value, members: &mut Vec<String>) {
    match value {
        Value::String(s) => members.push(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("@id") {
                members.push(id.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                push_json_references(item, members);
            }
        }
        _ => {}
    }
}
