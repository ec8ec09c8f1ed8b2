//! In-memory pod storage.
//!
//! [`MemoryPod`] emulates the subset of pod-server behaviour the core relies on, so governance
//! flows can run without a network:
//!
//! - `GET` returns 200 with the stored body, 404 when absent, or a container listing for URLs
//!   ending in `/`: Turtle unless the `Accept` header ranks JSON-LD strictly higher, or the pod
//!   was told to answer listings in JSON-LD only
//! - `PUT` stores the body as a full replacement and creates missing ancestor containers
//! - `If-None-Match: *` on an existing resource yields 412
//! - denied prefixes yield 403 and injected failures yield the configured status
//!
//! Access-control documents are stored like any other resource; they are not enforced.
//!
//! Several identity-bound [`MemoryFetch`] handles can share one pod, which is how tests model a
//! patient, a doctor and the governance authority talking to the same storage.

use crate::constants::{CONTENT_TYPE_TURTLE, CONTAINER_BODY};
use crate::fetch::{AuthenticatedFetch, FetchError, FetchRequest, FetchResponse, Method};
use async_trait::async_trait;
use pod_types::WebId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
struct StoredResource {
    content_type: String,
    body: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, StoredResource>,
    denied: Vec<(Option<WebId>, String)>,
    failures: HashMap<String, u16>,
    put_failures: HashMap<String, u16>,
    json_ld_listings: bool,
    requests: Vec<(WebId, Method, String)>,
}

/// Shared in-memory storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryPod {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPod {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch handle bound to `web_id`.
    pub fn session(&self, web_id: WebId) -> MemoryFetch {
        MemoryFetch {
            pod: self.clone(),
            web_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Respond 403 to every request under `prefix`.
    pub fn deny_all(&self, prefix: impl Into<String>) {
        self.lock().denied.push((None, prefix.into()));
    }

    /// Respond 403 to requests from `web_id` under `prefix`.
    pub fn deny(&self, web_id: WebId, prefix: impl Into<String>) {
        self.lock().denied.push((Some(web_id), prefix.into()));
    }

    /// Respond with `status` to every request for exactly `url`.
    pub fn fail_with(&self, url: impl Into<String>, status: u16) {
        self.lock().failures.insert(url.into(), status);
    }

    /// Answer every container listing in JSON-LD, whatever the `Accept` header prefers.
    pub fn serve_json_ld_listings(&self) {
        self.lock().json_ld_listings = true;
    }

    /// Respond with `status` to every PUT for exactly `url`; reads are unaffected.
    pub fn fail_put_with(&self, url: impl Into<String>, status: u16) {
        self.lock().put_failures.insert(url.into(), status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.put_failures.clear();
        state.denied.clear();
    }

    /// Stored body of `url`, bypassing every rule.
    pub fn get(&self, url: &str) -> Option<String> {
        self.lock().resources.get(url).map(|r| r.body.clone())
    }

    /// Store `body` at `url` directly, bypassing every rule.
    pub fn insert(&self, url: impl Into<String>, content_type: &str, body: impl Into<String>) {
        let url = url.into();
        let mut state = self.lock();
        create_ancestors(&mut state, &url);
        state.resources.insert(
            url,
            StoredResource {
                content_type: content_type.into(),
                body: body.into(),
            },
        );
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().resources.contains_key(url)
    }

    /// All stored URLs starting with `prefix`, sorted.
    pub fn urls_under(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .resources
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of requests made with `method` for `url`.
    pub fn request_count(&self, method: Method, url: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|(_, m, u)| *m == method && u == url)
            .count()
    }

    fn handle(&self, web_id: &WebId, request: FetchRequest) -> FetchResponse {
        let mut state = self.lock();
        state
            .requests
            .push((web_id.clone(), request.method, request.url.clone()));

        if let Some(status) = state.failures.get(&request.url) {
            return FetchResponse::new(*status, Some("text/plain"), "injected failure");
        }
        if request.method == Method::Put {
            if let Some(status) = state.put_failures.get(&request.url) {
                return FetchResponse::new(*status, Some("text/plain"), "injected failure");
            }
        }

        let denied = state.denied.iter().any(|(who, prefix)| {
            request.url.starts_with(prefix.as_str()) && who.as_ref().map_or(true, |w| w == web_id)
        });
        if denied {
            return FetchResponse::new(403, Some("text/plain"), "Forbidden");
        }

        match request.method {
            Method::Get => {
                let Some(resource) = state.resources.get(&request.url) else {
                    return FetchResponse::new(404, Some("text/plain"), "Not Found");
                };
                if request.url.ends_with('/') {
                    let wants_json = state.json_ld_listings
                        || request.header_value("Accept").is_some_and(prefers_json_ld);
                    let members = direct_members(&state, &request.url);
                    return if wants_json {
                        FetchResponse::new(
                            200,
                            Some("application/ld+json"),
                            json_listing(&request.url, &members),
                        )
                    } else {
                        FetchResponse::new(
                            200,
                            Some(CONTENT_TYPE_TURTLE),
                            turtle_listing(&members),
                        )
                    };
                }
                FetchResponse::new(200, Some(&resource.content_type), resource.body.clone())
            }
            Method::Put => {
                let exists = state.resources.contains_key(&request.url);
                if exists && request.header_value("If-None-Match") == Some("*") {
                    return FetchResponse::new(412, Some("text/plain"), "Precondition Failed");
                }
                let content_type = request
                    .header_value("Content-Type")
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let body = if request.url.ends_with('/') {
                    CONTAINER_BODY.to_owned()
                } else {
                    request.body.unwrap_or_default()
                };
                create_ancestors(&mut state, &request.url);
                state.resources.insert(
                    request.url,
                    StoredResource { content_type, body },
                );
                if exists {
                    FetchResponse::new(204, None, "")
                } else {
                    FetchResponse::new(201, None, "")
                }
            }
        }
    }
}

fn create_ancestors(state: &mut MemoryState, url: &str) {
    let Some(scheme_end) = url.find("://") else {
        return;
    };
    let Some(path_start) = url[scheme_end + 3..].find('/') else {
        return;
    };
    let path_start = scheme_end + 3 + path_start;
    let trimmed = url.trim_end_matches('/');

    let mut ancestors = vec![path_start];
    let mut idx = path_start;
    while let Some(next) = trimmed.get(idx + 1..).and_then(|rest| rest.find('/')) {
        idx = idx + 1 + next;
        ancestors.push(idx);
    }
    for end in ancestors {
        let ancestor = &url[..=end];
        if ancestor == url {
            continue;
        }
        state
            .resources
            .entry(ancestor.to_owned())
            .or_insert_with(|| StoredResource {
                content_type: CONTENT_TYPE_TURTLE.into(),
                body: CONTAINER_BODY.into(),
            });
    }
}

/// Whether `accept` ranks a JSON media range strictly above Turtle. Missing `q` means 1.
fn prefers_json_ld(accept: &str) -> bool {
    let mut turtle_q = 0.0_f32;
    let mut json_q = 0.0_f32;
    for range in accept.split(',') {
        let mut parts = range.split(';').map(str::trim);
        let media = parts.next().unwrap_or_default().to_ascii_lowercase();
        let q = parts
            .filter_map(|p| p.strip_prefix("q="))
            .find_map(|v| v.parse::<f32>().ok())
            .unwrap_or(1.0);
        if media == CONTENT_TYPE_TURTLE {
            turtle_q = turtle_q.max(q);
        } else if media.contains("json") {
            json_q = json_q.max(q);
        }
    }
    json_q > turtle_q
}

fn direct_members(state: &MemoryState, container: &str) -> Vec<String> {
    state
        .resources
        .keys()
        .filter(|k| k.as_str() != container && k.starts_with(container))
        .filter(|k| {
            let rest = &k[container.len()..];
            match rest.find('/') {
                None => true,
                Some(pos) => pos == rest.len() - 1,
            }
        })
        .cloned()
        .collect()
}

fn turtle_listing(members: &[String]) -> String {
    let mut out = String::from(
        "@prefix ldp: <http://www.w3.org/ns/ldp#>.\n<> a ldp:Container, ldp:BasicContainer",
    );
    if !members.is_empty() {
        let refs = members
            .iter()
            .map(|m| format!("<{m}>"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(";\n    ldp:contains ");
        out.push_str(&refs);
    }
    out.push_str(".\n");
    out
}

fn json_listing(container: &str, members: &[String]) -> String {
    let contains: Vec<serde_json::Value> = members
        .iter()
        .map(|m| serde_json::json!({ "@id": m }))
        .collect();
    serde_json::json!([{
        "@id": container,
        "http://www.w3.org/ns/ldp#contains": contains,
    }])
    .to_string()
}

/// [`AuthenticatedFetch`] over a [`MemoryPod`].
#[derive(Clone, Debug)]
pub struct MemoryFetch {
    pod: MemoryPod,
    web_id: WebId,
}

#[async_trait]
impl AuthenticatedFetch for MemoryFetch {
    fn web_id(&self) -> &WebId {
        &self.web_id
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        if !(request.url.starts_with("https://") || request.url.starts_with("http://")) {
            return Err(FetchError::InvalidRequest(format!(
                "unsupported URL: {}",
                request.url
            )));
        }
        Ok(self.pod.handle(&self.web_id, request))
    }
}
