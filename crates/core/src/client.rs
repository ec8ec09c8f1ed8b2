//! Resource client: typed GET/PUT over an [`AuthenticatedFetch`].
//!
//! Every read is a fresh network round-trip; nothing is cached. Writes are unconditional
//! full-replace PUTs, so an update is a read-modify-write of the whole document and the last
//! writer wins. There is no merge and no optimistic concurrency.

use crate::constants::{CONTAINER_BODY, CONTENT_TYPE_JSON, CONTENT_TYPE_TURTLE};
use crate::fetch::{AuthenticatedFetch, FetchRequest, FetchResponse};
use crate::{PodError, PodResult};
use acp::ContainerListing;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use url::Url;

pub(crate) const LISTING_ACCEPT: &str = "text/turtle, application/ld+json;q=0.9";

/// Outcome of [`ResourceClient::ensure_container`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Existing,
    Created,
}

/// Parse an absolute URL held as text in a governance document.
pub fn parse_url(raw: &str) -> PodResult<Url> {
    Url::parse(raw).map_err(|e| PodError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct ResourceClient {
    fetch: Arc<dyn AuthenticatedFetch>,
}

impl ResourceClient {
    pub fn new(fetch: Arc<dyn AuthenticatedFetch>) -> Self {
        Self { fetch }
    }

    /// GET `url`, returning `None` when the resource is absent.
    ///
    /// # Errors
    ///
    /// - [`PodError::Forbidden`] on 403
    /// - [`PodError::Http`] on any other non-2xx status, carrying the diagnostic body
    /// - [`PodError::Transport`] when no response was obtained
    pub async fn get(&self, url: &Url, accept: Option<&str>) -> PodResult<Option<FetchResponse>> {
        let mut request = FetchRequest::get(url.as_str());
        if let Some(accept) = accept {
            request = request.header("Accept", accept);
        }
        let response = self.fetch.fetch(request).await?;
        tracing::debug!(url = %url, status = response.status, "GET");

        match response.status {
            404 => Ok(None),
            403 => Err(PodError::Forbidden {
                url: url.to_string(),
            }),
            _ if response.is_success() => Ok(Some(response)),
            status => Err(PodError::Http {
                url: url.to_string(),
                status,
                body: response.body,
            }),
        }
    }

    pub async fn get_text(&self, url: &Url) -> PodResult<Option<String>> {
        Ok(self.get(url, None).await?.map(|r| r.body))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> PodResult<Option<T>> {
        let Some(response) = self.get(url, Some(CONTENT_TYPE_JSON)).await? else {
            return Ok(None);
        };
        let deserializer = &mut serde_json::Deserializer::from_str(&response.body);
        let value = serde_path_to_error::deserialize(deserializer).map_err(|source| {
            PodError::Deserialization {
                url: url.to_string(),
                source,
            }
        })?;
        Ok(Some(value))
    }

    /// PUT `body` at `url`, replacing whatever was there.
    pub async fn put_text(&self, url: &Url, body: &str, content_type: &str) -> PodResult<()> {
        let response = self
            .fetch
            .fetch(FetchRequest::put(url.as_str(), content_type, body))
            .await?;
        tracing::debug!(url = %url, status = response.status, "PUT");
        check_write(url, response)
    }

    pub async fn put_json<T: Serialize>(&self, url: &Url, value: &T) -> PodResult<()> {
        let body = serde_json::to_string_pretty(value).map_err(PodError::Serialization)?;
        self.put_text(url, &body, CONTENT_TYPE_JSON).await
    }

    /// Make sure the container at `url` exists.
    ///
    /// A 412 on creation means another actor created it first, which counts as success.
    pub async fn ensure_container(&self, url: &Url) -> PodResult<ContainerState> {
        if self.get(url, Some(CONTENT_TYPE_TURTLE)).await?.is_some() {
            return Ok(ContainerState::Existing);
        }

        let request = FetchRequest::put(url.as_str(), CONTENT_TYPE_TURTLE, CONTAINER_BODY)
            .header("If-None-Match", "*");
        let response = self.fetch.fetch(request).await?;
        match response.status {
            412 => {
                tracing::debug!(url = %url, "container created concurrently");
                Ok(ContainerState::Existing)
            }
            _ => {
                check_write(url, response)?;
                tracing::info!(url = %url, "created container");
                Ok(ContainerState::Created)
            }
        }
    }

    /// Member URLs of the container at `url`, resolved against it.
    ///
    /// An absent container has no members.
    pub async fn list_container(&self, url: &Url) -> PodResult<Vec<Url>> {
        let Some(response) = self.get(url, Some(LISTING_ACCEPT)).await? else {
            return Ok(Vec::new());
        };
        let members = ContainerListing::parse(&response.body, response.content_type.as_deref())?;

        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            match url.join(&member) {
                Ok(member_url) if member_url != *url => resolved.push(member_url),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(container = %url, member = %member, error = %e, "skipping unresolvable member");
                }
            }
        }
        Ok(resolved)
    }
}

fn check_write(url: &Url, response: FetchResponse) -> PodResult<()> {
    match response.status {
        403 => Err(PodError::Forbidden {
            url: url.to_string(),
        }),
        _ if response.is_success() => Ok(()),
        status => Err(PodError::Http {
            url: url.to_string(),
            status,
            body: response.body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Method;
    use crate::memory::MemoryPod;
    use pod_types::WebId;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Doc {
        blood_type: String,
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn client(pod: &MemoryPod) -> ResourceClient {
        let web_id = WebId::parse("https://alice.example/profile/card#me").unwrap();
        ResourceClient::new(Arc::new(pod.session(web_id)))
    }

    #[tokio::test]
    async fn test_absent_is_none_not_error() {
        let pod = MemoryPod::new();
        let client = client(&pod);
        let got: Option<Doc> = client
            .get_json(&url("https://alice.example/health/record.json"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let pod = MemoryPod::new();
        let client = client(&pod);
        let target = url("https://alice.example/health/record.json");
        client
            .put_json(&target, &Doc { blood_type: "O+".into() })
            .await
            .unwrap();
        let got: Doc = client.get_json(&target).await.unwrap().unwrap();
        assert_eq!(got.blood_type, "O+");
    }

    #[tokio::test]
    async fn test_forbidden_and_http_errors() {
        let pod = MemoryPod::new();
        pod.deny_all("https://alice.example/private/");
        pod.fail_with("https://alice.example/broken.json", 500);
        let client = client(&pod);

        let forbidden = client
            .get_text(&url("https://alice.example/private/x.txt"))
            .await;
        assert!(matches!(forbidden, Err(PodError::Forbidden { .. })));

        let broken = client
            .get_text(&url("https://alice.example/broken.json"))
            .await;
        assert!(matches!(broken, Err(PodError::Http { status: 500, .. })));

        let write = client
            .put_text(&url("https://alice.example/private/y.txt"), "x", "text/plain")
            .await;
        assert!(matches!(write, Err(PodError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_malformed_json_reports_path() {
        let pod = MemoryPod::new();
        pod.insert(
            "https://alice.example/doc.json",
            CONTENT_TYPE_JSON,
            r#"{"bloodType": 7}"#,
        );
        let result: PodResult<Option<Doc>> =
            client(&pod).get_json(&url("https://alice.example/doc.json")).await;
        match result {
            Err(PodError::Deserialization { source, .. }) => {
                assert_eq!(source.path().to_string(), "bloodType");
            }
            other => panic!("expected deserialization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_container_is_idempotent() {
        let pod = MemoryPod::new();
        let client = client(&pod);
        let container = url("https://gov.example/audit/");

        assert_eq!(
            client.ensure_container(&container).await.unwrap(),
            ContainerState::Created
        );
        assert_eq!(
            client.ensure_container(&container).await.unwrap(),
            ContainerState::Existing
        );
        assert_eq!(pod.request_count(Method::Put, container.as_str()), 1);
    }

    #[tokio::test]
    async fn test_ensure_container_lost_race_counts_as_existing() {
        let pod = MemoryPod::new();
        let container = url("https://gov.example/grants/");
        pod.fail_put_with(container.as_str(), 412);

        let state = client(&pod).ensure_container(&container).await.unwrap();
        assert_eq!(state, ContainerState::Existing);
        assert_eq!(pod.request_count(Method::Get, container.as_str()), 1);
        assert_eq!(pod.request_count(Method::Put, container.as_str()), 1);
    }

    #[tokio::test]
    async fn test_ensure_container_other_put_failure_is_http_error() {
        let pod = MemoryPod::new();
        let container = url("https://gov.example/grants/");
        pod.fail_put_with(container.as_str(), 500);

        let result = client(&pod).ensure_container(&container).await;
        assert!(matches!(result, Err(PodError::Http { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_ensure_container_forbidden() {
        let pod = MemoryPod::new();
        pod.deny_all("https://gov.example/");
        let result = client(&pod)
            .ensure_container(&url("https://gov.example/audit/"))
            .await;
        assert!(matches!(result, Err(PodError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_list_container_resolves_members() {
        let pod = MemoryPod::new();
        pod.insert("https://gov.example/audit/events/1.json", CONTENT_TYPE_JSON, "{}");
        pod.insert("https://gov.example/audit/events/2.json", CONTENT_TYPE_JSON, "{}");
        let members = client(&pod)
            .list_container(&url("https://gov.example/audit/events/"))
            .await
            .unwrap();
        assert_eq!(
            members,
            vec![
                url("https://gov.example/audit/events/1.json"),
                url("https://gov.example/audit/events/2.json"),
            ]
        );

        let none = client(&pod)
            .list_container(&url("https://gov.example/missing/"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
