#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use anyhow::{Context, Result};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared_types::{canonical_labels, Config, Group, LabelSet, VersionRef, IDEMPOTENCY_HEADER};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Client for interacting with the config registry service
pub struct RegistryClient {
    client: ReqwestClient,
    base_url: String,
}

#[derive(Serialize)]
struct ConfigBody<'a> {
    version: &'a str,
    entries: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct GroupBody<'a> {
    version: &'a str,
    configs: &'a [LabelSet],
}

#[derive(Serialize, Deserialize)]
struct LabelsBody {
    configs: Vec<LabelSet>,
}

#[derive(Deserialize)]
struct VersionsBody<T> {
    versions: Vec<T>,
}

#[derive(Deserialize)]
struct DeletedBody {
    deleted: VersionRef,
}

impl RegistryClient {
    /// Create a new client instance
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// A fresh random key for [`IDEMPOTENCY_HEADER`]. Reuse it when retrying
    /// the same write.
    pub fn new_idempotency_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_key(request: RequestBuilder, idempotency_key: Option<&str>) -> RequestBuilder {
        match idempotency_key {
            Some(key) => request.header(IDEMPOTENCY_HEADER, key),
            None => request,
        }
    }

    /// Turns non-success statuses into errors naming `what`.
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let details = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body["details"].as_str().map(str::to_string))
            .unwrap_or_default();
        debug!(%status, what, details = %details, "request failed");

        match status {
            StatusCode::NOT_FOUND => anyhow::bail!("Not found: {}", what),
            StatusCode::CONFLICT => anyhow::bail!("Conflict on {}: {}", what, details),
            StatusCode::BAD_REQUEST => anyhow::bail!("Rejected {}: {}", what, details),
            _ => anyhow::bail!("Request for {} failed with {}: {}", what, status, details),
        }
    }

    async fn read<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let response = Self::check(response, what).await?;
        Ok(response.json().await?)
    }

    /// Create a config under a fresh id
    pub async fn create_config(
        &self,
        version: &str,
        entries: &BTreeMap<String, String>,
        idempotency_key: Option<&str>,
    ) -> Result<Config> {
        let url = self.endpoint(&["configs"])?;
        let request = self.client.post(url).json(&ConfigBody { version, entries });

        let response = Self::with_key(request, idempotency_key).send().await?;
        Self::read(response, &format!("new config {version}")).await
    }

    /// Store a new version of an existing config
    pub async fn put_config_version(
        &self,
        id: &str,
        version: &str,
        entries: &BTreeMap<String, String>,
        idempotency_key: Option<&str>,
    ) -> Result<Config> {
        let url = self.endpoint(&["configs", id])?;
        let request = self.client.post(url).json(&ConfigBody { version, entries });

        let response = Self::with_key(request, idempotency_key).send().await?;
        Self::read(response, &format!("config {id}@{version}")).await
    }

    /// Get a specific version of a config
    pub async fn get_config(&self, id: &str, version: &str) -> Result<Config> {
        let url = self.endpoint(&["configs", id, version])?;
        let response = self.client.get(url).send().await?;
        Self::read(response, &format!("config {id}@{version}")).await
    }

    /// List all versions of a config
    pub async fn list_config_versions(&self, id: &str) -> Result<Vec<Config>> {
        let url = self.endpoint(&["configs", id])?;
        let response = self.client.get(url).send().await?;
        let body: VersionsBody<Config> = Self::read(response, &format!("config {id}")).await?;
        Ok(body.versions)
    }

    /// Delete a single config version
    pub async fn delete_config(
        &self,
        id: &str,
        version: &str,
        idempotency_key: Option<&str>,
    ) -> Result<VersionRef> {
        let url = self.endpoint(&["configs", id, version])?;
        let request = Self::with_key(self.client.delete(url), idempotency_key);

        let response = request.send().await?;
        let body: DeletedBody = Self::read(response, &format!("config {id}@{version}")).await?;
        Ok(body.deleted)
    }

    /// Create a group under a fresh id
    pub async fn create_group(
        &self,
        version: &str,
        configs: &[LabelSet],
        idempotency_key: Option<&str>,
    ) -> Result<Group> {
        let url = self.endpoint(&["groups"])?;
        let request = self.client.post(url).json(&GroupBody { version, configs });

        let response = Self::with_key(request, idempotency_key).send().await?;
        Self::read(response, &format!("new group {version}")).await
    }

    /// Store a new version of an existing group
    pub async fn put_group_version(
        &self,
        id: &str,
        version: &str,
        configs: &[LabelSet],
        idempotency_key: Option<&str>,
    ) -> Result<Group> {
        let url = self.endpoint(&["groups", id])?;
        let request = self.client.post(url).json(&GroupBody { version, configs });

        let response = Self::with_key(request, idempotency_key).send().await?;
        Self::read(response, &format!("group {id}@{version}")).await
    }

    /// Get a specific version of a group
    pub async fn get_group(&self, id: &str, version: &str) -> Result<Group> {
        let url = self.endpoint(&["groups", id, version])?;
        let response = self.client.get(url).send().await?;
        Self::read(response, &format!("group {id}@{version}")).await
    }

    /// List all versions of a group
    pub async fn list_group_versions(&self, id: &str) -> Result<Vec<Group>> {
        let url = self.endpoint(&["groups", id])?;
        let response = self.client.get(url).send().await?;
        let body: VersionsBody<Group> = Self::read(response, &format!("group {id}")).await?;
        Ok(body.versions)
    }

    /// Delete a group version along with its label index
    pub async fn delete_group(
        &self,
        id: &str,
        version: &str,
        idempotency_key: Option<&str>,
    ) -> Result<VersionRef> {
        let url = self.endpoint(&["groups", id, version])?;
        let request = Self::with_key(self.client.delete(url), idempotency_key);

        let response = request.send().await?;
        let body: DeletedBody = Self::read(response, &format!("group {id}@{version}")).await?;
        Ok(body.deleted)
    }

    /// Append label-sets to a group version, returning the full list
    pub async fn add_labels(
        &self,
        id: &str,
        version: &str,
        configs: Vec<LabelSet>,
        idempotency_key: Option<&str>,
    ) -> Result<Vec<LabelSet>> {
        let url = self.endpoint(&["groups", id, version, "labels"])?;
        let request = self.client.post(url).json(&LabelsBody { configs });

        let response = Self::with_key(request, idempotency_key).send().await?;
        let body: LabelsBody = Self::read(response, &format!("group {id}@{version}")).await?;
        Ok(body.configs)
    }

    /// Label-sets of a group version exactly equal to `labels`
    pub async fn find_labels(
        &self,
        id: &str,
        version: &str,
        labels: &LabelSet,
    ) -> Result<Vec<LabelSet>> {
        let query = canonical_labels(labels);
        let url = self.endpoint(&["groups", id, version, "labels", &query])?;

        let response = self.client.get(url).send().await?;
        let body: LabelsBody =
            Self::read(response, &format!("labels {query} in group {id}@{version}")).await?;
        Ok(body.configs)
    }

    /// Check if the service is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let url = self.endpoint(&["health"])?;

        let response = self.client.get(url).send().await?;

        Ok(response.status() == StatusCode::OK)
    }
}
