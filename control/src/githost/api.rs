//! Git hosting REST API client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::errors::ControlError;

/// Repository metadata
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub default_branch: String,
}

/// Object a ref points at
#[derive(Debug, Clone, Deserialize)]
pub struct RefObject {
    pub sha: String,
}

/// A named pointer to a commit
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: RefObject,
}

/// Tree pointer inside a commit
#[derive(Debug, Clone, Deserialize)]
pub struct TreeRef {
    pub sha: String,
}

/// Commit metadata
#[derive(Debug, Clone, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub tree: TreeRef,
}

/// One entry of a fetched tree listing
#[derive(Debug, Clone, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A fetched tree
#[derive(Debug, Clone, Deserialize)]
pub struct TreeListing {
    pub sha: String,
    pub tree: Vec<TreeItem>,
    #[serde(default)]
    pub truncated: bool,
}

/// One entry of a tree about to be created. `sha: None` serializes as an
/// explicit null, signaling removal of the path.
#[derive(Debug, Clone, Serialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: Option<String>,
}

impl NewTreeEntry {
    /// Regular-file blob entry
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            entry_type: "blob".to_string(),
            sha: Some(sha.into()),
        }
    }

    /// Deletion entry
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            entry_type: "blob".to_string(),
            sha: None,
        }
    }
}

/// An opened pull request
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Repository public key used for secret encryption
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPublicKey {
    pub key_id: String,
    /// Base64-encoded 32-byte public key
    pub key: String,
}

/// Git hosting REST API surface consumed by the graph builder
#[async_trait]
pub trait GitHostApi: Send + Sync {
    /// A handle that stamps `correlation_id` on every remote call it makes
    fn with_correlation(self: Arc<Self>, correlation_id: &str) -> Arc<dyn GitHostApi>;

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<Repository>, ControlError>;

    async fn create_repo(&self, name: &str, private: bool) -> Result<Repository, ControlError>;

    /// `ref_name` is the short form, e.g. `heads/main`
    async fn get_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<Option<GitRef>, ControlError>;

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), ControlError>;

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), ControlError>;

    async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CommitInfo, ControlError>;

    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        recursive: bool,
    ) -> Result<TreeListing, ControlError>;

    /// Returns the new blob's sha
    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &[u8],
    ) -> Result<String, ControlError>;

    async fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<u8>, ControlError>;

    /// Returns the new tree's sha
    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[NewTreeEntry],
    ) -> Result<String, ControlError>;

    /// Returns the new commit's sha
    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, ControlError>;

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, ControlError>;

    async fn repo_public_key(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepoPublicKey, ControlError>;

    async fn put_secret(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<(), ControlError>;
}

/// HTTP client for a GitHub-compatible hosting API
pub struct GitHostClient {
    client: Client,
    base_url: String,
    token: SecretString,
    correlation_id: Option<String>,
}

impl GitHostClient {
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("mozaiks-control")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            correlation_id: None,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let mut builder = self
            .client
            .request(method, url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(correlation_id) = &self.correlation_id {
            builder = builder.header("x-correlation-id", correlation_id);
        }
        builder
    }

    async fn expect_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ControlError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ControlError::GitHost { status, body })
    }

    async fn get_optional<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ControlError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl GitHostApi for GitHostClient {
    fn with_correlation(self: Arc<Self>, correlation_id: &str) -> Arc<dyn GitHostApi> {
        // reqwest::Client is a shared handle, so the pool is reused
        Arc::new(GitHostClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            correlation_id: Some(correlation_id.to_string()),
        })
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<Repository>, ControlError> {
        self.get_optional(&format!("/repos/{}/{}", owner, repo)).await
    }

    async fn create_repo(&self, name: &str, private: bool) -> Result<Repository, ControlError> {
        let body = json!({ "name": name, "private": private, "auto_init": false });
        let response = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn get_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<Option<GitRef>, ControlError> {
        self.get_optional(&format!("/repos/{}/{}/git/ref/{}", owner, repo, ref_name))
            .await
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), ControlError> {
        let body = json!({ "ref": format!("refs/{}", ref_name), "sha": sha });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/refs", owner, repo),
            )
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), ControlError> {
        let body = json!({ "sha": sha, "force": force });
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/git/refs/{}", owner, repo, ref_name),
            )
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CommitInfo, ControlError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/git/commits/{}", owner, repo, sha),
            )
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        recursive: bool,
    ) -> Result<TreeListing, ControlError> {
        let mut path = format!("/repos/{}/{}/git/trees/{}", owner, repo, sha);
        if recursive {
            path.push_str("?recursive=1");
        }
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &[u8],
    ) -> Result<String, ControlError> {
        #[derive(Deserialize)]
        struct BlobResponse {
            sha: String,
        }

        let body = json!({
            "content": BASE64.encode(content),
            "encoding": "base64",
        });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/blobs", owner, repo),
            )
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let blob: BlobResponse = response.json().await?;
        Ok(blob.sha)
    }

    async fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<u8>, ControlError> {
        #[derive(Deserialize)]
        struct BlobContent {
            content: String,
            encoding: String,
        }

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/git/blobs/{}", owner, repo, sha),
            )
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let blob: BlobContent = response.json().await?;

        match blob.encoding.as_str() {
            "base64" => {
                // Hosted blob payloads arrive with embedded newlines
                let compact: String = blob.content.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64
                    .decode(compact)
                    .map_err(|e| ControlError::InvalidRequest(format!("blob {}: {}", sha, e)))
            }
            "utf-8" => Ok(blob.content.into_bytes()),
            other => Err(ControlError::InvalidRequest(format!(
                "blob {}: unsupported encoding {}",
                sha, other
            ))),
        }
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[NewTreeEntry],
    ) -> Result<String, ControlError> {
        #[derive(Deserialize)]
        struct TreeResponse {
            sha: String,
        }

        let mut body = serde_json::Map::new();
        if let Some(base) = base_tree {
            body.insert("base_tree".to_string(), json!(base));
        }
        body.insert("tree".to_string(), serde_json::to_value(entries)?);

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/trees", owner, repo),
            )
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let tree: TreeResponse = response.json().await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, ControlError> {
        #[derive(Deserialize)]
        struct CommitResponse {
            sha: String,
        }

        let body = json!({
            "message": message,
            "tree": tree_sha,
            "parents": parents,
        });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/git/commits", owner, repo),
            )
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let commit: CommitResponse = response.json().await?;
        Ok(commit.sha)
    }

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, ControlError> {
        let payload = json!({
            "title": title,
            "head": head,
            "base": base,
            "body": body,
        });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", owner, repo),
            )
            .json(&payload)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn repo_public_key(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepoPublicKey, ControlError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/actions/secrets/public-key", owner, repo),
            )
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn put_secret(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<(), ControlError> {
        let body = json!({
            "encrypted_value": encrypted_value,
            "key_id": key_id,
        });
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{}/{}/actions/secrets/{}", owner, repo, name),
            )
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }
}
