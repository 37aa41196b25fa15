//! Git object graph construction
//!
//! Read side: manifest build (tree walk plus content hashing) used for
//! conflict detection. Write side: patch commits with pull requests, and
//! bulk pushes for fresh deployments. Remote failures are not compensated;
//! blobs and trees created before a failed commit/ref step remain
//! unreferenced on the remote.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::FileMap;
use crate::errors::ControlError;
use crate::githost::api::{GitHostApi, NewTreeEntry, Repository};
use crate::utils::sha256_hex;

/// Default commit message when none is supplied
const DEFAULT_COMMIT_MESSAGE: &str = "Apply generated changes";

/// One file in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    /// SHA-256 of the blob content
    pub content_hash: String,
    pub size: u64,
}

/// Sorted snapshot of a repository tree's content, the basis for diffing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub base_commit_sha: String,
    /// Sorted by path, byte-wise ascending
    pub files: Vec<ManifestFile>,
}

/// Patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Modify,
    Delete,
}

/// One change in a patch. Content may be base64 or plain text; deletes
/// carry none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub op: ChangeOp,
    #[serde(default)]
    pub content: Option<String>,
}

impl Change {
    /// Decode change content: strict base64 first, plain text bytes
    /// otherwise
    fn content_bytes(&self) -> Result<Vec<u8>, ControlError> {
        let content = self.content.as_ref().ok_or_else(|| {
            ControlError::InvalidRequest(format!("change {} has no content", self.path))
        })?;
        match BASE64.decode(content) {
            Ok(bytes) => Ok(bytes),
            Err(_) => Ok(content.clone().into_bytes()),
        }
    }
}

/// Conflict between a manifest and a proposed patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub path: String,
    pub reason: String,
}

impl Manifest {
    /// Changes that no longer line up with the manifest: adds of existing
    /// paths, modifies/deletes of missing ones
    pub fn conflicts_with(&self, changes: &[Change]) -> Vec<ConflictEntry> {
        let mut conflicts = Vec::new();
        for change in changes {
            let exists = self.files.iter().any(|f| f.path == change.path);
            match change.op {
                ChangeOp::Add if exists => conflicts.push(ConflictEntry {
                    path: change.path.clone(),
                    reason: "path already exists".to_string(),
                }),
                ChangeOp::Modify | ChangeOp::Delete if !exists => {
                    conflicts.push(ConflictEntry {
                        path: change.path.clone(),
                        reason: "path not present at base commit".to_string(),
                    })
                }
                _ => {}
            }
        }
        conflicts
    }
}

/// Pull request options for a patch commit
#[derive(Debug, Clone, Default)]
pub struct PrOptions {
    pub title: String,
    pub body: Option<String>,
    pub patch_id: Option<String>,
    pub workflow_type: Option<String>,
    pub conflicts: Vec<ConflictEntry>,
}

/// Result of an applied patch
#[derive(Debug, Clone)]
pub struct PatchResult {
    pub commit_sha: String,
    pub pr_number: u64,
    pub pr_url: String,
}

/// Result of a bulk push
#[derive(Debug, Clone)]
pub struct PushResult {
    pub commit_sha: String,
    pub branch: String,
    pub repo_url: String,
    pub repo_full_name: String,
}

/// Builder over the hosting API for one repository owner
pub struct GitGraphBuilder {
    api: Arc<dyn GitHostApi>,
    owner: String,
    private_repos: bool,
}

impl GitGraphBuilder {
    pub fn new(api: Arc<dyn GitHostApi>, owner: &str, private_repos: bool) -> Self {
        Self {
            api,
            owner: owner.to_string(),
            private_repos,
        }
    }

    /// Builder whose remote calls carry the given correlation id
    pub fn with_correlation(&self, correlation_id: &str) -> GitGraphBuilder {
        GitGraphBuilder {
            api: Arc::clone(&self.api).with_correlation(correlation_id),
            owner: self.owner.clone(),
            private_repos: self.private_repos,
        }
    }

    /// Build the manifest of a repository's default branch
    pub async fn build_manifest(&self, repo: &str) -> Result<Manifest, ControlError> {
        let repository = self
            .api
            .get_repo(&self.owner, repo)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("repository {}", repo)))?;

        let head = self
            .api
            .get_ref(&self.owner, repo, &format!("heads/{}", repository.default_branch))
            .await?
            .ok_or_else(|| {
                ControlError::InvalidRequest(format!(
                    "repository {} has no branch {}",
                    repo, repository.default_branch
                ))
            })?;

        let commit = self.api.get_commit(&self.owner, repo, &head.object.sha).await?;
        let listing = self.api.get_tree(&self.owner, repo, &commit.tree.sha, true).await?;

        let mut files = Vec::new();
        for item in &listing.tree {
            if item.item_type != "blob" {
                continue;
            }
            let Some(sha) = &item.sha else { continue };
            let bytes = self.api.get_blob(&self.owner, repo, sha).await?;
            files.push(ManifestFile {
                path: item.path.clone(),
                content_hash: sha256_hex(&bytes),
                size: bytes.len() as u64,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Manifest {
            base_commit_sha: head.object.sha,
            files,
        })
    }

    /// Apply an ordered change list on top of a base commit and open a pull
    /// request against the default branch.
    pub async fn apply_patch(
        &self,
        repo: &str,
        branch: &str,
        base_commit_sha: &str,
        changes: &[Change],
        message: Option<&str>,
        pr: &PrOptions,
    ) -> Result<PatchResult, ControlError> {
        let branch = sanitize_branch(branch);
        if branch.is_empty() {
            return Err(ControlError::InvalidRequest("empty branch name".to_string()));
        }
        if changes.is_empty() {
            return Err(ControlError::InvalidRequest("empty change list".to_string()));
        }
        // Decode everything before the first remote mutation
        let mut decoded: Vec<(String, ChangeOp, Option<Vec<u8>>)> = Vec::new();
        for change in changes {
            let bytes = match change.op {
                ChangeOp::Add | ChangeOp::Modify => Some(change.content_bytes()?),
                ChangeOp::Delete => None,
            };
            decoded.push((change.path.clone(), change.op, bytes));
        }

        let repository = self
            .api
            .get_repo(&self.owner, repo)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("repository {}", repo)))?;

        // Resolve the base before touching any ref, so a bad sha leaves the
        // remote untouched
        let base_commit = match self.api.get_commit(&self.owner, repo, base_commit_sha).await {
            Ok(commit) => commit,
            Err(ControlError::NotFound(_)) | Err(ControlError::GitHost { status: 404, .. }) => {
                return Err(ControlError::InvalidRequest(format!(
                    "base commit {} not found in {}",
                    base_commit_sha, repo
                )))
            }
            Err(e) => return Err(e),
        };

        let ref_name = format!("heads/{}", branch);
        match self.api.get_ref(&self.owner, repo, &ref_name).await? {
            Some(_) => {
                self.api
                    .update_ref(&self.owner, repo, &ref_name, base_commit_sha, true)
                    .await?
            }
            None => {
                self.api
                    .create_ref(&self.owner, repo, &ref_name, base_commit_sha)
                    .await?
            }
        }

        let mut entries = Vec::with_capacity(decoded.len());
        for (path, op, bytes) in decoded {
            match op {
                ChangeOp::Add | ChangeOp::Modify => {
                    let sha = self
                        .api
                        .create_blob(&self.owner, repo, bytes.as_deref().unwrap_or_default())
                        .await?;
                    entries.push(NewTreeEntry::blob(path, sha));
                }
                ChangeOp::Delete => entries.push(NewTreeEntry::delete(path)),
            }
        }

        let tree_sha = self
            .api
            .create_tree(&self.owner, repo, Some(&base_commit.tree.sha), &entries)
            .await?;
        let commit_sha = self
            .api
            .create_commit(
                &self.owner,
                repo,
                message.unwrap_or(DEFAULT_COMMIT_MESSAGE),
                &tree_sha,
                &[base_commit_sha.to_string()],
            )
            .await?;
        self.api
            .update_ref(&self.owner, repo, &ref_name, &commit_sha, true)
            .await?;

        let body = assemble_pr_body(pr);
        let pull = self
            .api
            .create_pull(
                &self.owner,
                repo,
                &pr.title,
                &branch,
                &repository.default_branch,
                &body,
            )
            .await?;

        info!(
            "Patch applied on {}/{}: commit {} (PR #{})",
            self.owner, repo, commit_sha, pull.number
        );

        Ok(PatchResult {
            commit_sha,
            pr_number: pull.number,
            pr_url: pull.html_url,
        })
    }

    /// Push a full file map as one commit on the default branch, creating
    /// the repository when absent. No pull request is opened.
    pub async fn bulk_push(
        &self,
        repo: &str,
        files: &FileMap,
        message: &str,
    ) -> Result<PushResult, ControlError> {
        if files.is_empty() {
            return Err(ControlError::InvalidRequest("empty file set".to_string()));
        }

        let repository = self.ensure_repo(repo).await?;
        let branch = repository.default_branch.clone();
        let ref_name = format!("heads/{}", branch);

        let head = self.api.get_ref(&self.owner, repo, &ref_name).await?;
        let (base_tree, parents) = match &head {
            Some(head_ref) => {
                let commit = self.api.get_commit(&self.owner, repo, &head_ref.object.sha).await?;
                (Some(commit.tree.sha), vec![head_ref.object.sha.clone()])
            }
            None => (None, Vec::new()),
        };

        let mut entries = Vec::with_capacity(files.len());
        for (path, contents) in files {
            let sha = self.api.create_blob(&self.owner, repo, contents).await?;
            entries.push(NewTreeEntry::blob(path.clone(), sha));
        }

        let tree_sha = self
            .api
            .create_tree(&self.owner, repo, base_tree.as_deref(), &entries)
            .await?;
        let commit_sha = self
            .api
            .create_commit(&self.owner, repo, message, &tree_sha, &parents)
            .await?;

        match head {
            Some(_) => {
                self.api
                    .update_ref(&self.owner, repo, &ref_name, &commit_sha, true)
                    .await?
            }
            None => {
                self.api
                    .create_ref(&self.owner, repo, &ref_name, &commit_sha)
                    .await?
            }
        }

        info!(
            "Pushed {} files to {} as commit {}",
            files.len(),
            repository.full_name,
            commit_sha
        );

        Ok(PushResult {
            commit_sha,
            branch,
            repo_url: repository.html_url,
            repo_full_name: repository.full_name,
        })
    }

    /// Write named secrets to a repository (sealed-box encrypted)
    pub async fn configure_repo_secrets(
        &self,
        repo: &str,
        secrets: &[(String, secrecy::SecretString)],
    ) -> Result<crate::githost::secrets::SecretWriteReport, ControlError> {
        crate::githost::secrets::configure_secrets(self.api.as_ref(), &self.owner, repo, secrets)
            .await
    }

    async fn ensure_repo(&self, repo: &str) -> Result<Repository, ControlError> {
        if let Some(existing) = self.api.get_repo(&self.owner, repo).await? {
            return Ok(existing);
        }
        debug!("Repository {} absent, creating", repo);
        self.api.create_repo(repo, self.private_repos).await
    }
}

/// Assemble a PR body from free text, a metadata block, and a rendered
/// conflict list, separated by `---` lines
pub fn assemble_pr_body(pr: &PrOptions) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(body) = &pr.body {
        if !body.trim().is_empty() {
            sections.push(body.trim_end().to_string());
        }
    }

    if pr.patch_id.is_some() || pr.workflow_type.is_some() {
        let mut block = String::new();
        if let Some(patch_id) = &pr.patch_id {
            block.push_str(&format!("Patch-Id: {}\n", patch_id));
        }
        if let Some(workflow) = &pr.workflow_type {
            block.push_str(&format!("Workflow: {}\n", workflow));
        }
        sections.push(block.trim_end().to_string());
    }

    if !pr.conflicts.is_empty() {
        let rendered = serde_json::to_string_pretty(&pr.conflicts).unwrap_or_default();
        sections.push(rendered.trim_end().to_string());
    }

    sections.join("\n---\n").trim_end().to_string()
}

/// Sanitize a branch name before any ref operation: backslashes become
/// forward slashes, spaces and the ref-forbidden `..`/`~`/`^`/`:` become
/// hyphens, leading/trailing slashes are trimmed
pub fn sanitize_branch(name: &str) -> String {
    let mut out = name.replace('\\', "/");
    while out.contains("..") {
        out = out.replace("..", "-");
    }
    out = out
        .chars()
        .map(|c| match c {
            ' ' | '~' | '^' | ':' => '-',
            other => other,
        })
        .collect();
    out.trim_matches('/').to_string()
}
