//! Shared fakes for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use serde_json::Value;

use mozaiks_control::errors::ControlError;
use mozaiks_control::githost::api::{
    CommitInfo, GitHostApi, GitRef, NewTreeEntry, PullRequest, RefObject, RepoPublicKey,
    Repository, TreeListing, TreeRef,
};
use mozaiks_control::provision::admin::{BulkInsertOutcome, DatabaseAdmin};
use mozaiks_control::provision::agent::{
    AgentCommand, AgentResponse, ProvisioningAgent, ProvisionOutcome,
};
use mozaiks_control::proxy::breaker::Clock;
use mozaiks_control::proxy::SecretUnwrapper;
use mozaiks_control::schema::IndexSpec;

/// Manually advanced clock for breaker tests
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::seconds(secs);
    }
}

impl Clock for &ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Scripted provisioning agent
#[derive(Default)]
pub struct FakeAgent {
    pub fail: bool,
    pub provision_calls: Mutex<u32>,
    pub last_schema_json: Mutex<Option<String>>,
    pub last_correlation: Mutex<Option<String>>,
}

#[async_trait]
impl ProvisioningAgent for FakeAgent {
    async fn provision_database(
        &self,
        _job_id: &str,
        correlation_id: &str,
        _app_id: &str,
        database_name: &str,
        schema_json: Option<String>,
        _seed_json: Option<String>,
    ) -> Result<ProvisionOutcome, ControlError> {
        *self.provision_calls.lock().unwrap() += 1;
        *self.last_schema_json.lock().unwrap() = schema_json;
        *self.last_correlation.lock().unwrap() = Some(correlation_id.to_string());

        if self.fail {
            return Ok(ProvisionOutcome {
                success: false,
                error: Some("agent unavailable".to_string()),
                database_name: None,
                connection_secret_ref: None,
            });
        }

        Ok(ProvisionOutcome {
            success: true,
            error: None,
            database_name: Some(database_name.to_string()),
            connection_secret_ref: Some("secret-ref-1".to_string()),
        })
    }

    async fn send_command(&self, _command: AgentCommand) -> Result<AgentResponse, ControlError> {
        Ok(AgentResponse {
            success: true,
            error_message: None,
            error_code: None,
            update: None,
            data: None,
        })
    }
}

/// In-memory database admin
#[derive(Default)]
pub struct FakeAdmin {
    pub collections: Mutex<HashSet<String>>,
    pub modified: Mutex<Vec<String>>,
    pub indexes: Mutex<HashMap<String, Vec<String>>>,
    pub documents: Mutex<HashMap<String, HashSet<String>>>,
}

#[async_trait]
impl DatabaseAdmin for FakeAdmin {
    async fn create_collection(
        &self,
        _app_id: &str,
        _database: &str,
        collection: &str,
        _validator: &Value,
    ) -> Result<(), ControlError> {
        let mut collections = self.collections.lock().unwrap();
        if !collections.insert(collection.to_string()) {
            return Err(ControlError::AlreadyExists(collection.to_string()));
        }
        Ok(())
    }

    async fn modify_collection(
        &self,
        _app_id: &str,
        _database: &str,
        collection: &str,
        _validator: &Value,
    ) -> Result<(), ControlError> {
        self.modified.lock().unwrap().push(collection.to_string());
        Ok(())
    }

    async fn index_names(
        &self,
        _app_id: &str,
        _database: &str,
        collection: &str,
    ) -> Result<Vec<String>, ControlError> {
        Ok(self
            .indexes
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(
        &self,
        _app_id: &str,
        _database: &str,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<(), ControlError> {
        self.indexes
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(spec.name.clone());
        Ok(())
    }

    async fn bulk_insert(
        &self,
        _app_id: &str,
        _database: &str,
        collection: &str,
        documents: &[Value],
    ) -> Result<BulkInsertOutcome, ControlError> {
        let mut stored = self.documents.lock().unwrap();
        let existing = stored.entry(collection.to_string()).or_default();

        let mut outcome = BulkInsertOutcome::default();
        for document in documents {
            let key = document.to_string();
            if existing.insert(key) {
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }
}

/// Secret unwrapper that returns the blob as-is
pub struct PassthroughUnwrapper;

#[async_trait]
impl SecretUnwrapper for PassthroughUnwrapper {
    async fn unwrap(&self, protected: &str) -> Result<SecretString, ControlError> {
        Ok(SecretString::from(protected.to_string()))
    }
}

/// Everything the fake git host remembers
#[derive(Default)]
pub struct GitHostState {
    pub repos: HashMap<String, Repository>,
    /// `repo:ref_name` -> sha
    pub refs: HashMap<String, String>,
    pub blobs: HashMap<String, Vec<u8>>,
    /// created trees, by sha
    pub trees: HashMap<String, Vec<NewTreeEntry>>,
    /// prepared listings for get_tree
    pub tree_listings: HashMap<String, TreeListing>,
    pub commits: HashMap<String, CommitInfo>,
    /// (sha, message, tree_sha, parents)
    pub commit_log: Vec<(String, String, String, Vec<String>)>,
    /// (title, head, base, body)
    pub pulls: Vec<(String, String, String, String)>,
    /// (name, encrypted_value)
    pub secrets: Vec<(String, String)>,
    pub blob_creates: u32,
    pub remote_calls: u32,
    /// correlation ids handed to `with_correlation`
    pub correlations: Vec<String>,
}

/// Scripted git hosting API
#[derive(Default)]
pub struct FakeGitHost {
    pub fail_create_repo: bool,
    /// When set, `get_repo` blocks for an hour before answering
    pub stall_get_repo: bool,
    pub state: Mutex<GitHostState>,
}

impl FakeGitHost {
    pub fn with_repo(repo: &str, default_branch: &str) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().repos.insert(
            repo.to_string(),
            Repository {
                name: repo.to_string(),
                full_name: format!("mozaiks-apps/{}", repo),
                html_url: format!("https://git.example/mozaiks-apps/{}", repo),
                default_branch: default_branch.to_string(),
            },
        );
        fake
    }
}

#[async_trait]
impl GitHostApi for FakeGitHost {
    fn with_correlation(
        self: std::sync::Arc<Self>,
        correlation_id: &str,
    ) -> std::sync::Arc<dyn GitHostApi> {
        self.state
            .lock()
            .unwrap()
            .correlations
            .push(correlation_id.to_string());
        self
    }

    async fn get_repo(&self, _owner: &str, repo: &str) -> Result<Option<Repository>, ControlError> {
        if self.stall_get_repo {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(state.repos.get(repo).cloned())
    }

    async fn create_repo(&self, name: &str, _private: bool) -> Result<Repository, ControlError> {
        if self.fail_create_repo {
            return Err(ControlError::GitHost {
                status: 503,
                body: "repository service unavailable".to_string(),
            });
        }
        let repository = Repository {
            name: name.to_string(),
            full_name: format!("mozaiks-apps/{}", name),
            html_url: format!("https://git.example/mozaiks-apps/{}", name),
            default_branch: "main".to_string(),
        };
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.repos.insert(name.to_string(), repository.clone());
        Ok(repository)
    }

    async fn get_ref(
        &self,
        _owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<Option<GitRef>, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(state
            .refs
            .get(&format!("{}:{}", repo, ref_name))
            .map(|sha| GitRef {
                ref_name: format!("refs/{}", ref_name),
                object: RefObject { sha: sha.clone() },
            }))
    }

    async fn create_ref(
        &self,
        _owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .refs
            .insert(format!("{}:{}", repo, ref_name), sha.to_string());
        Ok(())
    }

    async fn update_ref(
        &self,
        _owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        _force: bool,
    ) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .refs
            .insert(format!("{}:{}", repo, ref_name), sha.to_string());
        Ok(())
    }

    async fn get_commit(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<CommitInfo, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("commit {}", sha)))
    }

    async fn get_tree(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
        _recursive: bool,
    ) -> Result<TreeListing, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .tree_listings
            .get(sha)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("tree {}", sha)))
    }

    async fn create_blob(
        &self,
        _owner: &str,
        _repo: &str,
        content: &[u8],
    ) -> Result<String, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        let sha = format!("blob{}", state.blob_creates);
        state.blob_creates += 1;
        state.blobs.insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn get_blob(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<Vec<u8>, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("blob {}", sha)))
    }

    async fn create_tree(
        &self,
        _owner: &str,
        _repo: &str,
        _base_tree: Option<&str>,
        entries: &[NewTreeEntry],
    ) -> Result<String, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        let sha = format!("tree{}", state.trees.len());
        state.trees.insert(sha.clone(), entries.to_vec());
        Ok(sha)
    }

    async fn create_commit(
        &self,
        _owner: &str,
        _repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        let sha = format!("commit{}", state.commit_log.len());
        state.commits.insert(
            sha.clone(),
            CommitInfo {
                sha: sha.clone(),
                tree: TreeRef {
                    sha: tree_sha.to_string(),
                },
            },
        );
        state.commit_log.push((
            sha.clone(),
            message.to_string(),
            tree_sha.to_string(),
            parents.to_vec(),
        ));
        Ok(sha)
    }

    async fn create_pull(
        &self,
        _owner: &str,
        _repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.pulls.push((
            title.to_string(),
            head.to_string(),
            base.to_string(),
            body.to_string(),
        ));
        Ok(PullRequest {
            number: state.pulls.len() as u64,
            html_url: format!("https://git.example/pulls/{}", state.pulls.len()),
        })
    }

    async fn repo_public_key(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<RepoPublicKey, ControlError> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(RepoPublicKey {
            key_id: "key-1".to_string(),
            key: STANDARD.encode([7u8; 32]),
        })
    }

    async fn put_secret(
        &self,
        _owner: &str,
        _repo: &str,
        name: &str,
        encrypted_value: &str,
        _key_id: &str,
    ) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state
            .secrets
            .push((name.to_string(), encrypted_value.to_string()));
        Ok(())
    }
}
