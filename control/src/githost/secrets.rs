//! Repository secret configuration
//!
//! Each secret value is sealed-box encrypted with the repository's public
//! key and PUT individually. A failed name is recorded and the rest
//! continue; overall success requires zero failures.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crypto_box::aead::OsRng;
use crypto_box::PublicKey;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::errors::ControlError;
use crate::githost::api::GitHostApi;

/// Per-name outcome of a secret configuration run
#[derive(Debug, Clone, Default)]
pub struct SecretWriteReport {
    pub written: Vec<String>,
    pub failed: Vec<String>,
}

impl SecretWriteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write named secrets to a repository
pub async fn configure_secrets(
    api: &dyn GitHostApi,
    owner: &str,
    repo: &str,
    secrets: &[(String, SecretString)],
) -> Result<SecretWriteReport, ControlError> {
    let public_key = api.repo_public_key(owner, repo).await?;

    let key_bytes: [u8; 32] = BASE64
        .decode(&public_key.key)
        .map_err(|e| ControlError::InvalidRequest(format!("repository public key: {}", e)))?
        .try_into()
        .map_err(|_| {
            ControlError::InvalidRequest("repository public key is not 32 bytes".to_string())
        })?;
    let recipient = PublicKey::from(key_bytes);

    let mut report = SecretWriteReport::default();
    for (name, value) in secrets {
        let sealed = match recipient.seal(&mut OsRng, value.expose_secret().as_bytes()) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("Sealing secret {} failed: {}", name, e);
                report.failed.push(name.clone());
                continue;
            }
        };

        match api
            .put_secret(owner, repo, name, &BASE64.encode(sealed), &public_key.key_id)
            .await
        {
            Ok(()) => report.written.push(name.clone()),
            Err(e) => {
                warn!("Writing secret {} failed: {}", name, e);
                report.failed.push(name.clone());
            }
        }
    }

    Ok(report)
}
