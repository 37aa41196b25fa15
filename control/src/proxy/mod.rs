//! Administrative proxy
//!
//! Forwards admin requests to a deployed application's admin surface behind
//! the circuit breaker. Configuration problems fail fast without touching
//! the circuit; 4xx responses are rejections, not circuit failures.

pub mod breaker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ControlError;
use crate::proxy::breaker::{BreakerOptions, CircuitBreaker};
use crate::store::AppDirectory;

/// Turns a protected admin-key blob into plaintext; implemented by an
/// external secret service
#[async_trait]
pub trait SecretUnwrapper: Send + Sync {
    async fn unwrap(&self, protected: &str) -> Result<SecretString, ControlError>;
}

/// Outcome of one proxied admin call
#[derive(Debug, Clone)]
pub enum ProxyOutcome {
    /// 2xx; clears circuit state
    Success { status: u16, body: String },

    /// 4xx; surfaced to the caller, excluded from circuit accounting
    Rejected { status: u16, body: String },

    /// 5xx; counts as a circuit failure
    UpstreamError { status: u16 },

    /// Transport timeout; counts as a circuit failure
    Timeout,

    /// Transport/network error; counts as a circuit failure
    NetworkError { detail: String },

    /// Rejected before any network call
    CircuitOpen { until: Option<DateTime<Utc>> },

    /// Response body exceeded the byte cap; counts as a circuit failure
    ResponseTooLarge,

    /// App has no admin surface configured
    NotConfigured,

    /// Admin surface configuration is present but unusable
    InvalidConfiguration { detail: String },
}

/// Structured result of `AdminProxy::send`
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub app_id: String,
    pub outcome: ProxyOutcome,
}

/// Proxy options
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub breaker: BreakerOptions,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_response_bytes: 2 * 1024 * 1024,
            breaker: BreakerOptions::default(),
        }
    }
}

impl From<&crate::settings::ProxySettings> for ProxyOptions {
    fn from(settings: &crate::settings::ProxySettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_response_bytes: settings.max_response_bytes,
            breaker: BreakerOptions {
                failure_threshold: settings.failure_threshold,
                failure_window: Duration::from_secs(settings.failure_window_secs),
                break_duration: Duration::from_secs(settings.break_secs),
                entry_ttl: Duration::from_secs(settings.cache_ttl_secs),
            },
        }
    }
}

/// Admin proxy with injected collaborators
pub struct AdminProxy {
    apps: Arc<dyn AppDirectory>,
    secrets: Arc<dyn SecretUnwrapper>,
    breaker: CircuitBreaker,
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl AdminProxy {
    pub fn new(
        apps: Arc<dyn AppDirectory>,
        secrets: Arc<dyn SecretUnwrapper>,
        options: ProxyOptions,
    ) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            apps,
            secrets,
            breaker: CircuitBreaker::new(options.breaker),
            client,
            max_response_bytes: options.max_response_bytes,
        })
    }

    /// Circuit state, exposed for diagnostics
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Forward one admin request. Store failures raise; everything else is
    /// reported in the structured result.
    pub async fn send(
        &self,
        app_id: &str,
        path: &str,
        method: Method,
        body: Option<Value>,
        correlation_id: &str,
    ) -> Result<ProxyResult, ControlError> {
        let result = |outcome| ProxyResult {
            app_id: app_id.to_string(),
            outcome,
        };

        let Some(app) = self.apps.get(app_id).await? else {
            return Ok(result(ProxyOutcome::NotConfigured));
        };
        let Some(admin) = app.admin else {
            return Ok(result(ProxyOutcome::NotConfigured));
        };

        let base = match Url::parse(&admin.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return Ok(result(ProxyOutcome::InvalidConfiguration {
                    detail: format!("unsupported scheme {}", url.scheme()),
                }))
            }
            Err(e) => {
                return Ok(result(ProxyOutcome::InvalidConfiguration {
                    detail: e.to_string(),
                }))
            }
        };
        let target = match join_target(&base, path) {
            Ok(url) => url,
            Err(e) => {
                return Ok(result(ProxyOutcome::InvalidConfiguration {
                    detail: e.to_string(),
                }))
            }
        };

        let admin_key = match self.secrets.unwrap(&admin.admin_key_protected).await {
            Ok(key) => key,
            Err(e) => {
                return Ok(result(ProxyOutcome::InvalidConfiguration {
                    detail: format!("admin key unwrap failed: {}", e),
                }))
            }
        };

        if let Some(until) = self.breaker.open_until(app_id) {
            debug!("Circuit open for app {}, rejecting {} {}", app_id, method, path);
            return Ok(result(ProxyOutcome::CircuitOpen { until: Some(until) }));
        }

        let mut request = self
            .client
            .request(method.clone(), target)
            .header("x-correlation-id", correlation_id)
            .header("X-Mozaiks-App-Id", app_id)
            .header("X-Mozaiks-App-Admin-Key", admin_key.expose_secret())
            .header(http::header::ACCEPT, "application/json");
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Admin call to app {} timed out", app_id);
                self.breaker.record_failure(app_id);
                return Ok(result(ProxyOutcome::Timeout));
            }
            Err(e) => {
                warn!("Admin call to app {} failed: {}", app_id, e);
                self.breaker.record_failure(app_id);
                return Ok(result(ProxyOutcome::NetworkError {
                    detail: e.to_string(),
                }));
            }
        };

        let status = response.status().as_u16();

        // Streaming bounded read; the read aborts at the cap
        let mut buffered: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) if e.is_timeout() => {
                    self.breaker.record_failure(app_id);
                    return Ok(result(ProxyOutcome::Timeout));
                }
                Err(e) => {
                    self.breaker.record_failure(app_id);
                    return Ok(result(ProxyOutcome::NetworkError {
                        detail: e.to_string(),
                    }));
                }
            };
            if buffered.len() + chunk.len() > self.max_response_bytes {
                warn!(
                    "Admin response from app {} exceeded {} bytes, aborting read",
                    app_id, self.max_response_bytes
                );
                self.breaker.record_failure(app_id);
                return Ok(result(ProxyOutcome::ResponseTooLarge));
            }
            buffered.extend_from_slice(&chunk);
        }

        if status >= 500 {
            self.breaker.record_failure(app_id);
            return Ok(result(ProxyOutcome::UpstreamError { status }));
        }

        let body_text = String::from_utf8_lossy(&buffered).into_owned();
        if (200..300).contains(&status) {
            self.breaker.record_success(app_id);
            Ok(result(ProxyOutcome::Success {
                status,
                body: body_text,
            }))
        } else {
            // 3xx/4xx: a client-side problem, not upstream unavailability
            Ok(result(ProxyOutcome::Rejected {
                status,
                body: body_text,
            }))
        }
    }
}

/// Join a request path onto an admin base URL, keeping every base segment.
/// `Url::join` treats a base without a trailing slash as a file reference and
/// drops its last segment, so normalize before joining.
fn join_target(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let normalized = format!("{}/", base.path());
        base.set_path(&normalized);
    }
    base.join(path.trim_start_matches('/'))
}
