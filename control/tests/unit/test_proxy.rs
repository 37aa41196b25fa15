use std::sync::Arc;

use http::Method;

use mozaiks_control::models::app::{AdminSurface, AppRecord, AppStatus};
use mozaiks_control::proxy::{AdminProxy, ProxyOptions, ProxyOutcome};
use mozaiks_control::store::memory::MemoryAppDirectory;

use crate::support::PassthroughUnwrapper;

fn app(admin: Option<AdminSurface>) -> AppRecord {
    AppRecord {
        id: "app-1".to_string(),
        name: "Demo App".to_string(),
        status: AppStatus::Running,
        api_key_digest: None,
        github_repo: None,
        deployed_at: None,
        database_provisioned_at: None,
        admin,
    }
}

fn proxy_with(record: Option<AppRecord>) -> AdminProxy {
    let apps = Arc::new(MemoryAppDirectory::new());
    if let Some(record) = record {
        apps.put(record);
    }
    AdminProxy::new(apps, Arc::new(PassthroughUnwrapper), ProxyOptions::default()).unwrap()
}

#[tokio::test]
async fn test_unknown_app_is_not_configured() {
    let proxy = proxy_with(None);

    let result = proxy
        .send("app-1", "/admin/users", Method::GET, None, "corr-1")
        .await
        .unwrap();
    assert!(matches!(result.outcome, ProxyOutcome::NotConfigured));
}

#[tokio::test]
async fn test_missing_admin_surface_is_not_configured() {
    let proxy = proxy_with(Some(app(None)));

    let result = proxy
        .send("app-1", "/admin/users", Method::GET, None, "corr-1")
        .await
        .unwrap();
    assert!(matches!(result.outcome, ProxyOutcome::NotConfigured));
}

#[tokio::test]
async fn test_unsupported_scheme_is_invalid_configuration() {
    let proxy = proxy_with(Some(app(Some(AdminSurface {
        base_url: "ftp://apps.example/admin".to_string(),
        admin_key_protected: "blob".to_string(),
    }))));

    let result = proxy
        .send("app-1", "/admin/users", Method::GET, None, "corr-1")
        .await
        .unwrap();
    assert!(matches!(
        result.outcome,
        ProxyOutcome::InvalidConfiguration { .. }
    ));
}

#[tokio::test]
async fn test_unparseable_base_url_is_invalid_configuration() {
    let proxy = proxy_with(Some(app(Some(AdminSurface {
        base_url: "not a url".to_string(),
        admin_key_protected: "blob".to_string(),
    }))));

    let result = proxy
        .send("app-1", "/admin/users", Method::GET, None, "corr-1")
        .await
        .unwrap();
    assert!(matches!(
        result.outcome,
        ProxyOutcome::InvalidConfiguration { .. }
    ));
}

#[tokio::test]
async fn test_open_circuit_rejects_before_any_call() {
    let proxy = proxy_with(Some(app(Some(AdminSurface {
        base_url: "https://apps.example/admin/".to_string(),
        admin_key_protected: "blob".to_string(),
    }))));

    for _ in 0..3 {
        proxy.breaker().record_failure("app-1");
    }

    let result = proxy
        .send("app-1", "users", Method::POST, None, "corr-1")
        .await
        .unwrap();
    match result.outcome {
        ProxyOutcome::CircuitOpen { until } => assert!(until.is_some()),
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
}
