//! DeploymentManager behaviour against the in-memory and registry-backed platforms.

use std::sync::Arc;
use std::time::Duration;

use rendergrid_core::{RetryPolicy, WorkerIdentity, WorkerSpec};
use rendergrid_deploy::{
    DeployError, DeploymentManager, LocalPlatform, MemoryPlatform, PlatformError,
};
use rendergrid_state::StateStore;

fn spec(timeout: u32) -> WorkerSpec {
    WorkerSpec {
        identity: WorkerIdentity {
            family: "remotion".to_string(),
            version: "3.3.96".to_string(),
            memory: "2Gi".to_string(),
            cpu: "1".to_string(),
            timeout_secs: timeout,
            region: "us-east1".to_string(),
        },
        disk_mb: 2048,
        enhanced_monitoring: false,
        execution_role: None,
        network: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4))
}

fn manager(platform: &MemoryPlatform) -> DeploymentManager {
    DeploymentManager::new(Arc::new(platform.clone())).with_retry(fast_retry())
}

#[tokio::test]
async fn second_ensure_reuses_worker() {
    let platform = MemoryPlatform::new();
    let manager = manager(&platform);

    let first = manager.ensure_worker(&spec(1900)).await.unwrap();
    assert!(!first.already_existed);
    assert_eq!(first.worker.name, "remotion--3-3-96--mem2gi--cpu1-0--t-1900");

    let second = manager.ensure_worker(&spec(1900)).await.unwrap();
    assert!(second.already_existed);
    assert_eq!(second.worker, first.worker);
    assert_eq!(platform.create_calls(), 1);
}

#[tokio::test]
async fn different_config_gets_new_worker() {
    let platform = MemoryPlatform::new();
    let manager = manager(&platform);
    manager.ensure_worker(&spec(1900)).await.unwrap();
    let other = manager.ensure_worker(&spec(300)).await.unwrap();
    assert!(!other.already_existed);
    assert_eq!(manager.list_workers("us-east1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_ensure_creates_once() {
    let platform = MemoryPlatform::with_create_delay(Duration::from_millis(20));
    let manager = Arc::new(manager(&platform));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.ensure_worker(&spec(1900)).await.unwrap()
        }));
    }
    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().already_existed {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(platform.created(), 1);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let platform = MemoryPlatform::new();
    platform.fail_next_creates([
        PlatformError::Throttled("rate".into()),
        PlatformError::Conflict("update in progress".into()),
    ]);
    let ensured = manager(&platform).ensure_worker(&spec(300)).await.unwrap();
    assert!(!ensured.already_existed);
    assert_eq!(platform.create_calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_are_provisioning_failed() {
    let platform = MemoryPlatform::new();
    platform.fail_next_creates(vec![PlatformError::Throttled("rate".into()); 3]);
    let err = manager(&platform).ensure_worker(&spec(300)).await.unwrap_err();
    match err {
        DeployError::ProvisioningFailed { name, cause } => {
            assert_eq!(name, "remotion--3-3-96--mem2gi--cpu1-0--t-300");
            assert_eq!(cause, PlatformError::Throttled("rate".into()));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(platform.created(), 0);
}

#[tokio::test]
async fn quota_is_surfaced_without_retry() {
    let platform = MemoryPlatform::new();
    platform.fail_next_creates([PlatformError::QuotaExceeded("functions".into())]);
    let err = manager(&platform).ensure_worker(&spec(300)).await.unwrap_err();
    assert!(matches!(err, DeployError::QuotaExceeded(_)));
    assert_eq!(platform.create_calls(), 1);
}

#[tokio::test]
async fn unsupported_config_fails_before_platform_call() {
    let platform = MemoryPlatform::new();
    let mut s = spec(300);
    s.identity.region = "ap-east-1".to_string();
    s.enhanced_monitoring = true;
    let err = manager(&platform).ensure_worker(&s).await.unwrap_err();
    assert!(matches!(err, DeployError::Unsupported(_)));
    assert_eq!(platform.create_calls(), 0);
}

#[tokio::test]
async fn invalid_identity_is_invalid_config() {
    let platform = MemoryPlatform::new();
    let err = manager(&platform).ensure_worker(&spec(0)).await.unwrap_err();
    assert!(matches!(err, DeployError::InvalidConfig(_)));
}

#[tokio::test]
async fn bulk_delete_continues_past_failure() {
    let platform = MemoryPlatform::new();
    let manager = manager(&platform);
    let mut names = Vec::new();
    for timeout in [100, 200, 300] {
        names.push(manager.ensure_worker(&spec(timeout)).await.unwrap().worker.name);
    }
    platform.fail_delete(&names[1]);

    let outcomes = manager.delete_all_workers("us-east1").await.unwrap();
    assert_eq!(outcomes.len(), 3);
    let failed: Vec<_> = outcomes.iter().filter(|o| o.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, names[1]);

    let remaining = manager.list_workers("us-east1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, names[1]);
}

#[tokio::test]
async fn delete_missing_worker_is_not_found() {
    let platform = MemoryPlatform::new();
    let err = manager(&platform)
        .delete_worker("us-east1", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::NotFound { .. }));
}

#[tokio::test]
async fn local_platform_persists_and_deduplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.redb");
    {
        let state = StateStore::open(&path).unwrap();
        let platform = LocalPlatform::new(state, Some("http://127.0.0.1:9000".into()), "file:///logs");
        let manager = DeploymentManager::new(Arc::new(platform));
        let ensured = manager.ensure_worker(&spec(600)).await.unwrap();
        assert!(!ensured.already_existed);
        assert_eq!(ensured.worker.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    }

    let state = StateStore::open(&path).unwrap();
    let platform = LocalPlatform::new(state, None, "file:///logs");
    let manager = DeploymentManager::new(Arc::new(platform));
    let again = manager.ensure_worker(&spec(600)).await.unwrap();
    assert!(again.already_existed);
    assert_eq!(
        manager.logs_url("us-east1", &again.worker.name),
        format!("file:///logs/us-east1/{}", again.worker.name)
    );
}
