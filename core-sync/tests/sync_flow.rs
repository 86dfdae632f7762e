//! End-to-end orchestration tests exercising the full sync path with real
//! SQLite-backed stores and scripted backends.

use async_trait::async_trait;
use core_admission::{AdmissionControl, CallerIdentity};
use core_locks::LockManager;
use core_runtime::events::EventBus;
use core_sync::{
    BackendResult, RepoRecord, RepoStatus, RepositoryStore, SqliteRepositoryStore, SyncBackend,
    SyncError, SyncOrchestrator, SyncOrigin, SyncSettings,
};
use core_tasks::{SqliteTaskStore, Task, TaskId, TaskRegistry, TaskStatus};
use sqlx::SqlitePool;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const OWNER: &str = "user-1";

fn ip() -> IpAddr {
    "10.0.0.1".parse().unwrap()
}

fn owner_caller() -> CallerIdentity {
    CallerIdentity::user(OWNER, ip())
}

fn repo(id: &str) -> RepoRecord {
    RepoRecord {
        id: id.to_string(),
        owner_id: OWNER.to_string(),
        full_name: format!("acme/{}", id),
        branch: "main".to_string(),
        status: RepoStatus::Pending,
        error_msg: None,
    }
}

async fn seeded_stores(repos: &[RepoRecord]) -> (TaskRegistry, Arc<SqliteRepositoryStore>) {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    SqliteTaskStore::ensure_schema(&pool).await.unwrap();
    SqliteRepositoryStore::ensure_schema(&pool).await.unwrap();

    let store = SqliteRepositoryStore::new(pool.clone());
    for repo in repos {
        store.insert(repo).await.unwrap();
    }

    let tasks = TaskRegistry::new(Arc::new(SqliteTaskStore::new(pool)));
    (tasks, Arc::new(store))
}

fn orchestrator(
    settings: SyncSettings,
    tasks: TaskRegistry,
    repos: Arc<SqliteRepositoryStore>,
    backend: Arc<dyn SyncBackend>,
) -> Arc<SyncOrchestrator> {
    Arc::new(SyncOrchestrator::new(
        settings,
        Arc::new(AdmissionControl::new(20, 10).unwrap()),
        Arc::new(LockManager::new(16)),
        tasks,
        repos,
        backend,
        EventBus::default(),
    ))
}

async fn wait_for_terminal(tasks: &TaskRegistry, task_id: &TaskId) -> Task {
    for _ in 0..300 {
        let task = tasks.get(task_id).await.unwrap().unwrap();
        if task.status.is_terminal() {
            return task;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

/// Backend that counts how many syncs run at once.
struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
    runs: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SyncBackend for ConcurrencyProbe {
    async fn sync_repository(&self, _repo: &RepoRecord) -> BackendResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);

        sleep(Duration::from_millis(50)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_webhooks(&self, _repo: &RepoRecord) -> BackendResult {
        Ok(())
    }
}

/// Backend that holds the lock for a fixed time, then succeeds.
struct SlowBackend(Duration);

#[async_trait]
impl SyncBackend for SlowBackend {
    async fn sync_repository(&self, _repo: &RepoRecord) -> BackendResult {
        sleep(self.0).await;
        Ok(())
    }

    async fn check_webhooks(&self, _repo: &RepoRecord) -> BackendResult {
        Ok(())
    }
}

#[tokio::test]
async fn test_syncs_for_one_repository_never_overlap() {
    let (tasks, repos) = seeded_stores(&[repo("repo-1")]).await;
    let probe = Arc::new(ConcurrencyProbe::new());
    let orch = orchestrator(SyncSettings::default(), tasks.clone(), repos, probe.clone());

    let mut requests = Vec::new();
    for _ in 0..3 {
        let orch = Arc::clone(&orch);
        requests.push(tokio::spawn(async move {
            orch.start_sync("repo-1", &owner_caller(), SyncOrigin::User)
                .await
                .unwrap()
        }));
    }

    for handle in requests {
        let task_id = handle.await.unwrap();
        let task = wait_for_terminal(&tasks, &task_id).await;
        assert_eq!(task.status, TaskStatus::Completed);
    }

    assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
    assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_repositories_sync_concurrently() {
    let (tasks, repos) = seeded_stores(&[repo("repo-1"), repo("repo-2")]).await;
    let probe = Arc::new(ConcurrencyProbe::new());
    let orch = orchestrator(SyncSettings::default(), tasks.clone(), repos, probe.clone());

    let a = orch
        .start_sync("repo-1", &owner_caller(), SyncOrigin::User)
        .await
        .unwrap();
    let b = orch
        .start_sync("repo-2", &owner_caller(), SyncOrigin::User)
        .await
        .unwrap();

    wait_for_terminal(&tasks, &a).await;
    wait_for_terminal(&tasks, &b).await;

    assert_eq!(probe.max_seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lock_wait_timeout_reports_busy() {
    let (tasks, repos) = seeded_stores(&[repo("repo-1")]).await;
    let settings = SyncSettings {
        sync_timeout: Duration::from_secs(30),
        lock_wait_timeout: Some(Duration::from_millis(50)),
    };
    let orch = orchestrator(
        settings,
        tasks.clone(),
        repos,
        Arc::new(SlowBackend(Duration::from_millis(500))),
    );

    let first = orch
        .start_sync("repo-1", &owner_caller(), SyncOrigin::User)
        .await
        .unwrap();

    // The lock is held by the first sync; the second gives up after 50ms.
    let second = orch
        .start_sync("repo-1", &owner_caller(), SyncOrigin::User)
        .await;
    assert!(matches!(second, Err(SyncError::Busy { .. })));

    // The rejected attempt still left a pollable, failed task behind.
    let all = tasks.list_by_repository("repo-1").await.unwrap();
    assert_eq!(all.len(), 2);
    let rejected = all.iter().find(|t| t.id != first).unwrap();
    assert_eq!(rejected.status, TaskStatus::Failed);
    assert!(rejected.message.contains("lock"));

    let winner = wait_for_terminal(&tasks, &first).await;
    assert_eq!(winner.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_repository_is_never_stranded_in_syncing() {
    struct FailingBackend;

    #[async_trait]
    impl SyncBackend for FailingBackend {
        async fn sync_repository(&self, _repo: &RepoRecord) -> BackendResult {
            Err("network unreachable".to_string())
        }

        async fn check_webhooks(&self, _repo: &RepoRecord) -> BackendResult {
            Ok(())
        }
    }

    let (tasks, repos) = seeded_stores(&[repo("repo-1")]).await;
    let orch = orchestrator(
        SyncSettings::default(),
        tasks.clone(),
        repos.clone(),
        Arc::new(FailingBackend),
    );

    let task_id = orch
        .start_sync("repo-1", &owner_caller(), SyncOrigin::User)
        .await
        .unwrap();
    wait_for_terminal(&tasks, &task_id).await;

    let status = repos.status_of("repo-1").await.unwrap();
    assert_ne!(status, RepoStatus::Syncing);
    assert_eq!(status, RepoStatus::Failed);
}

#[tokio::test]
async fn test_repeated_syncs_after_failures_do_not_leak_the_lock() {
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncBackend for FlakyBackend {
        async fn sync_repository(&self, _repo: &RepoRecord) -> BackendResult {
            // Fail every other attempt.
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err("transient failure".to_string())
            } else {
                Ok(())
            }
        }

        async fn check_webhooks(&self, _repo: &RepoRecord) -> BackendResult {
            Ok(())
        }
    }

    let (tasks, repos) = seeded_stores(&[repo("repo-1")]).await;
    let orch = orchestrator(
        SyncSettings::default(),
        tasks.clone(),
        repos.clone(),
        Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
        }),
    );

    for attempt in 0..4 {
        let task_id = orch
            .start_sync("repo-1", &owner_caller(), SyncOrigin::User)
            .await
            .unwrap();
        let task = wait_for_terminal(&tasks, &task_id).await;

        if attempt % 2 == 0 {
            assert_eq!(task.status, TaskStatus::Failed);
        } else {
            assert_eq!(task.status, TaskStatus::Completed);
        }
    }

    assert_eq!(repos.status_of("repo-1").await.unwrap(), RepoStatus::Synced);
}
