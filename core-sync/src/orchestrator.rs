//! # Sync Orchestrator
//!
//! Composes admission control, resource locking, the task registry and the
//! repository status state machine into one entry point for triggering a
//! repository sync.
//!
//! ## Request path
//!
//! [`SyncOrchestrator::start_sync`] runs these steps in order:
//!
//! 1. Admission check (webhook-origin syncs are exempt)
//! 2. Repository lookup and ownership check
//! 3. Task record creation (`pending`)
//! 4. Per-repository lock acquisition, optionally bounded by a wait timeout
//! 5. Repository status flips to `syncing`
//! 6. The actual work is handed to a detached, supervised background unit
//! 7. The caller gets the task ID back immediately
//!
//! The lock guard moves into the background unit, so release happens when the
//! unit's future is dropped: on success, on failure, on panic and on timeout
//! abort alike. Nothing ever unlocks by hand.
//!
//! ## Supervision
//!
//! The background unit runs under its own `tokio::spawn`, awaited by a
//! supervisor with an overall timeout. Panics surface as a `JoinError` and a
//! hung backend is aborted; both become `failed` task and repository state,
//! so `syncing` is never a terminal observation.

use crate::backend::SyncBackend;
use crate::status::{RepoRecord, RepoStatus, RepositoryStore};
use crate::{Result, SyncError};
use core_admission::{AdmissionControl, CallerIdentity};
use core_locks::LockManager;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_tasks::{TaskId, TaskKind, TaskRegistry, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What triggered a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOrigin {
    /// A user asked for it through the API.
    User,
    /// A verified webhook event matched a tracked repository.
    ///
    /// Webhook syncs bypass per-caller rate limiting (the delivery is
    /// authenticated by signature, not caller identity) but are still
    /// serialized by the per-repository lock.
    Webhook,
}

impl SyncOrigin {
    /// Get the string representation used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOrigin::User => "user",
            SyncOrigin::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for SyncOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timeouts governing sync execution.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound on one whole sync run. A backend still busy past this is
    /// aborted and the sync recorded as failed.
    pub sync_timeout: Duration,
    /// Bound on how long `start_sync` waits for the repository lock. `None`
    /// waits indefinitely behind the in-flight sync.
    pub lock_wait_timeout: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(core_runtime::config::DEFAULT_SYNC_TIMEOUT_SECS),
            lock_wait_timeout: None,
        }
    }
}

impl From<&CoreConfig> for SyncSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            sync_timeout: Duration::from_secs(config.sync_timeout_secs),
            lock_wait_timeout: config.lock_wait_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Bookkeeping for one in-flight sync.
struct ActiveSync {
    task_id: TaskId,
    handle: JoinHandle<()>,
}

/// Entry point for triggering repository syncs.
///
/// Cheap to clone into background units; all state lives behind `Arc`s.
pub struct SyncOrchestrator {
    settings: SyncSettings,
    admission: Arc<AdmissionControl>,
    locks: Arc<LockManager>,
    tasks: TaskRegistry,
    repos: Arc<dyn RepositoryStore>,
    backend: Arc<dyn SyncBackend>,
    events: EventBus,
    active: Arc<Mutex<HashMap<String, ActiveSync>>>,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: SyncSettings,
        admission: Arc<AdmissionControl>,
        locks: Arc<LockManager>,
        tasks: TaskRegistry,
        repos: Arc<dyn RepositoryStore>,
        backend: Arc<dyn SyncBackend>,
        events: EventBus,
    ) -> Self {
        Self {
            settings,
            admission,
            locks,
            tasks,
            repos,
            backend,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Clones the orchestrator's shared handles for a background unit.
    fn clone_for_task(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            admission: Arc::clone(&self.admission),
            locks: Arc::clone(&self.locks),
            tasks: self.tasks.clone(),
            repos: Arc::clone(&self.repos),
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
            active: Arc::clone(&self.active),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Triggers a sync for `repo_id` and returns the task to poll.
    ///
    /// Runs the ordered request path documented on the module; by the time
    /// this returns the task exists, the repository is `syncing` and the
    /// work is detached. Progress and outcome are observed through the task
    /// record, never through this call.
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` after [`shutdown`](Self::shutdown) has been called
    /// - `Admission` when a user-origin caller is out of tokens
    /// - `RepositoryNotFound` / `Unauthenticated` / `NotOwner` from the
    ///   precondition checks
    /// - `Busy` when a lock wait timeout is configured and expires
    pub async fn start_sync(
        &self,
        repo_id: &str,
        caller: &CallerIdentity,
        origin: SyncOrigin,
    ) -> Result<TaskId> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::ShuttingDown);
        }

        // Step 1: admission. Rejection here has no side effects at all.
        if origin == SyncOrigin::User {
            let path = format!("/api/repos/{}/sync", repo_id);
            self.admission.check(&path, caller)?;
        }

        // Step 2: the repository must exist and, for user-origin syncs,
        // belong to the caller. Webhook syncs run on the owner's behalf.
        let repo = self
            .repos
            .find_by_id(repo_id)
            .await?
            .ok_or_else(|| SyncError::RepositoryNotFound {
                repo_id: repo_id.to_string(),
            })?;

        let user_id = match origin {
            SyncOrigin::User => {
                let user_id = caller.user_id.clone().ok_or(SyncError::Unauthenticated)?;
                if repo.owner_id != user_id {
                    return Err(SyncError::NotOwner {
                        repo_id: repo_id.to_string(),
                    });
                }
                user_id
            }
            SyncOrigin::Webhook => repo.owner_id.clone(),
        };

        // Step 3: the task record exists before the lock is touched, so the
        // caller has something to poll even when a later step fails.
        let task = self.tasks.create(TaskKind::Sync, repo_id, &user_id).await?;

        // Step 4: per-repository lock. Without a wait timeout this parks
        // behind an in-flight sync for the same repository.
        let lock = self.locks.lock_for(repo_id).await;
        let guard = match self.settings.lock_wait_timeout {
            Some(wait) => match timeout(wait, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    self.fail_task(&task.id, "Timed out waiting for the repository lock")
                        .await;
                    return Err(SyncError::Busy {
                        repo_id: repo_id.to_string(),
                    });
                }
            },
            None => lock.lock_owned().await,
        };

        // Step 5: the repository is now visibly syncing. The supervisor
        // guarantees a later transition out, whatever happens.
        if let Err(e) = self
            .repos
            .set_status(repo_id, RepoStatus::Syncing, None)
            .await
        {
            self.fail_task(&task.id, &e.to_string()).await;
            return Err(e);
        }

        info!(task_id = %task.id, repo_id, %origin, "sync started");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Started {
                task_id: task.id.to_string(),
                repo_id: repo_id.to_string(),
                origin: origin.as_str().to_string(),
            }))
            .ok();

        // Step 6: detach. The guard moves into the background unit so the
        // lock is released exactly when that unit's future dies. The map
        // lock is taken before the spawn so the unit cannot remove its
        // entry before it is inserted.
        let supervisor = self.clone_for_task();
        let task_id = task.id;
        let repo_for_task = repo.clone();

        let mut active = self.active.lock().await;
        let handle = tokio::spawn(async move {
            supervisor.supervise(task_id, repo_for_task, guard).await;
        });
        active.insert(repo_id.to_string(), ActiveSync { task_id, handle });

        Ok(task_id)
    }

    /// Runs the background unit under a timeout and converts every way it
    /// can die into terminal task and repository state.
    async fn supervise(self, task_id: TaskId, repo: RepoRecord, guard: OwnedMutexGuard<()>) {
        let repo_id = repo.id.clone();

        let worker = self.clone_for_task();
        let mut inner = tokio::spawn(async move { worker.execute(task_id, repo, guard).await });

        let outcome = match timeout(self.settings.sync_timeout, &mut inner).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    Err("Sync task panicked".to_string())
                } else {
                    Err("Sync task was cancelled".to_string())
                }
            }
            Err(_) => {
                // Aborting drops the unit's future, which releases the lock.
                inner.abort();
                let _ = inner.await;
                Err(format!(
                    "Sync timed out after {} seconds",
                    self.settings.sync_timeout.as_secs()
                ))
            }
        };

        match outcome {
            Ok(with_warnings) => self.complete(task_id, &repo_id, with_warnings).await,
            Err(message) => self.fail(task_id, &repo_id, &message).await,
        }

        // A successor queued on the repo lock may have registered its own
        // entry while this run was writing its terminal state; remove only
        // this run's entry, never the successor's.
        let mut active = self.active.lock().await;
        if active.get(&repo_id).map(|sync| sync.task_id) == Some(task_id) {
            active.remove(&repo_id);
        }
    }

    /// The background unit: task to `running`, backend work, terminal
    /// status derivation. Failure messages come back verbatim.
    async fn execute(
        self,
        task_id: TaskId,
        repo: RepoRecord,
        guard: OwnedMutexGuard<()>,
    ) -> std::result::Result<bool, String> {
        // Held for the whole unit; dropped on return, panic or abort.
        let _guard = guard;

        self.tasks
            .update_status(&task_id, TaskStatus::Running, "Sync in progress")
            .await
            .map_err(|e| e.to_string())?;

        self.backend.sync_repository(&repo).await?;
        self.backend.check_webhooks(&repo).await?;

        // The backend may have recorded partial issues as `warning`; keep it.
        let status = self
            .repos
            .status_of(&repo.id)
            .await
            .map_err(|e| e.to_string())?;
        let with_warnings = status == RepoStatus::Warning;
        if !with_warnings {
            self.repos
                .set_status(&repo.id, RepoStatus::Synced, None)
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(with_warnings)
    }

    async fn complete(&self, task_id: TaskId, repo_id: &str, with_warnings: bool) {
        let message = if with_warnings {
            "Sync completed with warnings"
        } else {
            "Sync completed"
        };

        if let Err(e) = self
            .tasks
            .update_status(&task_id, TaskStatus::Completed, message)
            .await
        {
            error!(%task_id, repo_id, error = %e, "could not record sync completion");
        }

        info!(%task_id, repo_id, with_warnings, "sync completed");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                task_id: task_id.to_string(),
                repo_id: repo_id.to_string(),
                with_warnings,
            }))
            .ok();
    }

    async fn fail(&self, task_id: TaskId, repo_id: &str, message: &str) {
        if let Err(e) = self
            .repos
            .set_status(repo_id, RepoStatus::Failed, Some(message))
            .await
        {
            error!(repo_id, error = %e, "could not record repository failure");
        }
        self.fail_task(&task_id, message).await;

        error!(%task_id, repo_id, message, "sync failed");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                task_id: task_id.to_string(),
                repo_id: repo_id.to_string(),
                message: message.to_string(),
            }))
            .ok();
    }

    async fn fail_task(&self, task_id: &TaskId, message: &str) {
        if let Err(e) = self
            .tasks
            .update_status(task_id, TaskStatus::Failed, message)
            .await
        {
            error!(%task_id, error = %e, "could not record task failure");
        }
    }

    /// Number of syncs currently in flight.
    pub async fn active_sync_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Whether a sync for `repo_id` is in flight.
    pub async fn is_syncing(&self, repo_id: &str) -> bool {
        self.active.lock().await.contains_key(repo_id)
    }

    /// Stops accepting new syncs and waits for in-flight ones to finish.
    ///
    /// In-flight work is drained, not cancelled; each sync still reaches a
    /// terminal state under its own timeout.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let drained: Vec<(String, ActiveSync)> = {
            let mut active = self.active.lock().await;
            active.drain().collect()
        };

        for (repo_id, sync) in drained {
            debug!(repo_id, task_id = %sync.task_id, "waiting for in-flight sync");
            if let Err(e) = sync.handle.await {
                error!(repo_id, error = %e, "sync supervisor did not finish cleanly");
            }
        }
    }
}
