//! The seam between orchestration and the actual Git/webhook work.

use crate::status::RepoRecord;
use async_trait::async_trait;

/// Outcome of one backend call.
///
/// Backend errors are opaque operator-facing strings; the orchestrator copies
/// them verbatim into the task message and the repository's `error_msg`
/// without interpreting them.
pub type BackendResult = std::result::Result<(), String>;

/// External collaborator performing the slow parts of a sync.
///
/// Implementations talk to the Git remote and the hosting provider's API and
/// may take minutes. A backend that detects partial issues (for example a
/// missing webhook it could not re-register) records them itself by setting
/// the repository status to `Warning` through the [`RepositoryStore`]; the
/// orchestrator preserves that status on completion.
///
/// [`RepositoryStore`]: crate::status::RepositoryStore
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Fetch and merge remote content for the repository.
    async fn sync_repository(&self, repo: &RepoRecord) -> BackendResult;

    /// Verify the repository's webhook registration with the remote.
    ///
    /// Runs after a successful content sync; a failure here still fails the
    /// whole sync, because webhook configuration is part of sync
    /// completeness.
    async fn check_webhooks(&self, repo: &RepoRecord) -> BackendResult;
}
