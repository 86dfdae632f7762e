//! # Webhook Event Handling
//!
//! Turns verified GitHub deliveries into sync triggers.
//!
//! ## Overview
//!
//! Only `push` and `pull_request` events can trigger a sync, and only when
//! the payload names a tracked repository and its tracked branch. Everything
//! else is acknowledged without side effects, so the sender never retries
//! deliveries this core deliberately ignores.
//!
//! Signature verification strictly precedes payload parsing: an unverified
//! body is never fed to the JSON parser.

use crate::error::{Result, WebhookError};
use crate::signature::verify_signature;
use core_admission::CallerIdentity;
use core_sync::{RepoRecord, RepositoryStore, SyncOrchestrator, SyncOrigin};
use core_tasks::TaskId;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Push event payload, reduced to the fields sync triggering needs.
#[derive(Debug, Deserialize)]
struct PushEvent {
    /// Full ref that was pushed, e.g. `refs/heads/main`.
    #[serde(rename = "ref")]
    git_ref: String,
    repository: RepositoryInfo,
}

/// Pull request event payload, reduced likewise.
#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    pull_request: PullRequestInfo,
    repository: RepositoryInfo,
}

#[derive(Debug, Deserialize)]
struct PullRequestInfo {
    #[serde(default)]
    merged: bool,
    base: BranchRef,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    full_name: String,
}

/// What a delivery resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event matched a tracked repository and branch; a sync is running.
    SyncTriggered {
        /// Task tracking the triggered sync.
        task_id: TaskId,
        /// Repository being synced.
        repo_id: String,
    },
    /// Verified but irrelevant: wrong event type, untracked repository or
    /// a different branch. Acknowledged without side effects.
    Ignored,
}

/// Ingestion point for GitHub webhook deliveries.
pub struct WebhookHandler {
    secret: Option<String>,
    repos: Arc<dyn RepositoryStore>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl WebhookHandler {
    /// Creates a handler. `secret` is the shared webhook secret; when `None`,
    /// every delivery is rejected because it cannot be authenticated.
    pub fn new(
        secret: Option<String>,
        repos: Arc<dyn RepositoryStore>,
        orchestrator: Arc<SyncOrchestrator>,
    ) -> Self {
        Self {
            secret,
            repos,
            orchestrator,
        }
    }

    /// Processes one delivery.
    ///
    /// `event_name` is the `X-GitHub-Event` header, `signature` the
    /// `X-Hub-Signature-256` header and `raw_body` the request body exactly
    /// as received. The boundary layer must hand over the original bytes; a
    /// re-serialized body would fail verification.
    ///
    /// # Errors
    ///
    /// - `IngestionDisabled` when no shared secret is configured
    /// - `SignatureRejected` before anything parses the body
    /// - `InvalidPayload` when a verified `push`/`pull_request` body does not
    ///   deserialize
    /// - `Sync` when a matched event fails to start its sync
    pub async fn handle(
        &self,
        event_name: &str,
        signature: Option<&str>,
        raw_body: &[u8],
        peer_ip: IpAddr,
    ) -> Result<WebhookOutcome> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(WebhookError::IngestionDisabled)?;

        // Authentication first. The body is opaque bytes until this passes.
        if !verify_signature(secret, raw_body, signature) {
            return Err(WebhookError::SignatureRejected);
        }

        let matched = match event_name {
            "push" => self.match_push(raw_body).await?,
            "pull_request" => self.match_pull_request(raw_body).await?,
            other => {
                debug!(event = other, "ignoring webhook event type");
                None
            }
        };

        let repo = match matched {
            Some(repo) => repo,
            None => return Ok(WebhookOutcome::Ignored),
        };

        let caller = CallerIdentity::anonymous(peer_ip);
        let task_id = self
            .orchestrator
            .start_sync(&repo.id, &caller, SyncOrigin::Webhook)
            .await?;

        info!(repo_id = %repo.id, %task_id, event = event_name, "webhook triggered sync");
        Ok(WebhookOutcome::SyncTriggered {
            task_id,
            repo_id: repo.id,
        })
    }

    /// A push matches when it lands on a tracked repository's tracked branch.
    async fn match_push(&self, raw_body: &[u8]) -> Result<Option<RepoRecord>> {
        let event: PushEvent = parse(raw_body)?;

        let repo = match self.lookup(&event.repository.full_name).await? {
            Some(repo) => repo,
            None => return Ok(None),
        };

        if event.git_ref != format!("refs/heads/{}", repo.branch) {
            debug!(
                repo_id = %repo.id,
                pushed = %event.git_ref,
                tracked = %repo.branch,
                "push to untracked branch"
            );
            return Ok(None);
        }

        Ok(Some(repo))
    }

    /// A pull request matches when it was just merged into the tracked
    /// branch. Opened, synchronized or closed-without-merge events carry no
    /// new content.
    async fn match_pull_request(&self, raw_body: &[u8]) -> Result<Option<RepoRecord>> {
        let event: PullRequestEvent = parse(raw_body)?;

        if event.action != "closed" || !event.pull_request.merged {
            return Ok(None);
        }

        let repo = match self.lookup(&event.repository.full_name).await? {
            Some(repo) => repo,
            None => return Ok(None),
        };

        if event.pull_request.base.branch != repo.branch {
            return Ok(None);
        }

        Ok(Some(repo))
    }

    async fn lookup(&self, full_name: &str) -> Result<Option<RepoRecord>> {
        let repo = self.repos.find_by_full_name(full_name).await?;
        if repo.is_none() {
            debug!(full_name, "webhook for untracked repository");
        }
        Ok(repo)
    }
}

fn parse<'a, T: Deserialize<'a>>(raw_body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(raw_body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}
