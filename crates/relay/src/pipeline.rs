//! One run: card event in, commits and a card comment out.

use std::sync::Arc;

use codegen::{recover, CodegenError, PromptLibrary, ProviderRegistry, RecoveryStrategy};
use common::{truncate_chars, RetryPolicy, RunReport, Transient};
use repo_sync::{RepositoryRemote, SnapshotBuilder, SnapshotOptions, SyncEngine, SyncError};
use thiserror::Error;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::comment;
use crate::project::{project_type, repository_name, FALLBACK_BOARD_NAME};
use crate::trello::{CardEvent, CardNotifier};

/// Characters of the raw response kept in debug logs.
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Failure classes reported on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown or unconfigured provider, broken templates
    Configuration,
    /// Provider or repository unreachable after retries
    Transport,
    /// The response could not be turned into operations
    MalformedResponse,
    /// A hash-conditioned write lost a race
    RemoteConflict,
    /// Repository host rejected a request
    Repository,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed_response",
            Self::RemoteConflict => "remote_conflict",
            Self::Repository => "repository",
        }
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Repository(#[from] SyncError),
}

impl RunError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Codegen(e) if e.is_configuration() => ErrorKind::Configuration,
            Self::Codegen(e) if e.is_malformed_response() => ErrorKind::MalformedResponse,
            Self::Codegen(_) => ErrorKind::Transport,
            Self::Repository(e) if e.is_conflict() => ErrorKind::RemoteConflict,
            Self::Repository(e) if e.is_transient() => ErrorKind::Transport,
            Self::Repository(_) => ErrorKind::Repository,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub repository: String,
    pub repository_url: String,
    pub project_type: String,
    pub strategy: RecoveryStrategy,
    pub report: RunReport,
    /// Comment posted on the card
    pub comment: String,
}

/// Per-deployment run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Provider registry key
    pub provider: String,
    /// Project type forced for every card
    pub project_type: Option<String>,
    pub retry: RetryPolicy,
    pub snapshot: SnapshotOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            provider: "neuro".to_string(),
            project_type: None,
            retry: RetryPolicy::default(),
            snapshot: SnapshotOptions::default(),
        }
    }
}

/// Executes runs for admitted card events.
pub struct Relay {
    providers: Arc<ProviderRegistry>,
    prompts: Arc<PromptLibrary>,
    notifier: Arc<dyn CardNotifier>,
    snapshots: SnapshotBuilder,
    engine: SyncEngine,
    options: RunOptions,
}

impl Relay {
    pub fn new(
        remote: Arc<dyn RepositoryRemote>,
        notifier: Arc<dyn CardNotifier>,
        providers: Arc<ProviderRegistry>,
        prompts: Arc<PromptLibrary>,
        options: RunOptions,
    ) -> Self {
        let snapshots =
            SnapshotBuilder::new(remote.clone(), options.retry).with_options(options.snapshot);
        let engine = SyncEngine::new(remote, options.retry);
        Self {
            providers,
            prompts,
            notifier,
            snapshots,
            engine,
            options,
        }
    }

    /// Run the pipeline for one card and post exactly one outcome comment.
    pub async fn run(&self, event: CardEvent) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            %run_id,
            card_id = %event.card_id,
            repo = field::Empty
        );

        async {
            info!(title = %event.title, trigger = ?event.trigger, "Run started");
            let result = self.execute(&event).await;
            let text = match &result {
                Ok(summary) => {
                    info!(
                        succeeded = summary.report.succeeded_count(),
                        failed = summary.report.failed_count(),
                        "Run finished"
                    );
                    summary.comment.clone()
                }
                Err(e) => {
                    error!(kind = e.kind().as_str(), "Run failed: {}", e);
                    comment::failure(e.kind(), &e.to_string())
                }
            };
            self.notify(&event.card_id, &text).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, event: &CardEvent) -> Result<RunSummary, RunError> {
        let provider = self.providers.resolve(&self.options.provider)?;

        let board = self.board_name(event).await;
        let project_type = project_type(
            self.options.project_type.as_deref(),
            &event.labels,
            &board,
        );
        let repo = repository_name(&board, &project_type);
        Span::current().record("repo", repo.as_str());
        info!(board = %board, project_type = %project_type, "Resolved target repository");

        let description = format!("Generated from Trello board \"{board}\"");
        let prepared = self.snapshots.ensure_repository(&repo, &description).await?;
        let snapshot = self.snapshots.capture(&prepared).await?;

        let prompt = self
            .prompts
            .build(&event.description, &snapshot, &project_type)?;

        let raw = self
            .options
            .retry
            .run("generate code", || provider.generate_code(&prompt))
            .await?;
        debug!(
            provider = provider.name(),
            model = provider.model(),
            chars = raw.len(),
            preview = %truncate_chars(&raw, RESPONSE_PREVIEW_CHARS),
            "Received provider response"
        );

        let recovered = recover(&raw)?;
        info!(
            strategy = %recovered.strategy,
            operations = recovered.operations.len(),
            dropped = recovered.dropped.len(),
            "Recovered operations"
        );

        let report = self
            .engine
            .apply(
                &prepared.info.name,
                prepared.branch(),
                &recovered.operations,
                &event.title,
            )
            .await;

        let comment = comment::success(&project_type, &prepared.info.html_url, &report, &recovered);
        Ok(RunSummary {
            repository: prepared.info.name.clone(),
            repository_url: prepared.info.html_url.clone(),
            project_type,
            strategy: recovered.strategy,
            report,
            comment,
        })
    }

    /// Board name from the event, then from Trello, then the fallback.
    async fn board_name(&self, event: &CardEvent) -> String {
        if let Some(name) = &event.board_name {
            return name.clone();
        }
        let notifier = &self.notifier;
        let looked_up = self
            .options
            .retry
            .run("look up board", || notifier.board_name(&event.card_id))
            .await;
        match looked_up {
            Ok(Some(name)) => name,
            Ok(None) => FALLBACK_BOARD_NAME.to_string(),
            Err(e) => {
                warn!("Board lookup failed, using '{}': {}", FALLBACK_BOARD_NAME, e);
                FALLBACK_BOARD_NAME.to_string()
            }
        }
    }

    async fn notify(&self, card_id: &str, text: &str) {
        let notifier = &self.notifier;
        let posted = self
            .options
            .retry
            .run("post comment", || notifier.post_comment(card_id, text))
            .await;
        if let Err(e) = posted {
            error!("Failed to post outcome comment: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let unknown = RunError::from(CodegenError::UnknownProvider {
            name: "x".into(),
            available: "neuro".into(),
        });
        assert_eq!(unknown.kind(), ErrorKind::Configuration);

        let unrecoverable = RunError::from(CodegenError::Unrecoverable {
            preview: "hello".into(),
        });
        assert_eq!(unrecoverable.kind(), ErrorKind::MalformedResponse);

        let overloaded = RunError::from(CodegenError::Api {
            status: 503,
            message: "busy".into(),
        });
        assert_eq!(overloaded.kind(), ErrorKind::Transport);

        let limited = RunError::from(SyncError::RateLimited {
            retry_after: std::time::Duration::from_secs(1),
        });
        assert_eq!(limited.kind(), ErrorKind::Transport);

        let forbidden = RunError::from(SyncError::Api {
            status: 403,
            message: "Resource not accessible".into(),
        });
        assert_eq!(forbidden.kind(), ErrorKind::Repository);
    }
}
