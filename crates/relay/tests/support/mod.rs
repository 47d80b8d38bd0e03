//! Fakes shared by the relay integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use codegen::{AIProvider, CodegenError, CodegenResult, PromptLibrary, ProviderRegistry, ProviderSettings};
use common::RetryPolicy;
use relay::{CardEvent, CardNotifier, Relay, RunOptions, TrelloError, Trigger};
use repo_sync::{InMemoryRemote, RepositoryRemote};
use tokio::sync::Notify;

pub const OWNER: &str = "acme";

/// Provider returning a fixed response, or a fixed HTTP failure.
pub struct ScriptedProvider {
    response: Option<String>,
    failure_status: u16,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn responding(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            failure_status: 0,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            response: None,
            failure_status: status,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AIProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn generate_code(&self, prompt: &str) -> CodegenResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(CodegenError::Api {
                status: self.failure_status,
                message: "scripted failure".to_string(),
            }),
        }
    }
}

/// Notifier that records comments and answers board lookups.
#[derive(Default)]
pub struct RecordingNotifier {
    board: Option<String>,
    comments: Mutex<Vec<(String, String)>>,
    posted: Notify,
}

impl RecordingNotifier {
    pub fn with_board(board: &str) -> Self {
        Self {
            board: Some(board.to_string()),
            ..Self::default()
        }
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    /// Wait until at least `count` comments were posted.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, String)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.posted.notified();
                if self.comments.lock().unwrap().len() >= count {
                    break;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for comments");
        self.comments()
    }
}

#[async_trait]
impl CardNotifier for RecordingNotifier {
    async fn board_name(&self, _card_id: &str) -> Result<Option<String>, TrelloError> {
        Ok(self.board.clone())
    }

    async fn post_comment(&self, card_id: &str, text: &str) -> Result<(), TrelloError> {
        self.comments
            .lock()
            .unwrap()
            .push((card_id.to_string(), text.to_string()));
        self.posted.notify_waiters();
        Ok(())
    }
}

pub fn event(card_id: &str, board: Option<&str>, description: &str) -> CardEvent {
    CardEvent {
        trigger: Trigger::CardCreated,
        action_id: Some(format!("action-{card_id}")),
        card_id: card_id.to_string(),
        title: "Card title".to_string(),
        description: description.to_string(),
        labels: Vec::new(),
        board_name: board.map(str::to_string),
    }
}

pub struct Harness {
    pub remote: Arc<InMemoryRemote>,
    pub provider: Arc<ScriptedProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub relay: Arc<Relay>,
}

pub fn harness(
    remote: InMemoryRemote,
    provider: ScriptedProvider,
    notifier: RecordingNotifier,
    provider_name: &str,
) -> Harness {
    let remote = Arc::new(remote);
    let provider = Arc::new(provider);
    let notifier = Arc::new(notifier);

    let registry = ProviderRegistry::new(ProviderSettings::default());
    registry.register(provider.clone());

    let relay = Arc::new(Relay::new(
        remote.clone() as Arc<dyn RepositoryRemote>,
        notifier.clone(),
        Arc::new(registry),
        Arc::new(PromptLibrary::embedded().unwrap()),
        RunOptions {
            provider: provider_name.to_string(),
            retry: RetryPolicy::none(),
            ..RunOptions::default()
        },
    ));

    Harness {
        remote,
        provider,
        notifier,
        relay,
    }
}
