//! Trello webhook payloads, signature verification and REST client.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::Transient;
use hmac::{Hmac, Mac};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-trello-webhook";

fn signature_mac(body: &[u8], callback_url: &str, secret: &str) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    mac.update(callback_url.as_bytes());
    Some(mac)
}

/// Verify a Trello webhook signature.
///
/// Trello signs `body || callback_url` with HMAC-SHA1 keyed by the app
/// secret and sends the base64 digest.
#[must_use]
pub fn verify_webhook_signature(
    body: &[u8],
    callback_url: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Some(mac) = signature_mac(body, callback_url, secret) else {
        return false;
    };
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&expected).into()
}

/// Sign a payload the way Trello does.
#[must_use]
pub fn sign_webhook(body: &[u8], callback_url: &str, secret: &str) -> Option<String> {
    signature_mac(body, callback_url, secret).map(|mac| BASE64.encode(mac.finalize().into_bytes()))
}

/// Webhook delivery body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: Option<Action>,
    /// The watched model (usually the board)
    #[serde(default)]
    pub model: Option<NamedModel>,
}

/// The action that triggered the delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub board: Option<NamedModel>,
    /// Previous values of changed fields (updates only)
    #[serde(default)]
    pub old: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "lenient_labels")]
    pub labels: Vec<Label>,
}

/// Label lists may be `null` or hold `null` entries; both are skipped.
fn lenient_labels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Label>, D::Error> {
    let labels = Option::<Vec<Option<Label>>>::deserialize(deserializer)?;
    Ok(labels.into_iter().flatten().flatten().collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Why a card event triggers a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    CardCreated,
    DescriptionChanged,
}

/// A card event that should produce a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEvent {
    pub trigger: Trigger,
    /// Trello action id, when present
    pub action_id: Option<String>,
    pub card_id: String,
    pub title: String,
    /// Task description
    pub description: String,
    /// Lowercased, trimmed label names
    pub labels: Vec<String>,
    /// Board name from the payload, if it carried one
    pub board_name: Option<String>,
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl WebhookPayload {
    /// Read a delivery from already-parsed JSON. Bodies that do not have the
    /// expected shape yield `None` and are treated as irrelevant.
    #[must_use]
    pub fn from_json(value: Value) -> Option<Self> {
        serde_json::from_value(value)
            .map_err(|e| debug!("Webhook body has an unexpected shape: {e}"))
            .ok()
    }

    /// Extract the card event, or `None` for deliveries that need no run.
    ///
    /// Relevant actions are `createCard` and an `updateCard` that changed
    /// the description. The card needs an id, a title and a description.
    #[must_use]
    pub fn card_event(&self) -> Option<CardEvent> {
        let action = self.action.as_ref()?;
        let trigger = match action.kind.as_str() {
            "createCard" => Trigger::CardCreated,
            "updateCard"
                if action
                    .data
                    .old
                    .as_ref()
                    .is_some_and(|old| old.contains_key("desc")) =>
            {
                Trigger::DescriptionChanged
            }
            other => {
                debug!(action = %other, "Ignoring irrelevant Trello action");
                return None;
            }
        };

        let card = action.data.card.as_ref()?;
        let card_id = trimmed(card.id.as_ref())?;
        let title = trimmed(card.name.as_ref())?;
        let description = trimmed(card.desc.as_ref())?;

        let labels = card
            .labels
            .iter()
            .filter_map(|l| trimmed(l.name.as_ref()))
            .map(|l| l.to_lowercase())
            .collect();

        let board_name = action
            .data
            .board
            .as_ref()
            .and_then(|b| trimmed(b.name.as_ref()))
            .or_else(|| self.model.as_ref().and_then(|m| trimmed(m.name.as_ref())));

        Some(CardEvent {
            trigger,
            action_id: trimmed(action.id.as_ref()),
            card_id,
            title,
            description,
            labels,
            board_name,
        })
    }
}

/// Errors from the Trello REST API.
#[derive(Debug, Error)]
pub enum TrelloError {
    #[error("Trello request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trello API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Trello credentials are not configured")]
    NotConfigured,

    #[error("invalid Trello API URL: {0}")]
    InvalidUrl(String),
}

impl Transient for TrelloError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Card-side collaborator: board lookup and outcome comments.
#[async_trait]
pub trait CardNotifier: Send + Sync {
    /// Name of the board a card belongs to.
    async fn board_name(&self, card_id: &str) -> Result<Option<String>, TrelloError>;

    /// Post a comment on a card.
    async fn post_comment(&self, card_id: &str, text: &str) -> Result<(), TrelloError>;
}

#[derive(Debug, Deserialize)]
struct Board {
    #[serde(default)]
    name: Option<String>,
}

/// Trello REST client authenticated with key and token.
#[derive(Debug, Clone)]
pub struct TrelloClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl TrelloClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TrelloError> {
        let base_url =
            Url::parse(base_url).map_err(|e| TrelloError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TrelloError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credentials: api_key.zip(token),
        })
    }

    /// Whether key and token are both set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, TrelloError> {
        let (key, token) = self.credentials.as_ref().ok_or(TrelloError::NotConfigured)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TrelloError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("token", token);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TrelloError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TrelloError::Api {
            status: status.as_u16(),
            message: common::truncate_chars(&body, 300),
        })
    }
}

#[async_trait]
impl CardNotifier for TrelloClient {
    async fn board_name(&self, card_id: &str) -> Result<Option<String>, TrelloError> {
        let url = self.url(&["cards", card_id, "board"])?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let board: Board = Self::check(response).await?.json().await?;
        Ok(trimmed(board.name.as_ref()))
    }

    async fn post_comment(&self, card_id: &str, text: &str) -> Result<(), TrelloError> {
        let mut url = self.url(&["cards", card_id, "actions", "comments"])?;
        url.query_pairs_mut().append_pair("text", text);
        let response = self.client.post(url).send().await?;
        Self::check(response).await?;
        debug!(card_id = %card_id, "Posted Trello comment");
        Ok(())
    }
}
