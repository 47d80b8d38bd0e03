//! Provider registry: resolves a configured name to a provider instance.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::error::{CodegenError, CodegenResult};
use crate::provider::{AIProvider, AnthropicProvider, ChatCompletionsProvider, ProviderProfile};

/// The closed set of built-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Neuro,
    Perplexity,
    Yandex,
    OpenAI,
    Anthropic,
}

impl ProviderKind {
    /// Every built-in provider, in display order.
    pub const ALL: [Self; 5] = [
        Self::Neuro,
        Self::Perplexity,
        Self::Yandex,
        Self::OpenAI,
        Self::Anthropic,
    ];

    /// Canonical registry name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neuro => "neuro",
            Self::Perplexity => "perplexity",
            Self::Yandex => "yandex",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the provider's API key.
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::Neuro => "NEURO_API_KEY",
            Self::Perplexity => "PERPLEXITY_API_KEY",
            Self::Yandex => "YANDEX_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn from_alias(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "neuro" | "gemini" => Some(Self::Neuro),
            "perplexity" => Some(Self::Perplexity),
            "yandex" | "yandex-gpt" => Some(Self::Yandex),
            "openai" => Some(Self::OpenAI),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Comma-separated canonical names.
    #[must_use]
    pub fn available() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alias(s).ok_or_else(|| CodegenError::UnknownProvider {
            name: s.to_string(),
            available: Self::available(),
        })
    }
}

/// Provider credentials, usually read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub neuro_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub yandex_api_key: Option<String>,
    pub yandex_folder_id: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl ProviderCredentials {
    /// Read every provider key from the environment; empty values count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            neuro_api_key: var("NEURO_API_KEY"),
            perplexity_api_key: var("PERPLEXITY_API_KEY"),
            yandex_api_key: var("YANDEX_API_KEY"),
            yandex_folder_id: var("YANDEX_FOLDER_ID"),
            openai_api_key: var("OPENAI_API_KEY"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
        }
    }

    fn key_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Neuro => self.neuro_api_key.as_deref(),
            ProviderKind::Perplexity => self.perplexity_api_key.as_deref(),
            ProviderKind::Yandex => self.yandex_api_key.as_deref(),
            ProviderKind::OpenAI => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

/// Settings shared by every provider the registry builds.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Credentials per provider
    pub credentials: ProviderCredentials,
    /// Model override applied to the resolved provider
    pub model: Option<String>,
    /// Per-request timeout for provider calls
    pub timeout: Duration,
    /// Endpoint overrides per provider
    pub endpoints: HashMap<ProviderKind, String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            credentials: ProviderCredentials::default(),
            model: None,
            timeout: Duration::from_secs(300),
            endpoints: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Override a provider's endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.endpoints.insert(kind, url.into());
        self
    }
}

/// Resolves provider names to instances.
///
/// Built-in providers are constructed on demand from [`ProviderSettings`];
/// explicitly registered instances take precedence under their name.
pub struct ProviderRegistry {
    settings: ProviderSettings,
    registered: RwLock<HashMap<String, Arc<dyn AIProvider>>>,
}

impl ProviderRegistry {
    /// Create a registry over the given settings.
    #[must_use]
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            registered: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider instance under its own name.
    pub fn register(&self, provider: Arc<dyn AIProvider>) {
        let mut registered = self
            .registered
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        registered.insert(provider.name().to_string(), provider);
    }

    /// Every resolvable name: built-ins first, then registered extras.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let registered = self
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = ProviderKind::ALL
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        let mut extras: Vec<String> = registered
            .keys()
            .filter(|k| ProviderKind::from_alias(k).is_none())
            .cloned()
            .collect();
        extras.sort();
        names.extend(extras);
        names
    }

    /// Resolve a provider by name or alias.
    ///
    /// Unknown names fail with the list of valid choices; known providers
    /// without credentials fail naming the missing variable.
    pub fn resolve(&self, name: &str) -> CodegenResult<Arc<dyn AIProvider>> {
        let key = name.trim().to_ascii_lowercase();
        let kind = ProviderKind::from_alias(&key);
        let lookup = kind.map_or(key.as_str(), |k| k.as_str());

        if let Some(provider) = self
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lookup)
        {
            return Ok(provider.clone());
        }

        let Some(kind) = kind else {
            return Err(CodegenError::UnknownProvider {
                name: name.to_string(),
                available: self.provider_names().join(", "),
            });
        };
        self.build(kind)
    }

    fn build(&self, kind: ProviderKind) -> CodegenResult<Arc<dyn AIProvider>> {
        let settings = &self.settings;
        let api_key = settings
            .credentials
            .key_for(kind)
            .ok_or(CodegenError::ProviderNotConfigured {
                provider: kind.as_str(),
                env_var: kind.api_key_env(),
            })?;

        let provider: Arc<dyn AIProvider> = if kind == ProviderKind::Anthropic {
            let mut provider = AnthropicProvider::new(api_key, settings.timeout)?;
            if let Some(url) = settings.endpoints.get(&kind) {
                provider = provider.with_base_url(url);
            }
            if let Some(model) = &settings.model {
                provider = provider.with_model(model);
            }
            Arc::new(provider)
        } else {
            let mut profile = match kind {
                ProviderKind::Neuro => ProviderProfile::neuro(),
                ProviderKind::Perplexity => ProviderProfile::perplexity(),
                ProviderKind::Yandex => {
                    let folder = settings.credentials.yandex_folder_id.clone().ok_or(
                        CodegenError::ProviderNotConfigured {
                            provider: kind.as_str(),
                            env_var: "YANDEX_FOLDER_ID",
                        },
                    )?;
                    ProviderProfile::yandex(folder)
                }
                ProviderKind::OpenAI | ProviderKind::Anthropic => ProviderProfile::openai(),
            };
            if let Some(url) = settings.endpoints.get(&kind) {
                profile = profile.with_endpoint(url.clone());
            }
            if let Some(model) = &settings.model {
                profile = profile.with_model(model.clone());
            }
            Arc::new(ChatCompletionsProvider::new(profile, api_key, settings.timeout)?)
        };

        debug!("Resolved AI provider {} ({})", kind, provider.model());
        Ok(provider)
    }
}
