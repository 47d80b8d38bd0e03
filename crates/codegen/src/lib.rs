#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

//! # Codegen
//!
//! The generation half of a relay run:
//! - [`PromptLibrary`] assembles a deterministic task prompt from templates,
//!   repository context and the card description
//! - [`AIProvider`] implementations send it to a backend, selected by name
//!   through the [`ProviderRegistry`]
//! - [`recover`] turns the raw response into validated file operations

pub mod error;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod registry;

pub use error::{CodegenError, CodegenResult};
pub use prompt::{PromptLibrary, DEFAULT_PROJECT_TYPE};
pub use provider::{AIProvider, AnthropicProvider, ChatCompletionsProvider, ProviderProfile};
pub use recovery::{recover, DroppedCandidate, Recovered, RecoveryStrategy};
pub use registry::{ProviderCredentials, ProviderKind, ProviderRegistry, ProviderSettings};
