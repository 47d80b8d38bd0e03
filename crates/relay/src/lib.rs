//! Trello card relay.
//!
//! This crate provides:
//! - Trello webhook parsing, classification and signature verification
//! - Project type and repository name derivation
//! - A process-local admission guard against duplicate deliveries
//! - The run pipeline: snapshot, prompt, generation, recovery, sync, comment
//! - The HTTP server that accepts webhooks and schedules runs

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod comment;
pub mod config;
pub mod dedup;
pub mod pipeline;
pub mod project;
pub mod server;
pub mod trello;

pub use config::{Config, ConfigError, TrelloConfig};
pub use dedup::{
    AdmissionPermit, AdmissionStore, DedupGuard, DedupWindows, InMemoryAdmissionStore,
    Rejection, RunIdentity,
};
pub use pipeline::{ErrorKind, Relay, RunError, RunOptions, RunSummary};
pub use server::{build_router, AppState, WebhookAuth};
pub use trello::{CardEvent, CardNotifier, TrelloClient, TrelloError, Trigger, WebhookPayload};
