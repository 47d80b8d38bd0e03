//! Relay service binary.
//!
//! `relay serve` (the default) accepts Trello webhooks; `relay recover`
//! runs response recovery on a saved provider response.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codegen::{recover, PromptLibrary, ProviderRegistry};
use relay::dedup::SWEEP_INTERVAL;
use relay::{
    build_router, AppState, Config, DedupGuard, DedupWindows, Relay, RunOptions, TrelloClient,
    WebhookAuth,
};
use repo_sync::GitHubClient;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "relay", version, about = "Turns Trello cards into GitHub commits")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve Trello webhooks
    Serve(ServeArgs),
    /// Recover file operations from a saved provider response
    Recover {
        /// File holding the raw response text
        file: PathBuf,
        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Listen port (overrides RELAY_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Provider name (overrides AI_PROVIDER)
    #[arg(long)]
    provider: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    match Cli::parse().command {
        None => serve(ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(args).await,
        Some(Command::Recover { file, compact }) => recover_file(&file, compact),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("relay=info".parse()?);
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting relay...");

    let mut config = Config::default();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    config.validate().context("Invalid configuration")?;

    let prompts = PromptLibrary::load(config.prompts_dir.as_deref())
        .context("Failed to load prompt templates")?;
    info!(project_types = ?prompts.project_types(), "Prompt templates loaded");

    let providers = ProviderRegistry::new(config.provider_settings());
    let provider = providers
        .resolve(&config.provider)
        .context("Failed to resolve AI provider")?;
    info!(
        provider = provider.name(),
        model = provider.model(),
        "AI provider configured"
    );

    let owner = config
        .github_owner
        .clone()
        .context("GITHUB_OWNER is not set")?;
    let token = config
        .github_token
        .clone()
        .context("GITHUB_TOKEN is not set")?;
    let github = GitHubClient::new(&config.github_api_url, owner, token, config.http_timeout)
        .context("Failed to create GitHub client")?;

    let trello = TrelloClient::new(
        &config.trello.api_url,
        config.trello.api_key.clone(),
        config.trello.token.clone(),
        config.http_timeout,
    )
    .context("Failed to create Trello client")?;
    if !trello.is_configured() {
        warn!("TRELLO_API_KEY/TRELLO_TOKEN not set - outcome comments will not be posted");
    }
    if config.trello.webhook_secret.is_none() {
        warn!("TRELLO_WEBHOOK_SECRET not set - webhook signatures are not verified");
    }

    let relay = Relay::new(
        Arc::new(github),
        Arc::new(trello),
        Arc::new(providers),
        Arc::new(prompts),
        RunOptions {
            provider: config.provider.clone(),
            project_type: config.project_type.clone(),
            retry: config.retry_policy(),
            snapshot: config.snapshot_options(),
        },
    );

    let guard = DedupGuard::in_memory(DedupWindows {
        debounce: config.dedup_debounce,
        retention: config.dedup_retention,
    });
    let sweeper = guard.spawn_sweeper(SWEEP_INTERVAL);

    let state = AppState {
        relay: Arc::new(relay),
        guard,
        auth: WebhookAuth {
            secret: config.trello.webhook_secret.clone(),
            callback_url: config.trello.callback_url.clone(),
        },
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!(port = config.port, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Relay stopped");
    Ok(())
}

fn recover_file(file: &Path, compact: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let recovered = recover(&raw).context("Response is not recoverable")?;
    let output = if compact {
        serde_json::to_string(&recovered)?
    } else {
        serde_json::to_string_pretty(&recovered)?
    };
    println!("{output}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
