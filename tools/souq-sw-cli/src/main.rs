//! Command-line harness for the Souq service worker.
//!
//! Provides commands for:
//! - Printing the resolved worker configuration
//! - Installing the worker against a live origin and replaying requests
//! - Rendering a push payload into the notification it would show
//! - Promoting a post through the backend RPC
//!
//! ## Usage
//!
//! ```bash
//! # Show the effective configuration
//! souq-sw config --config sw.json
//!
//! # Install against a local dev server, then route two requests
//! souq-sw replay --scope http://localhost:8080/ /index.html /assets/app.js --navigate /posts/42
//!
//! # Preview a push notification
//! souq-sw push '{"title":"عرض جديد","url":"/posts/42"}'
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use souq_client::{promote_post, Audience, PromoteRequest};
use souq_common::{init_logging, LogConfig, LogFormat};
use souq_net::{HttpFetcher, LoaderConfig, RestBackend};
use souq_sw::{
    CacheStorage, FetchOutcome, NotificationPayload, PushMessage, Registration, Request,
    ServiceWorkerError, WorkerConfig, WorkerContext,
};
use tracing::{debug, info};
use url::Url;

#[derive(Parser)]
#[command(name = "souq-sw")]
#[command(about = "Inspect and exercise the Souq service worker")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format: pretty, compact or json
    #[arg(long, default_value = "compact", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WorkerArgs {
    /// Worker configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the registration scope
    #[arg(long)]
    scope: Option<Url>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved worker configuration
    Config {
        #[command(flatten)]
        worker: WorkerArgs,
    },

    /// Install the worker against a live origin and route requests through it
    Replay {
        #[command(flatten)]
        worker: WorkerArgs,
        /// Sub-resource paths to request, relative to the scope
        paths: Vec<String>,
        /// Paths to request as navigations
        #[arg(long)]
        navigate: Vec<String>,
        /// Restore the cache store from this file and save it back afterwards
        #[arg(long)]
        cache_file: Option<PathBuf>,
    },

    /// Render a push payload into the notification it would show
    Push {
        #[command(flatten)]
        worker: WorkerArgs,
        /// Raw push payload (JSON or plain text)
        payload: String,
    },

    /// Promote a post through the backend RPC
    Promote {
        /// Backend project URL
        #[arg(long, env = "SOUQ_BACKEND_URL")]
        backend: String,
        /// Anonymous API key
        #[arg(long, env = "SOUQ_BACKEND_KEY")]
        key: String,
        /// Signed-in user's access token
        #[arg(long, env = "SOUQ_ACCESS_TOKEN")]
        token: Option<String>,
        /// Post to promote
        post: String,
        /// Number of users to notify
        #[arg(long, default_value = "")]
        users: String,
        /// Notify every user
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    init_logging(LogConfig::from_verbosity(cli.verbose).with_format(format))?;

    match cli.command {
        Commands::Config { worker } => {
            let config = resolve_config(&worker)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("cache: {}", config.cache_name());
        }

        Commands::Replay {
            worker,
            paths,
            navigate,
            cache_file,
        } => {
            let config = resolve_config(&worker)?;
            replay(config, &paths, &navigate, cache_file.as_deref()).await?;
        }

        Commands::Push { worker, payload } => {
            let config = resolve_config(&worker)?;
            let rendered = render_push(&payload, &config);
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }

        Commands::Promote {
            backend,
            key,
            token,
            post,
            users,
            all,
        } => {
            let audience = Audience::parse(all, &users).map_err(|e| e.user_message())?;
            let mut client = RestBackend::new(&backend, key, LoaderConfig::default())?;
            if let Some(token) = token {
                client = client.with_access_token(token);
            }
            promote_post(&client, &PromoteRequest::new(post.clone(), audience))
                .await
                .map_err(|e| e.user_message())?;
            println!("Promotion queued for {post}");
        }
    }

    Ok(())
}

/// Load the configuration file (or defaults) and apply command-line overrides.
fn resolve_config(args: &WorkerArgs) -> Result<WorkerConfig, ServiceWorkerError> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(scope) = &args.scope {
        config.scope = scope.clone();
    }
    config.validate()?;
    debug!(version = %config.version, scope = %config.scope, "Configuration resolved");
    Ok(config)
}

/// The notification a push with `payload` would display.
fn render_push(payload: &str, config: &WorkerConfig) -> JsonValue {
    let defaults = &config.notifications;
    let content = NotificationPayload::from_push(&PushMessage::new(payload), defaults);
    json!({
        "title": content.title,
        "options": content.options(defaults),
    })
}

async fn replay(
    config: WorkerConfig,
    paths: &[String],
    navigate: &[String],
    cache_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = HttpFetcher::new(LoaderConfig::default())?;
    let mut context = WorkerContext::new(Arc::new(fetcher));
    if let Some(path) = cache_file.filter(|p| p.exists()) {
        context.caches = Arc::new(CacheStorage::load(path).await?);
        info!(path = %path.display(), "Cache store restored");
    }

    let (registration, mut events) = Registration::with_context(config.scope.clone(), context);
    let worker = registration.register(config).await?;
    println!("Installed {} ({})", worker.id, worker.cache_name());

    let requests = paths
        .iter()
        .map(|p| (p, false))
        .chain(navigate.iter().map(|p| (p, true)));
    for (path, is_navigation) in requests {
        let url = registration.scope().join(path)?;
        let request = if is_navigation {
            Request::navigate(url)
        } else {
            Request::get(url)
        };
        match registration.handle_fetch(request).await {
            Ok(FetchOutcome::Respond(response)) => println!(
                "{:<8} {} {} ({} bytes) {path}",
                if response.from_cache { "cache" } else { "network" },
                response.status,
                response.status_text,
                response.body.len(),
            ),
            Ok(FetchOutcome::Passthrough) => println!("{:<8} {path}", "bypass"),
            Err(e) => println!("{:<8} {e} {path}", "error"),
        }
    }
    registration.settle().await;

    while let Ok(event) = events.try_recv() {
        debug!(?event, "Registration event");
    }

    let stats = registration.caches().stats();
    println!("Cache reads: {}, writes: {}", stats.reads, stats.writes);

    if let Some(path) = cache_file {
        registration.caches().save(path).await?;
        println!("Cache store written to: {}", path.display());
    }

    Ok(())
}
