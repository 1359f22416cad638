mod accounts;
mod api;
mod config;
mod db;
mod error;
mod jobs;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::accounts::mongo_store::MongoAccountStore;
use crate::accounts::provider::AccountProvider;
use crate::accounts::sqlite_store::SqliteAccountStore;
use crate::accounts::store::AccountStore;
use crate::accounts::Account;
use crate::api::auth::JwtVerifier;
use crate::config::{AccountBackend, Config, LogFormat};
use crate::jobs::ledger::JobLedger;
use crate::jobs::sqlite_repository::SqliteJobRepository;
use crate::status::StatusResolver;

#[derive(Parser)]
#[command(name = "sandbox-api", about = "Sandbox account lifecycle API")]
enum Cli {
    /// Start the HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
    /// Seed the relational account store from a JSON array of accounts
    ImportAccounts {
        /// Path to the JSON file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 { Cli::Serve } else { Cli::parse() };

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    match cli {
        Cli::Serve => run_server(config).await,
        Cli::ImportAccounts { path } => import_accounts(&config, &path).await,
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sandbox_api=info,tower_http=warn,hyper=warn"));

    let (tree, json) = match config.log_format {
        LogFormat::Tree => (
            Some(
                tracing_tree::HierarchicalLayer::new(2)
                    .with_targets(true)
                    .with_bracketed_fields(false),
            ),
            None,
        ),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tree)
        .with(json)
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();
}

async fn run_server(config: Config) -> Result<()> {
    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: false,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    let store: Arc<dyn AccountStore> = match config.account_backend {
        AccountBackend::KeyValue => Arc::new(
            MongoAccountStore::connect(
                &config.mongodb_uri,
                &config.mongodb_database,
                &config.mongodb_collection,
                config.scan_page_size,
            )
            .await
            .context("failed to connect to mongodb account store")?,
        ),
        AccountBackend::Relational => Arc::new(
            SqliteAccountStore::open(&config.database_path)
                .context("failed to open sqlite account store")?,
        ),
    };
    tracing::info!(backend = store.backend(), "account store ready");

    let accounts = AccountProvider::new(store, config.store_timeout);
    let repo = SqliteJobRepository::open(&config.database_path).context("failed to open job ledger")?;
    let ledger = JobLedger::new(Arc::new(repo), accounts.clone(), config.store_timeout);
    let status = StatusResolver::new(accounts.clone(), ledger.clone());

    let app_state = api::AppState {
        accounts,
        ledger,
        status,
        jwt: Arc::new(JwtVerifier::new(&config.jwt_secret)),
    };

    let app = api::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, environment = %config.environment, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn import_accounts(config: &Config, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let accounts: Vec<Account> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse accounts from {}", path.display()))?;

    let store = SqliteAccountStore::open(&config.database_path)
        .context("failed to open sqlite account store")?;

    let total = accounts.len();
    for account in accounts {
        let name = account.name.clone();
        store
            .insert(account)
            .await
            .with_context(|| format!("failed to import account {name}"))?;
    }
    tracing::info!(count = total, database = %config.database_path, "imported accounts");
    Ok(())
}
