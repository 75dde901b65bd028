mod alerts;
mod config;
mod server;
mod tasks;

use anyhow::Context;
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::alerts::{Cadence, Subscription, SubscriptionUpdate};
use crate::alerts::evaluator::AlertEvaluator;
use crate::alerts::file_store::FileSubscriptionStore;
use crate::alerts::scheduler::CadenceScheduler;
use crate::alerts::store::SubscriptionStore;
use crate::config::{Config, NewsSettings};
use crate::tasks::retriever::{ArticleRetriever, FallbackRetriever};
use crate::tasks::sinks::resolve_notifier;
use crate::tasks::sources::search::SearchClient;

#[derive(Parser)]
#[command(name = "news-alerts", about = "Keyword news alerts delivered by SMS")]
enum Cli {
    /// Start the scheduler and HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
    /// Run a single evaluation cycle for one cadence and print the report
    RunCycle {
        #[arg(long)]
        cadence: Cadence,
    },
    /// Create a subscription
    AddAlert {
        #[arg(long)]
        owner: String,
        /// Delivery destination, e.g. a phone number
        #[arg(long)]
        destination: String,
        #[arg(long)]
        topic: String,
        /// Comma-separated keywords
        #[arg(long, value_delimiter = ',', required = true)]
        keywords: Vec<String>,
        #[arg(long, default_value = "daily")]
        cadence: Cadence,
    },
    /// List every stored subscription
    ListAlerts,
    /// Change a subscription's topic, keywords, cadence or active flag
    UpdateAlert {
        /// Subscription ID
        #[arg(long)]
        id: String,
        /// Requesting user; must own the subscription
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: Option<String>,
        /// Comma-separated keywords; replaces the current list
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,
        #[arg(long)]
        cadence: Option<Cadence>,
        /// `false` pauses the subscription, `true` resumes it
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a subscription
    RemoveAlert {
        /// Subscription ID
        #[arg(long)]
        id: String,
        /// Requesting user; must own the subscription
        #[arg(long)]
        user: String,
    },
    /// Send a test alert for one subscription
    TestAlert {
        /// Subscription ID
        #[arg(long)]
        id: String,
        /// Requesting user; must own the subscription
        #[arg(long)]
        user: String,
    },
}

/// Everything the entry points share once configuration is loaded.
struct Services {
    file_store: Arc<FileSubscriptionStore>,
    store: Arc<dyn SubscriptionStore>,
    evaluator: Arc<AlertEvaluator>,
    settings: NewsSettings,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Default to Serve when no subcommand is given, but keep --help working.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 {
        Cli::Serve
    } else {
        Cli::parse()
    };

    let config = Config::from_env();
    init_tracing();

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

    let services = build_services(&config).await?;

    match cli {
        Cli::Serve => run_server(&config, services).await,
        Cli::RunCycle { cadence } => {
            let report = services.evaluator.run_cycle(cadence).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Cli::AddAlert {
            owner,
            destination,
            topic,
            keywords,
            cadence,
        } => {
            let subscription = Subscription::new(
                &owner,
                &destination,
                &topic,
                clean_keywords(keywords),
                cadence,
            );
            services.file_store.save(subscription.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&subscription)?);
            Ok(())
        }
        Cli::ListAlerts => {
            let mut subscriptions = services.file_store.list_all().await;
            subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            println!("{}", serde_json::to_string_pretty(&subscriptions)?);
            Ok(())
        }
        Cli::UpdateAlert {
            id,
            user,
            topic,
            keywords,
            cadence,
            active,
        } => {
            let changes = SubscriptionUpdate {
                topic,
                keywords: keywords.map(clean_keywords),
                cadence,
                active,
            };
            let updated = services.file_store.update(&id, &user, changes).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
            Ok(())
        }
        Cli::RemoveAlert { id, user } => {
            let removed = services.file_store.delete(&id, &user).await?;
            println!("Deleted alert {} ({})", removed.id, removed.topic);
            Ok(())
        }
        Cli::TestAlert { id, user } => {
            let outcome = services.evaluator.trigger_test_alert(&id, &user).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

fn clean_keywords(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_alerts=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
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

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let settings = config.news_settings()?;

    let http_client = Arc::new(
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.fetch_timeout)
            .build()
            .context("failed to build HTTP client")?,
    );

    let file_store = Arc::new(FileSubscriptionStore::new(config.data_dir.clone()));
    file_store
        .load_all()
        .await
        .context("failed to load subscription store")?;
    let store: Arc<dyn SubscriptionStore> = file_store.clone();

    let search = config.news_api.api_key.clone().map(|token| {
        SearchClient::new(
            (*http_client).clone(),
            token,
            config.news_api.base_url.clone(),
            config.fetch_timeout,
        )
    });
    if search.is_none() {
        tracing::warn!("NEWS_API_KEY not set, articles will come from feeds only");
    }

    let retriever: Arc<dyn ArticleRetriever> = Arc::new(FallbackRetriever::new(
        (*http_client).clone(),
        search,
        &settings,
        config.fetch_timeout,
    ));
    let notifier = resolve_notifier(config.sms.as_ref(), &http_client);

    let evaluator = Arc::new(AlertEvaluator::new(store.clone(), retriever, notifier));

    Ok(Services {
        file_store,
        store,
        evaluator,
        settings,
    })
}

async fn run_server(config: &Config, services: Services) -> Result<(), Box<dyn Error>> {
    let scheduler = Arc::new(CadenceScheduler::new(
        services.evaluator.clone(),
        services.settings.daily_hour,
    )?);
    scheduler.start().await;

    let app_state = server::AppState {
        store: services.store,
        evaluator: services.evaluator,
        scheduler: scheduler.clone(),
    };

    let app = server::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let port = config.port;
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
