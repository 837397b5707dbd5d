use anyhow::Result;
use clap::Parser;
use postbot::config;
use postbot::db;
use postbot::dedup::SqliteDedupStore;
use postbot::drive::DriveClient;
use postbot::enrich::EnrichmentClient;
use postbot::errsink::SqliteErrorSink;
use postbot::pipeline::Pipeline;
use postbot::publish::PublishClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/postbot.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let timeout = Duration::from_secs(cfg.app.request_timeout_secs);
    let pipeline = Pipeline {
        source: Arc::new(DriveClient::new(
            &cfg.source.base_url,
            cfg.source.token.clone(),
            timeout,
        )?),
        enrichment: Arc::new(EnrichmentClient::new(
            &cfg.enrichment.base_url,
            cfg.enrichment.token.clone(),
            timeout,
        )?),
        publisher: Arc::new(PublishClient::new(
            &cfg.publisher.base_url,
            cfg.publisher.token.clone(),
            timeout,
        )?),
        dedup: Arc::new(SqliteDedupStore::new(pool.clone())),
        sink: Arc::new(SqliteErrorSink::new(pool.clone())),
    };

    info!(
        channels = cfg.channels.len(),
        interval = cfg.app.poll_interval_secs,
        "starting publish pipeline"
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.app.poll_interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let deadline = (cfg.app.run_deadline_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(cfg.app.run_deadline_secs));
        let stats = pipeline.run_once(&cfg.channels, deadline).await;
        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errored = stats.errored,
            "poll finished"
        );
    }
}
