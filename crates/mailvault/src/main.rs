//! `MailVault` - email ingestion, classification, and archiving pipeline.
//!
//! Imports mail from spool mailboxes, classifies senders through an
//! external text classifier, and stages PDF attachments into a
//! date/organization tree mirrored to a remote store.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod classifier;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailvault_core::{
    ClassifyStage, DateFilter, DirMirror, ExportStager, Ingestor, MailboxProvider,
    MailboxSession, OrgCache, PdfEngine, RecordRepository, SpoolMailbox,
};

use classifier::OpenAiClassifier;
use config::Config;

#[derive(Parser)]
#[command(name = "mailvault", version, about = "Email archiving pipeline")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "mailvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import messages from every configured mailbox.
    Ingest {
        /// Keep only messages delivered in this year.
        #[arg(long)]
        year: Option<i32>,
        /// Keep only messages delivered in this month (1-12).
        #[arg(long)]
        month: Option<u32>,
        /// Skip this many messages from the front of each mailbox,
        /// overriding the per-account setting.
        #[arg(long)]
        skip: Option<usize>,
    },
    /// Classify imported records that have a pending PDF attachment.
    Classify,
    /// Stage classified attachments and upload them to the remote store.
    Export,
    /// Run ingest, classify, and export once, in order.
    Run,
    /// Run the full pipeline repeatedly.
    Watch {
        /// Seconds between passes, overriding the config.
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailvault=info,mailvault_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let mut app = App::new(config).await?;

    match cli.command {
        Command::Ingest { year, month, skip } => {
            app.ingest(DateFilter { year, month }, skip).await;
        }
        Command::Classify => app.classify().await?,
        Command::Export => app.export().await?,
        Command::Run => app.pass().await?,
        Command::Watch { interval } => app.watch(interval).await?,
    }

    Ok(())
}

/// Long-lived pipeline state shared across subcommands and watch passes.
struct App {
    config: Config,
    repo: RecordRepository,
    engine: PdfEngine,
    classifier: OpenAiClassifier,
    cache: OrgCache,
}

impl App {
    async fn new(config: Config) -> anyhow::Result<Self> {
        let repo = RecordRepository::new(&config.database_path.to_string_lossy()).await?;
        let engine = PdfEngine::new(config.pdf_passwords.clone());
        let classifier = OpenAiClassifier::new(&config.classifier)?;
        Ok(Self {
            config,
            repo,
            engine,
            classifier,
            cache: OrgCache::default(),
        })
    }

    /// Ingest every configured account. Per-account failures are logged
    /// and never stop the remaining accounts.
    async fn ingest(&self, filter: DateFilter, skip: Option<usize>) {
        for account in &self.config.accounts {
            let ingestor = Ingestor::new(
                &account.name,
                &self.config.attachment_dir,
                filter,
                skip.unwrap_or(account.skip),
            );
            let provider = SpoolMailbox::new(&account.spool_dir);

            let mut session = match provider.connect().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(account = account.name, error = %e, "cannot connect to mailbox");
                    continue;
                }
            };

            let outcome = ingestor.run(&mut session, &self.repo).await;
            if let Err(e) = session.logout().await {
                warn!(account = account.name, error = %e, "logout failed");
            }

            match outcome {
                Ok(report) => info!(
                    account = account.name,
                    total = report.total,
                    stored = report.stored,
                    skipped = report.skipped,
                    failed = report.failed,
                    "ingest finished"
                ),
                Err(e) => warn!(account = account.name, error = %e, "ingest failed"),
            }
        }
    }

    async fn classify(&mut self) -> anyhow::Result<()> {
        let mut stage =
            ClassifyStage::new(&self.repo, &self.engine, &self.classifier, &mut self.cache);
        let report = stage.run().await?;
        info!(
            examined = report.examined,
            classified = report.classified,
            from_cache = report.from_cache,
            deferred = report.deferred,
            "classification finished"
        );
        Ok(())
    }

    async fn export(&self) -> anyhow::Result<()> {
        let mirror = DirMirror::new(&self.config.remote_root)?;
        let stager = ExportStager::new(
            &self.repo,
            &mirror,
            &self.config.staging_dir,
            DirMirror::root_id(),
            self.config.batch_size,
        );
        let report = stager.run().await?;
        info!(
            staged = report.staged,
            uploaded = report.uploaded,
            missing = report.missing,
            "export finished"
        );
        Ok(())
    }

    /// One full pipeline pass.
    async fn pass(&mut self) -> anyhow::Result<()> {
        self.ingest(DateFilter::default(), None).await;
        self.classify().await?;
        self.export().await?;
        Ok(())
    }

    /// Run passes forever, one at a time. A pass that overruns the
    /// interval delays the next tick instead of stacking up.
    async fn watch(&mut self, interval_override: Option<u64>) -> anyhow::Result<()> {
        let secs = interval_override.unwrap_or(self.config.watch.interval_secs);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = secs, "watch mode started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.pass().await {
                warn!(error = %e, "pipeline pass failed");
            }
        }
    }
}
