use clap::Parser;
use retagger::application::init::init;
use retagger::application::{ApplyEngine, ApplyOptions, QueryService, SyncEngine};
use retagger::cli::{
    format_apply_report, format_submission_list, format_sync_report, Cli, Commands,
};
use retagger::domain::{TagEdit, TagExpression};
use retagger::error::RetaggerError;
use retagger::infrastructure::{AdapterRegistry, Config, SubmissionStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, waiting for in-flight requests");
            interrupt.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e.display_with_suggestions());
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Load config, honoring the global overrides
fn load_config(
    config_path: Option<&Path>,
    database: Option<PathBuf>,
) -> Result<Config, RetaggerError> {
    let mut config = Config::discover(config_path)?;
    if let Some(database) = database {
        config.database = database;
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<SubmissionStore>, RetaggerError> {
    log::debug!("Using database {}", config.database.display());
    Ok(Arc::new(SubmissionStore::open(&config.database)?))
}

fn build_registry(config: &Config) -> Result<AdapterRegistry, RetaggerError> {
    AdapterRegistry::from_config(config).map_err(|e| RetaggerError::Config(e.to_string()))
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), RetaggerError> {
    match cli.command {
        Commands::Init { path } => init(&path),
        Commands::LoadSubmissions => {
            let config = load_config(cli.config.as_deref(), cli.database)?;
            let registry = build_registry(&config)?;
            let store = open_store(&config)?;

            let report = SyncEngine::new(store, &config)
                .sync_all(&registry, cancel)
                .await?;
            println!("{}", format_sync_report(&report));

            if report.was_cancelled() {
                return Err(RetaggerError::Cancelled);
            }
            let failed = report.failed_services();
            if !failed.is_empty() {
                return Err(RetaggerError::SyncFailed { services: failed });
            }
            Ok(())
        }
        Commands::QueryTags { search } => {
            let config = load_config(cli.config.as_deref(), cli.database)?;
            // Reject malformed input before touching the store
            TagExpression::parse(&search, config.tag_policy())?;
            let store = open_store(&config)?;

            let matched = QueryService::new(store, config.tag_policy()).execute(&search)?;
            println!("{}", format_submission_list(&matched));
            Ok(())
        }
        Commands::ApplyTags {
            dry_run,
            search,
            tags,
        } => {
            let config = load_config(cli.config.as_deref(), cli.database)?;
            TagExpression::parse(&search, config.tag_policy())?;
            TagEdit::parse(&tags, config.tag_policy())?;
            let store = open_store(&config)?;

            // A dry run never talks to a service, so it needs no credentials
            let registry = if dry_run {
                AdapterRegistry::new()
            } else {
                build_registry(&config)?
            };

            let options = ApplyOptions {
                search,
                tags,
                dry_run,
            };
            let report = ApplyEngine::new(store, registry, &config)
                .run(&options, cancel)
                .await?;
            println!("{}", format_apply_report(&report));

            if report.cancelled() > 0 {
                return Err(RetaggerError::Cancelled);
            }
            if report.failed() > 0 {
                return Err(RetaggerError::PartialFailure {
                    failed: report.failed(),
                    total: report.changed().count(),
                });
            }
            Ok(())
        }
    }
}
