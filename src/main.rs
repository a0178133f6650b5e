//! Binary entry point: parses the CLI, loads config, wires up the
//! classifier/registry manager/migration engine/GitOps engine, and prints
//! a final summary plus an HTML report path. Load config, dispatch on a
//! command enum, unwind one top-level `Result` at `main`.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use privateer::cli::{Cli, Command, MigrateTarget, ScanTarget};
use privateer::cluster::ClusterScanner;
use privateer::cmd::command::CancellationToken;
use privateer::config::Config;
use privateer::errors::PrivateerError;
use privateer::gitops::githost::GitHubClient;
use privateer::gitops::GitOpsEngine;
use privateer::image::{Classification, Classifier};
use privateer::locale::Language;
use privateer::migration::{MigrationEngine, MigrationMode};
use privateer::registry::RegistryManager;
use privateer::report::{self, DiscordNotifier, ReportData};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "privateer run failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), PrivateerError> {
    let cli = Cli::parse();

    if let Command::Init = &cli.command {
        return run_init(cli.global.config.as_deref());
    }

    let config_path = match &cli.global.config {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)?;

    if let Some(language) = &cli.global.language {
        config.settings.language = language.clone();
    }
    if let Some(log_level) = &cli.global.log_level {
        config.settings.log_level = log_level.clone();
    }
    if cli.global.dry_run {
        config.settings.dry_run = true;
    }

    init_logging(&config.settings.log_level);

    let language: Language = config.settings.language.parse().unwrap_or_default();
    info!(language = %language, dry_run = config.settings.dry_run, "privateer starting");

    match cli.command {
        Command::Init => unreachable!("handled above"),
        Command::Scan { target: ScanTarget::Cluster } => run_scan_cluster(&config),
        Command::Migrate { target: MigrateTarget::Cluster } => {
            let (results, summary) = run_migrate_cluster(&config)?;
            write_migration_report(&config, &results, &summary)
        }
        Command::Migrate { target: MigrateTarget::Github } => {
            let (results, summary) = run_migrate_github(&config)?;
            write_gitops_report(&config, &results, &summary)
        }
        Command::Migrate { target: MigrateTarget::All } => {
            let (migration_results, migration_summary) = run_migrate_cluster(&config)?;
            let (gitops_results, gitops_summary) = run_migrate_github(&config)?;
            write_full_report(&config, &migration_results, &migration_summary, &gitops_results, &gitops_summary)
        }
        Command::Status => run_status(&config),
    }
}

fn run_init(config_path: Option<&str>) -> Result<(), PrivateerError> {
    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };

    if Config::write_default_if_absent(&path)? {
        println!("wrote default config to {}", path.display());
    } else {
        println!("config already exists at {}, leaving it untouched", path.display());
    }
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).json().try_init();
}

fn classifier_for(config: &Config) -> Classifier {
    Classifier::new(
        config.image_detection.ignore_registries.clone(),
        config.image_detection.custom_private_registries.clone(),
        config.image_detection.custom_public_registries.clone(),
    )
}

fn build_registry_manager(config: &Config) -> Result<RegistryManager, PrivateerError> {
    let manager = RegistryManager::new();
    for (kind, cfg) in config.resolved_registries()? {
        manager.add_registry(kind, cfg)?;
    }
    if manager.is_empty() {
        return Err(PrivateerError::NoRegistriesEnabled);
    }
    Ok(manager)
}

fn run_scan_cluster(config: &Config) -> Result<(), PrivateerError> {
    let scanner = ClusterScanner::connect()?;
    let classifier = classifier_for(config);

    let mut public = 0usize;
    let mut private = 0usize;
    let mut ignored = 0usize;

    for namespace in namespaces(config) {
        let usages = scanner.scan(namespace.as_deref())?;
        for usage in usages {
            match classifier.classify(&usage.image) {
                Classification::Public => public += 1,
                Classification::Private => private += 1,
                Classification::Ignored => ignored += 1,
            }
        }
    }

    println!("classification summary: public={public} private={private} ignored={ignored}");
    Ok(())
}

fn namespaces(config: &Config) -> Vec<Option<String>> {
    if config.kubernetes.namespaces.is_empty() {
        vec![None]
    } else {
        config.kubernetes.namespaces.iter().cloned().map(Some).collect()
    }
}

/// Scans the cluster, classifies every usage, and runs the migration
/// engine over the public ones.
fn run_migrate_cluster(config: &Config) -> Result<(Vec<privateer::migration::MigrationResult>, privateer::migration::MigrationSummary), PrivateerError> {
    let registries = build_registry_manager(config)?;
    let public_usages = public_usages_from_cluster(config)?;

    let concurrency = NonZeroUsize::new(config.settings.concurrency.max(1)).expect("max(1) is never zero");
    let mode = if config.settings.multiple_registries {
        MigrationMode::FanOut
    } else {
        MigrationMode::HighestPriorityOnly
    };

    let engine = MigrationEngine::new(&registries, concurrency, config.settings.dry_run);
    let cancellation = CancellationToken::new();
    let (results, summary) = engine.run(public_usages, mode, &cancellation)?;

    info!(total = summary.total, success = summary.success, skipped = summary.skipped, failure = summary.failure, "migration run complete");
    Ok((results, summary))
}

fn public_usages_from_cluster(config: &Config) -> Result<Vec<privateer::cluster::ImageUsage>, PrivateerError> {
    let scanner = ClusterScanner::connect()?;
    let classifier = classifier_for(config);

    let mut public_usages = Vec::new();
    for namespace in namespaces(config) {
        for usage in scanner.scan(namespace.as_deref())? {
            if classifier.classify(&usage.image) == Classification::Public {
                public_usages.push(usage.classified(true));
            }
        }
    }
    Ok(public_usages)
}

fn run_migrate_github(config: &Config) -> Result<(Vec<privateer::gitops::GitOpsResult>, privateer::gitops::GitOpsSummary), PrivateerError> {
    if !config.github.enabled {
        warn!("github integration is disabled, nothing to migrate");
        return Ok((Vec::new(), privateer::gitops::GitOpsSummary::default()));
    }
    if config.github.token.is_empty() {
        return Err(PrivateerError::GithubTokenMissing);
    }

    let registries = build_registry_manager(config)?;
    let public_usages = public_usages_from_cluster(config)?;
    let validated_map = registries.validate_images_batch(&public_usages);

    let client = GitHubClient::new(&config.github.token)?;
    let concurrency = NonZeroUsize::new(config.settings.concurrency.max(1)).expect("max(1) is never zero");
    let engine = GitOpsEngine::new(&client, &config.gitops, concurrency);
    let cancellation = CancellationToken::new();
    let (results, summary) = engine.run(&config.github.repositories, &validated_map, &public_usages, &cancellation);

    info!(total = summary.total, success = summary.success, failure = summary.failure, prs = summary.pull_requests_opened, "gitops run complete");
    Ok((results, summary))
}

fn run_status(config: &Config) -> Result<(), PrivateerError> {
    let registries = build_registry_manager(config)?;
    for (name, result) in registries.health_check_all() {
        match result {
            Ok(()) => println!("{name}: healthy"),
            Err(err) => println!("{name}: unhealthy ({err})"),
        }
    }
    Ok(())
}

fn write_migration_report(
    config: &Config,
    results: &[privateer::migration::MigrationResult],
    summary: &privateer::migration::MigrationSummary,
) -> Result<(), PrivateerError> {
    write_full_report(config, results, summary, &[], &privateer::gitops::GitOpsSummary::default())
}

fn write_gitops_report(
    config: &Config,
    results: &[privateer::gitops::GitOpsResult],
    summary: &privateer::gitops::GitOpsSummary,
) -> Result<(), PrivateerError> {
    write_full_report(config, &[], &privateer::migration::MigrationSummary::default(), results, summary)
}

fn write_full_report(
    config: &Config,
    migration_results: &[privateer::migration::MigrationResult],
    migration_summary: &privateer::migration::MigrationSummary,
    gitops_results: &[privateer::gitops::GitOpsResult],
    gitops_summary: &privateer::gitops::GitOpsSummary,
) -> Result<(), PrivateerError> {
    let data = ReportData {
        generated_at: chrono::Utc::now().to_rfc3339(),
        dry_run: config.settings.dry_run,
        migration_summary: (migration_summary.total > 0).then_some(migration_summary),
        migration_results,
        gitops_summary: (gitops_summary.total > 0).then_some(gitops_summary),
        gitops_results,
    };

    let html = report::render_html(&data).map_err(|err| PrivateerError::ConfigInvalid(err.to_string()))?;
    let reports_dir = Config::reports_dir()?;
    match report::write_report(&reports_dir, config.settings.dry_run, &html) {
        Ok(path) => println!("wrote report to {}", path.display()),
        Err(err) => warn!(error = %err, "failed to write html report"),
    }

    let summary_line = report::summary_line(
        (migration_summary.total > 0).then_some(migration_summary),
        (gitops_summary.total > 0).then_some(gitops_summary),
    );
    println!("{summary_line}");

    if config.webhooks.discord.enabled {
        let notifier = DiscordNotifier::new(config.webhooks.discord.clone());
        if let Err(err) = notifier.notify(&summary_line) {
            warn!(error = %err, "failed to deliver discord notification");
        }
    }

    Ok(())
}
