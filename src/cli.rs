//! Command-line surface: `clap`'s derive API, with flattened global args
//! and a subcommand enum nesting a target enum per command.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "privateer", version, about = "Migrate public container images to private registries and rewrite the GitOps manifests that reference them.")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to the config file. Defaults to `$HOME/.privateer/config.yaml`.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Overrides `settings.language` for this run.
    #[arg(long, global = true, value_parser = ["en-US", "pt-BR", "es-ES"])]
    pub language: Option<String>,

    /// Overrides `settings.log_level` for this run.
    #[arg(long, global = true, value_parser = ["debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    /// Overrides `settings.dry_run` for this run; no registry, Git host, or
    /// cluster write calls are made.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config to `$HOME/.privateer/config.yaml`.
    Init,

    /// Scan a live cluster and report classification + batch validation.
    Scan {
        #[command(subcommand)]
        target: ScanTarget,
    },

    /// Migrate public images to the configured private registries, and/or
    /// rewrite the GitOps repositories that reference them.
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },

    /// Print adapter health and the last known run summary.
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ScanTarget {
    /// Scan the configured Kubernetes cluster.
    Cluster,
}

#[derive(Subcommand, Debug)]
pub enum MigrateTarget {
    /// Run the migration engine against the cluster's public images.
    Cluster,

    /// Run the GitOps engine against the configured repositories.
    Github,

    /// Run `migrate cluster` then `migrate github`.
    All,
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_migrate_cluster_with_dry_run() {
        let cli = Cli::parse_from(["privateer", "--dry-run", "migrate", "cluster"]);
        assert!(cli.global.dry_run);
        assert!(matches!(cli.command, Command::Migrate { target: MigrateTarget::Cluster }));
    }

    #[test]
    fn parses_scan_cluster() {
        let cli = Cli::parse_from(["privateer", "scan", "cluster"]);
        assert!(matches!(cli.command, Command::Scan { target: ScanTarget::Cluster }));
    }
}
