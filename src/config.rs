//! The `$HOME/.privateer/config.yaml` schema, modeled with plain
//! `serde`-derived structs: one struct per section, `#[serde(default)]`
//! wherever a field is optional, nothing hand-parsed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::PrivateerError;
use crate::locale::Language;
use crate::registry::{RegistryConfig, RegistryProductKind};

const CONFIG_DIR_NAME: &str = ".privateer";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub registries: Vec<RegistryEntry>,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub gitops: GitopsConfig,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub image_detection: ImageDetectionConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl RegistryEntry {
    /// Splits the config-file shape into the `(product kind, capability
    /// config)` pair `RegistryManager::add_registry` wants, resolving
    /// `access_key`/`secret_key` as an ECR-specific alias for username/
    /// password since operators usually think of AWS credentials that way.
    pub fn resolve(&self) -> Result<(RegistryProductKind, RegistryConfig), PrivateerError> {
        let product_kind = self
            .kind
            .parse::<RegistryProductKind>()
            .map_err(PrivateerError::ConfigInvalid)?;

        let username = self.username.clone().or_else(|| self.access_key.clone());
        let password = self.password.clone().or_else(|| self.secret_key.clone());

        Ok((
            product_kind,
            RegistryConfig {
                name: self.name.clone(),
                kind: product_kind.into(),
                enabled: self.enabled,
                priority: self.priority,
                url: self.url.clone(),
                username,
                password,
                insecure: self.insecure,
                project: self.project.clone(),
                region: self.region.clone(),
                account_id: self.account_id.clone(),
                org_or_user: None,
            },
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KubernetesConfig {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub repositories: Vec<GithubRepositoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRepositoryConfig {
    /// `"owner/repo"`.
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub branch_strategy: String,
    #[serde(default)]
    pub pr_settings: PullRequestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PullRequestSettings {
    #[serde(default)]
    pub auto_merge: bool,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub commit_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitopsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: String,
    #[serde(default = "default_true")]
    pub auto_pr: bool,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default)]
    pub search_patterns: Vec<String>,
    #[serde(default)]
    pub mapping_rules: Vec<String>,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub tag_resolution: TagResolutionConfig,
}

impl Default for GitopsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: String::new(),
            auto_pr: true,
            branch_prefix: default_branch_prefix(),
            commit_message: default_commit_message(),
            search_patterns: Vec::new(),
            mapping_rules: Vec::new(),
            validation: ValidationConfig::default(),
            tag_resolution: TagResolutionConfig::default(),
        }
    }
}

fn default_branch_prefix() -> String {
    "privateer/".to_string()
}

fn default_commit_message() -> String {
    "chore: migrate {image} to private registry".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub validate_yaml: bool,
    #[serde(default = "default_true")]
    pub validate_helm: bool,
    #[serde(default = "default_true")]
    pub validate_brackets: bool,
    #[serde(default = "default_true")]
    pub check_image_exists: bool,
    #[serde(default)]
    pub dry_run_kubernetes: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validate_yaml: true,
            validate_helm: true,
            validate_brackets: true,
            check_image_exists: true,
            dry_run_kubernetes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagResolutionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_fill_empty_tags: bool,
    #[serde(default)]
    pub prefer_cluster_tags: bool,
    #[serde(default)]
    pub consider_latest_empty: bool,
    #[serde(default = "default_fallback_tag")]
    pub fallback_tag: String,
    #[serde(default = "default_true")]
    pub require_private_exists: bool,
    #[serde(default = "default_common_tags")]
    pub common_tags_to_try: Vec<String>,
}

impl Default for TagResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_fill_empty_tags: false,
            prefer_cluster_tags: true,
            consider_latest_empty: true,
            fallback_tag: default_fallback_tag(),
            require_private_exists: true,
            common_tags_to_try: default_common_tags(),
        }
    }
}

fn default_fallback_tag() -> String {
    "latest".to_string()
}

fn default_common_tags() -> Vec<String> {
    vec!["latest".to_string(), "stable".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub multiple_registries: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: Language::default().to_string(),
            log_level: default_log_level(),
            dry_run: false,
            concurrency: default_concurrency(),
            multiple_registries: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageDetectionConfig {
    #[serde(default)]
    pub custom_public_registries: Vec<String>,
    #[serde(default)]
    pub custom_private_registries: Vec<String>,
    #[serde(default)]
    pub ignore_registries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub discord: DiscordWebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscordWebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// `$HOME/.privateer/config.yaml`, the fixed persisted-state path.
    pub fn default_path() -> Result<PathBuf, PrivateerError> {
        let home = dirs::home_dir().ok_or_else(|| PrivateerError::ConfigInvalid("cannot determine home directory".to_string()))?;
        Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn reports_dir() -> Result<PathBuf, PrivateerError> {
        let home = dirs::home_dir().ok_or_else(|| PrivateerError::ConfigInvalid("cannot determine home directory".to_string()))?;
        Ok(home.join(CONFIG_DIR_NAME).join("reports"))
    }

    pub fn load(path: &Path) -> Result<Config, PrivateerError> {
        let raw = fs::read_to_string(path).map_err(|err| PrivateerError::ConfigReadFailed {
            path: path.display().to_string(),
            raw_error_message: err.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|err| PrivateerError::ConfigInvalid(err.to_string()))
    }

    /// `init`'s write-default-and-stop behavior: refuses to clobber an
    /// existing file, warning and doing nothing instead.
    pub fn write_default_if_absent(path: &Path) -> Result<bool, PrivateerError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| PrivateerError::ConfigWriteFailed {
                path: path.display().to_string(),
                raw_error_message: err.to_string(),
            })?;
        }

        let default = Config::default();
        let rendered = serde_yaml::to_string(&default).map_err(|err| PrivateerError::ConfigWriteFailed {
            path: path.display().to_string(),
            raw_error_message: err.to_string(),
        })?;
        fs::write(path, rendered).map_err(|err| PrivateerError::ConfigWriteFailed {
            path: path.display().to_string(),
            raw_error_message: err.to_string(),
        })?;
        Ok(true)
    }

    /// Resolves every `registries[]` entry into the `(kind, RegistryConfig)`
    /// pairs a `RegistryManager` is built from.
    pub fn resolved_registries(&self) -> Result<Vec<(RegistryProductKind, RegistryConfig)>, PrivateerError> {
        self.registries.iter().map(RegistryEntry::resolve).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = Config::default();
        let rendered = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.settings.concurrency, config.settings.concurrency);
        assert!(parsed.gitops.auto_pr);
    }

    #[test]
    fn registry_entry_falls_back_to_access_key_secret_key_for_ecr() {
        let entry = RegistryEntry {
            name: "ecr".to_string(),
            kind: "ecr".to_string(),
            enabled: true,
            priority: 10,
            url: None,
            username: None,
            password: None,
            insecure: false,
            region: Some("us-east-1".to_string()),
            project: None,
            account_id: Some("123456789012".to_string()),
            profiles: vec![],
            access_key: Some("AKIA...".to_string()),
            secret_key: Some("shh".to_string()),
        };
        let (kind, cfg) = entry.resolve().unwrap();
        assert_eq!(kind, RegistryProductKind::Ecr);
        assert_eq!(cfg.username.as_deref(), Some("AKIA..."));
        assert_eq!(cfg.password.as_deref(), Some("shh"));
    }

    #[test]
    fn unknown_registry_type_is_config_invalid() {
        let entry = RegistryEntry {
            name: "mystery".to_string(),
            kind: "quay".to_string(),
            enabled: true,
            priority: 0,
            url: None,
            username: None,
            password: None,
            insecure: false,
            region: None,
            project: None,
            account_id: None,
            profiles: vec![],
            access_key: None,
            secret_key: None,
        };
        assert!(matches!(entry.resolve(), Err(PrivateerError::ConfigInvalid(_))));
    }
}
