//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `ami-vault.toml` discovered in the usual locations,
//! and `AMI_VAULT_*` environment variables. An explicit file passed on the
//! command line replaces discovery; its missing keys take the same defaults.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::{OrthoConfig, toml};
use serde::Deserialize;
use thiserror::Error;

use crate::eligibility::{DEFAULT_MAX_AGE_DAYS, EligibilityPolicy};
use crate::launcher::ArchiveTarget;
use crate::orchestrator::OrchestratorSettings;
use crate::retention::{DEFAULT_RETENTION_DAYS, RetentionPolicy};

const CONFIG_FILE_NAME: &str = "ami-vault.toml";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_NAME_PATTERNS: &str = "RHEL-7,RHEL-8,RHEL-9";
const DEFAULT_LOG_DIR: &str = "/var/log/ami_backup";

/// Archive settings loaded from layered sources.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AMI_VAULT",
    discovery(
        app_name = "ami-vault",
        env_var = "AMI_VAULT_CONFIG_PATH",
        config_file_name = "ami-vault.toml",
        dotfile_name = ".ami-vault.toml",
        project_file_name = "ami-vault.toml"
    )
)]
pub struct VaultConfig {
    /// Provider region. Defaults to `us-east-1`.
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket receiving archives and metadata. Required.
    #[ortho_config(default = String::new())]
    #[serde(default)]
    pub bucket: String,
    /// Comma separated name substrings selecting images for archival.
    #[ortho_config(default = DEFAULT_NAME_PATTERNS.to_owned())]
    #[serde(default = "default_name_patterns")]
    pub name_patterns: String,
    /// Images created more than this many days ago are not archived.
    #[ortho_config(default = DEFAULT_MAX_AGE_DAYS)]
    #[serde(default = "default_max_age_days")]
    pub max_image_age_days: u32,
    /// Archives older than this many days are deleted by cleanup.
    #[ortho_config(default = DEFAULT_RETENTION_DAYS)]
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Key prefix of archive objects. Store tasks write `<image id>.bin` at
    /// the bucket root, so this defaults to empty.
    #[ortho_config(default = String::new())]
    #[serde(default)]
    pub archive_prefix: String,
    /// Key prefix of metadata documents.
    #[ortho_config(default = crate::metadata::DEFAULT_METADATA_PREFIX.to_owned())]
    #[serde(default = "default_metadata_prefix")]
    pub metadata_prefix: String,
    /// Directory receiving the daily log file.
    #[ortho_config(default = DEFAULT_LOG_DIR.to_owned())]
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// HTTP(S) proxy for provider calls.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Static access key; the default credential chain is used when unset.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Static secret key paired with `access_key_id`.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Whether backups write a metadata document. Restores need one.
    #[ortho_config(default = true)]
    #[serde(default = "default_true")]
    pub write_metadata: bool,
}

/// Values supplied on the command line that take precedence over every
/// other source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigOverrides {
    /// Region override.
    pub region: Option<String>,
    /// Log directory override.
    pub log_dir: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl VaultConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, discovered configuration files, and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ami-vault")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid TOML for this structure.
    pub fn load_from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = read_file(path)?;
        Self::from_toml(&contents)
            .map_err(|err| ConfigError::Parse(format!("{path}: {err}")))
    }

    /// Parses configuration from TOML text, filling missing keys with
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text does not deserialize.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads from `path` when given, otherwise from discovered sources.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::load_from_file`] or [`Self::load_without_cli_args`]
    /// failures.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        path.map_or_else(Self::load_without_cli_args, Self::load_from_file)
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(region) = overrides.region {
            self.region = region;
        }
        if let Some(log_dir) = overrides.log_dir {
            self.log_dir = log_dir;
        }
        self
    }

    /// Name patterns split on commas; blanks are dropped.
    #[must_use]
    pub fn name_patterns(&self) -> Vec<String> {
        self.name_patterns
            .split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Static credentials when both halves are configured.
    #[must_use]
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Builds the workflow settings described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings, ConfigError> {
        self.validate()?;
        Ok(OrchestratorSettings {
            eligibility: EligibilityPolicy::new(self.name_patterns(), self.max_image_age_days),
            target: ArchiveTarget {
                bucket: self.bucket.trim().to_owned(),
                prefix: self.archive_prefix.clone(),
            },
            metadata_prefix: self.metadata_prefix.clone(),
            retention: RetentionPolicy::new(self.retention_days),
            write_metadata: self.write_metadata,
        })
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or the
    /// configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when values contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.bucket,
            &FieldMetadata::new("archive bucket", "AMI_VAULT_BUCKET", "bucket"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("provider region", "AMI_VAULT_REGION", "region"),
        )?;
        Self::require_field(
            &self.metadata_prefix.replace('/', ""),
            &FieldMetadata::new(
                "metadata prefix",
                "AMI_VAULT_METADATA_PREFIX",
                "metadata_prefix",
            ),
        )?;
        Self::require_field(
            &self.log_dir,
            &FieldMetadata::new("log directory", "AMI_VAULT_LOG_DIR", "log_dir"),
        )?;
        if self.name_patterns().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing image name patterns: set AMI_VAULT_NAME_PATTERNS or add name_patterns to {CONFIG_FILE_NAME}"
            )));
        }
        if self.max_image_age_days == 0 {
            return Err(ConfigError::Invalid(String::from(
                "max_image_age_days must be at least 1",
            )));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::Invalid(String::from(
                "retention_days must be at least 1",
            )));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigError::Invalid(String::from(
                "access_key_id and secret_access_key must be set together",
            )));
        }
        if self
            .proxy_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(ConfigError::Invalid(String::from(
                "proxy_url must not be empty when set",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates values that are present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader or the TOML parser.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when an explicit configuration file cannot be read.
    #[error("failed to read configuration file `{path}`: {message}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

fn read_file(path: &Utf8Path) -> Result<String, ConfigError> {
    let io_error = |message: String| ConfigError::Io {
        path: path.to_string(),
        message,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io_error(String::from("path is missing a file name")))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| io_error(err.to_string()))
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

fn default_name_patterns() -> String {
    DEFAULT_NAME_PATTERNS.to_owned()
}

const fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

const fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_metadata_prefix() -> String {
    crate::metadata::DEFAULT_METADATA_PREFIX.to_owned()
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_owned()
}

const fn default_true() -> bool {
    true
}
