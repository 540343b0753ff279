use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ConfigError;
use crate::matcher::FilterSet;
use crate::platform::Platform;
use crate::provider::GithubProvider;
use crate::validate::{EcdsaValidator, Sha256Validator, Validator};

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

// ============================================================================
// Updater Config
// ============================================================================

/// Settings for building an [`crate::Updater`], read from TOML or JSON
///
/// ```toml
/// enterprise_base_url = "https://github.example.com"
/// filters = ["^tool_"]
/// os = "linux"
///
/// [validation]
/// kind = "sha256"
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub api_token: Option<String>,
    pub enterprise_base_url: Option<String>,
    pub filters: Vec<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub validation: Option<ValidationConfig>,
    pub user_agent: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ValidationConfig {
    Sha256,
    Ecdsa { public_key_pem: String },
}

impl UpdaterConfig {
    /// Read a config file; `.json` files are parsed as JSON, anything else
    /// as TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| parse_err(e.to_string()))
        }
    }

    /// Like [`UpdaterConfig::load`], but a missing file gives the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default location under the user's config directory
    pub fn default_path(config_dir: &Path) -> PathBuf {
        config_dir.join("gh-selfupdate").join("config.toml")
    }

    /// API token: explicit setting, then `$GITHUB_TOKEN`, then
    /// `git config github.token`
    pub fn resolve_token(&self) -> Option<String> {
        non_empty(self.api_token.clone())
            .or_else(|| non_empty(std::env::var(TOKEN_ENV).ok()))
            .or_else(git_config_token)
    }

    pub fn platform(&self) -> Platform {
        Platform::with_overrides(self.os.as_deref(), self.arch.as_deref())
    }

    pub fn filter_set(&self) -> Result<FilterSet, ConfigError> {
        FilterSet::compile(&self.filters)
    }

    pub fn provider(&self) -> Result<GithubProvider, ConfigError> {
        let token = self.resolve_token();
        let provider = match self.enterprise_base_url.as_deref() {
            Some(base) => GithubProvider::enterprise(base, token)?,
            None => GithubProvider::new(token),
        };
        Ok(match self.user_agent.as_deref() {
            Some(agent) => provider.with_user_agent(agent),
            None => provider,
        })
    }

    pub fn validator(&self) -> Result<Option<Box<dyn Validator>>, ConfigError> {
        match &self.validation {
            None => Ok(None),
            Some(ValidationConfig::Sha256) => Ok(Some(Box::new(Sha256Validator))),
            Some(ValidationConfig::Ecdsa { public_key_pem }) => {
                let validator = EcdsaValidator::from_public_key_pem(public_key_pem)
                    .map_err(ConfigError::Validator)?;
                Ok(Some(Box::new(validator)))
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn git_config_token() -> Option<String> {
    let output = Command::new("git")
        .args(["config", "--get", "github.token"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    non_empty(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}
