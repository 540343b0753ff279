//! The self-update transaction
//!
//! `Resolve → Fetch → Decode → (Validate) → Apply`. Each stage either hands
//! its output to the next or ends the transaction with its own error; nothing
//! is retried and nothing past a failed stage runs.

use semver::Version;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::apply::{Applier, ReplaceStrategy};
use crate::config::UpdaterConfig;
use crate::decode::Decoder;
use crate::error::{ApplyError, ConfigError, FetchError, IntegrityError, UpdateError};
use crate::logging::Logger;
use crate::matcher::FilterSet;
use crate::platform::Platform;
use crate::provider::ReleaseProvider;
use crate::release::Release;
use crate::resolver::Resolver;
use crate::validate::Validator;

pub struct Updater {
    resolver: Resolver,
    validator: Option<Box<dyn Validator>>,
    decoder: Decoder,
    applier: Applier,
    log: Logger,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("resolver", &self.resolver)
            .field("validated", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Updater talking to GitHub (or GitHub Enterprise) as configured
    pub fn new(config: &UpdaterConfig, log: Logger) -> Result<Self, ConfigError> {
        let provider = config.provider()?;
        let mut updater = Self::with_provider(Box::new(provider), config.platform(), log)
            .with_filters(config.filter_set()?);
        if let Some(validator) = config.validator()? {
            updater = updater.with_validator(validator);
        }
        Ok(updater)
    }

    pub fn with_provider(
        provider: Box<dyn ReleaseProvider>,
        platform: Platform,
        log: Logger,
    ) -> Self {
        Self {
            decoder: Decoder::new(&platform, log.clone()),
            applier: Applier::new(&platform, log.clone()),
            resolver: Resolver::new(provider, platform, log.clone()),
            validator: None,
            log,
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.resolver = self.resolver.with_filters(filters);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.resolver = self.resolver.with_validation_suffix(validator.suffix());
        self.validator = Some(validator);
        self
    }

    pub fn with_strategy(mut self, strategy: impl ReplaceStrategy + 'static) -> Self {
        self.applier = self.applier.with_strategy(strategy);
        self
    }

    pub fn platform(&self) -> &Platform {
        self.resolver.platform()
    }

    // ------------------------------------------------------------------------
    // Resolve
    // ------------------------------------------------------------------------

    pub fn detect_latest(&self, slug: &str) -> Result<Option<Release>, UpdateError> {
        self.resolver.detect_latest(slug)
    }

    pub fn detect_version(&self, slug: &str, version: &str) -> Result<Option<Release>, UpdateError> {
        self.resolver.detect_version(slug, version)
    }

    pub fn list_releases(&self, slug: &str) -> Result<Vec<Release>, UpdateError> {
        self.resolver.list(slug)
    }

    // ------------------------------------------------------------------------
    // Fetch, validate, decode, apply
    // ------------------------------------------------------------------------

    /// Install `release` over the executable at `cmd_path`
    ///
    /// With a validator configured, the release must carry the matching proof
    /// asset and the download must pass validation before anything on disk is
    /// touched. Returns the path that was replaced.
    pub fn update_to(&self, release: &Release, cmd_path: &Path) -> Result<PathBuf, UpdateError> {
        let data = self.download(&release.asset_url)?;

        if let Some(validator) = &self.validator {
            let Some(proof_url) = release.validation_asset_url.as_deref() else {
                return Err(IntegrityError::MissingProof {
                    asset: release.asset_name.clone(),
                    suffix: validator.suffix().to_string(),
                }
                .into());
            };
            let proof = self.download(proof_url)?;
            validator.validate(&data, &proof)?;
            self.log
                .info(&format!("Validated {} against {}", release.asset_name, proof_url));
        }

        self.install(data, &release.asset_url, cmd_path)
    }

    /// Install whatever `asset_url` serves, skipping resolution and validation
    pub fn update_to_url(&self, asset_url: &str, cmd_path: &Path) -> Result<PathBuf, UpdateError> {
        let data = self.download(asset_url)?;
        self.install(data, asset_url, cmd_path)
    }

    /// Update the executable at `cmd_path` to the latest release of `slug`
    ///
    /// When no release is found, or the latest is not newer than `current`,
    /// the binary is left alone and the result is an unresolved release
    /// carrying `current`.
    pub fn update_command(
        &self,
        cmd_path: &Path,
        current: &Version,
        slug: &str,
    ) -> Result<Release, UpdateError> {
        let Some(latest) = self.detect_latest(slug)? else {
            self.log.info(&format!(
                "No release detected. Current version {} is considered up-to-date",
                current
            ));
            return Ok(Release::unresolved(current.clone()));
        };

        if !latest.is_newer_than(current) {
            self.log
                .info(&format!("Current version {} is the latest", current));
            return Ok(Release::unresolved(current.clone()));
        }

        self.log.info(&format!(
            "Will update {} from {} to {}",
            cmd_path.display(),
            current,
            latest.version
        ));
        if let Err(e) = self.update_to(&latest, cmd_path) {
            self.log
                .error(&format!("Update to {} failed: {}", latest.version, e));
            return Err(e);
        }
        self.log.install(&format!(
            "Updated to {}. Restart to use the new version.",
            latest.version
        ));
        Ok(latest)
    }

    /// [`Updater::update_command`] on the running executable
    pub fn update_self(&self, current: &Version, slug: &str) -> Result<Release, UpdateError> {
        let exe = std::env::current_exe().map_err(|source| ApplyError::StatPath {
            path: PathBuf::from(std::env::args_os().next().unwrap_or_default()),
            source,
        })?;
        self.update_command(&exe, current, slug)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.log.download(&format!("Downloading {}", url));
        let mut reader = self.resolver.provider().fetch_asset(url)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|source| FetchError::Read {
                url: url.to_string(),
                source,
            })?;
        Ok(data)
    }

    fn install(&self, data: Vec<u8>, url: &str, cmd_path: &Path) -> Result<PathBuf, UpdateError> {
        let cmd = cmd_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let payload = self.decoder.decode(Cursor::new(data), url, &cmd)?;
        Ok(self.applier.apply(payload, cmd_path)?)
    }
}
