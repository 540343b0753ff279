//! Release resolution
//!
//! Turns a repository slug into the release (and asset) that applies to the
//! target platform. A missing repository and a repository with no usable
//! release both resolve to `None`; only real failures are errors.

use semver::Version;
use std::cmp::Ordering;

use crate::error::{ProviderError, UpdateError};
use crate::logging::Logger;
use crate::matcher::{check_tag, match_asset, FilterSet, TagCheck};
use crate::platform::Platform;
use crate::provider::ReleaseProvider;
use crate::release::{version_text, Release, ReleaseSummary};
use crate::repo::RepoSlug;

pub struct Resolver {
    provider: Box<dyn ReleaseProvider>,
    platform: Platform,
    suffixes: Vec<String>,
    filters: FilterSet,
    validation_suffix: Option<String>,
    log: Logger,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("platform", &self.platform)
            .field("filters", &self.filters)
            .field("validation_suffix", &self.validation_suffix)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(provider: Box<dyn ReleaseProvider>, platform: Platform, log: Logger) -> Self {
        Self {
            provider,
            suffixes: platform.asset_suffixes(),
            platform,
            filters: FilterSet::new(),
            validation_suffix: None,
            log,
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Also record the asset named `<asset name><suffix>` of each resolved
    /// release as its validation asset
    pub fn with_validation_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.validation_suffix = Some(suffix.into());
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn provider(&self) -> &dyn ReleaseProvider {
        self.provider.as_ref()
    }

    /// Newest release with an asset for the platform
    pub fn detect_latest(&self, slug: &str) -> Result<Option<Release>, UpdateError> {
        let repo = RepoSlug::parse(slug)?;
        for summary in self.releases(&repo)? {
            if let Some(release) = self.resolve(&repo, &summary, None)? {
                self.log.info(&format!(
                    "Found release {} ({}) of {}",
                    release.version, release.asset_name, repo
                ));
                return Ok(Some(release));
            }
        }
        self.log
            .info(&format!("No release of {} has an asset for {}", repo, self.platform));
        Ok(None)
    }

    /// The release whose tag carries exactly `version`
    ///
    /// A leading prefix on `version` is ignored the same way it is on tags, so
    /// `"v1.2.3"` and `"1.2.3"` ask for the same release.
    pub fn detect_version(&self, slug: &str, version: &str) -> Result<Option<Release>, UpdateError> {
        let repo = RepoSlug::parse(slug)?;
        let target = version_text(version).unwrap_or(version);
        for summary in self.releases(&repo)? {
            if let Some(release) = self.resolve(&repo, &summary, Some(target))? {
                return Ok(Some(release));
            }
        }
        self.log.info(&format!(
            "Version {} of {} not found for {}",
            target, repo, self.platform
        ));
        Ok(None)
    }

    /// Every release with an asset for the platform, newest first
    pub fn list(&self, slug: &str) -> Result<Vec<Release>, UpdateError> {
        let repo = RepoSlug::parse(slug)?;
        let mut found = Vec::new();
        for summary in self.releases(&repo)? {
            if let Some(release) = self.resolve(&repo, &summary, None)? {
                found.push(release);
            }
        }
        Ok(found)
    }

    fn releases(&self, repo: &RepoSlug) -> Result<Vec<ReleaseSummary>, UpdateError> {
        match self.provider.list_releases(repo) {
            Ok(mut releases) => {
                sort_newest_first(&mut releases);
                Ok(releases)
            }
            Err(ProviderError::NotFound) => {
                self.log
                    .warning(&format!("Repository or release not found: {}", repo));
                Ok(Vec::new())
            }
            Err(source) => Err(UpdateError::Provider {
                slug: repo.to_string(),
                source,
            }),
        }
    }

    fn resolve(
        &self,
        repo: &RepoSlug,
        summary: &ReleaseSummary,
        target: Option<&str>,
    ) -> Result<Option<Release>, UpdateError> {
        let text = match check_tag(summary, target) {
            TagCheck::Usable(text) => text,
            TagCheck::Draft => {
                self.log.info(&format!("Skip draft version {}", summary.tag));
                return Ok(None);
            }
            TagCheck::Prerelease => {
                self.log.info(&format!("Skip pre-release version {}", summary.tag));
                return Ok(None);
            }
            TagCheck::NotSemver => {
                self.log.info(&format!(
                    "Skip version not adopting semver: {}",
                    summary.tag
                ));
                return Ok(None);
            }
            TagCheck::OtherVersion => return Ok(None),
        };

        let version = Version::parse(text).map_err(|source| UpdateError::Version {
            tag: summary.tag.clone(),
            source,
        })?;

        let Some(asset) = match_asset(summary, &self.suffixes, &self.filters) else {
            self.log.info(&format!(
                "No asset for {} in release {}",
                self.platform, summary.tag
            ));
            return Ok(None);
        };

        let validation = self.validation_suffix.as_deref().and_then(|suffix| {
            let name = format!("{}{}", asset.name, suffix);
            summary.assets.iter().find(|a| a.name == name)
        });

        Ok(Some(Release::new(repo, summary, asset, version, validation)))
    }
}

/// Stable sort by publish time, newest first; undated releases keep their
/// relative order after all dated ones
fn sort_newest_first(releases: &mut [ReleaseSummary]) {
    releases.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
