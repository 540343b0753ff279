//! Release providers
//!
//! A provider lists a repository's releases and downloads their assets. The
//! resolver only ever talks to the [`ReleaseProvider`] trait; [`GithubProvider`]
//! is the networked implementation and [`StaticProvider`] serves fixed data
//! from memory.

pub mod github;

use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::error::{FetchError, ProviderError};
use crate::release::ReleaseSummary;
use crate::repo::RepoSlug;

pub use github::GithubProvider;

pub trait ReleaseProvider: Send + Sync {
    /// All releases of the repository, newest first if the backend can say so
    fn list_releases(&self, repo: &RepoSlug) -> Result<Vec<ReleaseSummary>, ProviderError>;

    /// The release the backend considers latest
    fn latest_release(&self, repo: &RepoSlug) -> Result<ReleaseSummary, ProviderError> {
        self.list_releases(repo)?
            .into_iter()
            .find(|r| !r.is_draft && !r.is_prerelease)
            .ok_or(ProviderError::NotFound)
    }

    /// The release published under exactly `tag`
    fn release_by_tag(&self, repo: &RepoSlug, tag: &str) -> Result<ReleaseSummary, ProviderError> {
        self.list_releases(repo)?
            .into_iter()
            .find(|r| r.tag == tag)
            .ok_or(ProviderError::NotFound)
    }

    /// Plain GET of an asset's download URL
    fn fetch_asset(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

// ============================================================================
// In-memory provider
// ============================================================================

/// Provider backed by fixed release metadata and asset bodies
///
/// Releases registered for one repository are returned in insertion order.
/// Unknown repositories behave like a 404.
#[derive(Debug, Default, Clone)]
pub struct StaticProvider {
    releases: HashMap<RepoSlug, Vec<ReleaseSummary>>,
    assets: HashMap<String, Vec<u8>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, repo: &RepoSlug, release: ReleaseSummary) -> Self {
        self.releases.entry(repo.clone()).or_default().push(release);
        self
    }

    pub fn with_asset(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.assets.insert(url.into(), body.into());
        self
    }
}

impl ReleaseProvider for StaticProvider {
    fn list_releases(&self, repo: &RepoSlug) -> Result<Vec<ReleaseSummary>, ProviderError> {
        self.releases
            .get(repo)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    fn fetch_asset(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        match self.assets.get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
