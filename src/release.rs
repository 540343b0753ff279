//! Release data model
//!
//! [`ReleaseSummary`] and [`AssetSummary`] are what a release provider hands
//! back, read-only to the updater. [`Release`] is the resolved result: one
//! release paired with the one asset built for the target platform.

use chrono::{DateTime, Utc};
use regex::Regex;
use semver::Version;
use std::sync::LazyLock;

use crate::repo::RepoSlug;

static VERSION_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("version pattern is valid"));

// ============================================================================
// Provider-side metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSummary {
    pub name: String,
    pub size: u64,
    pub id: u64,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub tag: String,
    pub name: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_draft: bool,
    pub is_prerelease: bool,
    pub browse_url: String,
    pub assets: Vec<AssetSummary>,
}

// ============================================================================
// Tags
// ============================================================================

/// The part of a tag starting at its first `major.minor.patch` run, or `None`
/// if the tag never adopted semantic versioning.
///
/// `"release-v1.2.3"` and `"rel-1.2.3"` both give `"1.2.3"`.
pub fn version_text(tag: &str) -> Option<&str> {
    VERSION_RUN.find(tag).map(|m| &tag[m.start()..])
}

// ============================================================================
// Resolved release
// ============================================================================

/// A release resolved for the target platform
///
/// `asset_url` is non-empty exactly when an asset was matched. An unresolved
/// release (see [`Release::unresolved`]) only carries the caller's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub asset_url: String,
    pub asset_name: String,
    pub asset_byte_size: u64,
    pub asset_id: u64,
    pub validation_asset_id: Option<u64>,
    pub validation_asset_url: Option<String>,
    pub browse_url: String,
    pub release_notes: String,
    pub name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub repo_owner: String,
    pub repo_name: String,
}

impl Release {
    pub(crate) fn new(
        repo: &RepoSlug,
        release: &ReleaseSummary,
        asset: &AssetSummary,
        version: Version,
        validation: Option<&AssetSummary>,
    ) -> Self {
        Self {
            version,
            asset_url: asset.download_url.clone(),
            asset_name: asset.name.clone(),
            asset_byte_size: asset.size,
            asset_id: asset.id,
            validation_asset_id: validation.map(|a| a.id),
            validation_asset_url: validation.map(|a| a.download_url.clone()),
            browse_url: release.browse_url.clone(),
            release_notes: release.body.clone(),
            name: release.name.clone(),
            published_at: release.published_at,
            repo_owner: repo.owner.clone(),
            repo_name: repo.name.clone(),
        }
    }

    /// Result for "nothing to install": carries only the given version
    pub fn unresolved(current: Version) -> Self {
        Self {
            version: current,
            asset_url: String::new(),
            asset_name: String::new(),
            asset_byte_size: 0,
            asset_id: 0,
            validation_asset_id: None,
            validation_asset_url: None,
            browse_url: String::new(),
            release_notes: String::new(),
            name: String::new(),
            published_at: None,
            repo_owner: String::new(),
            repo_name: String::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        !self.asset_url.is_empty()
    }

    /// `true` if this release is strictly newer than `current`
    pub fn is_newer_than(&self, current: &Version) -> bool {
        self.is_found() && self.version > *current
    }
}
