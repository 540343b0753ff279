//! Asset selection within a single release

use regex::Regex;
use semver::Version;

use crate::error::ConfigError;
use crate::release::{version_text, AssetSummary, ReleaseSummary};

/// Ordered list of compiled asset-name patterns
///
/// An empty set accepts every asset; otherwise an asset must match at least
/// one pattern.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<Regex>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|source| ConfigError::Filter {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Outcome of checking one release's tag before looking at its assets
#[derive(Debug)]
pub(crate) enum TagCheck<'a> {
    /// Usable; holds the tag with any prefix before the version stripped
    Usable(&'a str),
    Draft,
    Prerelease,
    NotSemver,
    OtherVersion,
}

/// Draft, prerelease, semver-shape and (optionally) exact-version gating
pub(crate) fn check_tag<'a>(release: &'a ReleaseSummary, target: Option<&str>) -> TagCheck<'a> {
    if release.is_draft {
        return TagCheck::Draft;
    }
    if release.is_prerelease {
        return TagCheck::Prerelease;
    }
    let Some(text) = version_text(&release.tag) else {
        return TagCheck::NotSemver;
    };
    match target {
        Some(target) if target != text => TagCheck::OtherVersion,
        _ => TagCheck::Usable(text),
    }
}

/// First asset of `release` whose name ends with one of `suffixes` and passes
/// `filters`. Assets are tried in the order the provider listed them.
pub fn match_asset<'a>(
    release: &'a ReleaseSummary,
    suffixes: &[String],
    filters: &FilterSet,
) -> Option<&'a AssetSummary> {
    release.assets.iter().find(|asset| {
        filters.accepts(&asset.name) && suffixes.iter().any(|s| asset.name.ends_with(s.as_str()))
    })
}

/// Select the qualifying asset of one release
///
/// Returns the asset together with the release's parsed version, or `None`
/// when the release is a draft or prerelease, does not carry a semantic
/// version, is not `target_version` (when given), or has no asset for the
/// platform. A tag that looks like a version but fails to parse is an error.
pub fn find_asset_from_release<'a>(
    release: &'a ReleaseSummary,
    suffixes: &[String],
    target_version: Option<&str>,
    filters: &FilterSet,
) -> Result<Option<(&'a AssetSummary, Version)>, semver::Error> {
    let TagCheck::Usable(text) = check_tag(release, target_version) else {
        return Ok(None);
    };
    let version = Version::parse(text)?;
    Ok(match_asset(release, suffixes, filters).map(|asset| (asset, version)))
}
