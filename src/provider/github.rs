//! GitHub Releases API provider (blocking, over `ureq`)

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

use super::ReleaseProvider;
use crate::error::{ConfigError, FetchError, ProviderError};
use crate::release::{AssetSummary, ReleaseSummary};
use crate::repo::RepoSlug;

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
pub const DEFAULT_USER_AGENT: &str = concat!("gh-selfupdate/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// GitHub Release Types
// ============================================================================

#[derive(Deserialize, Debug, Clone)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Deserialize, Debug, Clone)]
struct GithubAsset {
    id: u64,
    name: String,
    #[serde(default)]
    size: u64,
    browser_download_url: String,
}

impl From<GithubRelease> for ReleaseSummary {
    fn from(rel: GithubRelease) -> Self {
        ReleaseSummary {
            tag: rel.tag_name,
            name: rel.name.unwrap_or_default(),
            body: rel.body.unwrap_or_default(),
            published_at: rel.published_at,
            is_draft: rel.draft,
            is_prerelease: rel.prerelease,
            browse_url: rel.html_url,
            assets: rel
                .assets
                .into_iter()
                .map(|a| AssetSummary {
                    name: a.name,
                    size: a.size,
                    id: a.id,
                    download_url: a.browser_download_url,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Debug, Clone)]
pub struct GithubProvider {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
}

impl GithubProvider {
    /// Client for api.github.com
    pub fn new(token: Option<String>) -> Self {
        Self::build(DEFAULT_API_URL.to_string(), token, DEFAULT_USER_AGENT)
    }

    /// Client for a GitHub Enterprise server. `api/v3/` is appended to the
    /// base URL unless it is already there.
    pub fn enterprise(base_url: &str, token: Option<String>) -> Result<Self, ConfigError> {
        let mut base = normalize_base(base_url)?;
        if !base.ends_with("/api/v3/") {
            base.push_str("api/v3/");
        }
        Ok(Self::build(base, token, DEFAULT_USER_AGENT))
    }

    /// Client for an API served at exactly `base_url`
    pub fn with_api_base(base_url: &str, token: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self::build(normalize_base(base_url)?, token, DEFAULT_USER_AGENT))
    }

    pub fn with_user_agent(self, user_agent: &str) -> Self {
        Self::build(self.api_base, self.token, user_agent)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build(api_base: String, token: Option<String>, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(user_agent)
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self {
            agent,
            api_base,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn request(&self, url: &str, accept: &str) -> ureq::Request {
        let req = self.agent.get(url).set("Accept", accept);
        match &self.token {
            Some(token) => req.set("Authorization", &format!("token {}", token)),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        match self.request(url, "application/vnd.github+json").call() {
            Ok(response) => response
                .into_json::<T>()
                .map_err(|source| ProviderError::Malformed {
                    url: url.to_string(),
                    source,
                }),
            Err(ureq::Error::Status(404, _)) => Err(ProviderError::NotFound),
            Err(ureq::Error::Status(status, _)) => Err(ProviderError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(e)) => Err(ProviderError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn repo_url(&self, repo: &RepoSlug, rest: &str) -> String {
        format!("{}repos/{}/{}/{}", self.api_base, repo.owner, repo.name, rest)
    }
}

impl ReleaseProvider for GithubProvider {
    fn list_releases(&self, repo: &RepoSlug) -> Result<Vec<ReleaseSummary>, ProviderError> {
        let url = self.repo_url(repo, "releases?per_page=100");
        let releases: Vec<GithubRelease> = self.get_json(&url)?;
        Ok(releases.into_iter().map(ReleaseSummary::from).collect())
    }

    fn latest_release(&self, repo: &RepoSlug) -> Result<ReleaseSummary, ProviderError> {
        let url = self.repo_url(repo, "releases/latest");
        let release: GithubRelease = self.get_json(&url)?;
        Ok(release.into())
    }

    fn release_by_tag(&self, repo: &RepoSlug, tag: &str) -> Result<ReleaseSummary, ProviderError> {
        let url = self.repo_url(repo, &format!("releases/tags/{}", tag));
        let release: GithubRelease = self.get_json(&url)?;
        Ok(release.into())
    }

    fn fetch_asset(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        match self.request(url, "application/octet-stream").call() {
            Ok(response) => Ok(Box::new(response.into_reader())),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(e)) => Err(FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn normalize_base(base_url: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(base_url).map_err(|source| ConfigError::BaseUrl {
        url: base_url.to_string(),
        source,
    })?;
    let mut base = parsed.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(base)
}
