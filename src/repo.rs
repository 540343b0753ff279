//! `owner/name` repository slugs

use std::fmt;
use std::str::FromStr;

use crate::error::SlugError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse `"owner/name"`. Both parts must be non-empty and there must be
    /// exactly one separator; no other character validation is done.
    pub fn parse(slug: &str) -> Result<Self, SlugError> {
        let mut parts = slug.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(SlugError {
                slug: slug.to_string(),
            }),
        }
    }
}

impl FromStr for RepoSlug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
