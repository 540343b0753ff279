//! Error taxonomy for the self-update transaction
//!
//! Each stage of `Resolve → Fetch → Decode → (Validate) → Apply` fails with its
//! own error type. [`UpdateError`] wraps them all and can report which stage a
//! transaction stopped in. "Nothing found" is never an error: it is carried as
//! `Option::None` (or an unresolved [`crate::Release`]) instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

// ============================================================================
// Resolve
// ============================================================================

/// Malformed `"owner/name"` repository slug
#[derive(Debug, thiserror::Error)]
#[error("invalid slug {slug:?}: it should be in the format \"owner/name\"")]
pub struct SlugError {
    pub slug: String,
}

/// Failure reported by a [`crate::provider::ReleaseProvider`]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP 404: the repository or release does not exist. The resolver
    /// absorbs this into a "not found" result.
    #[error("repository or release not found")]
    NotFound,

    #[error("release API request to {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("release API request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("malformed release metadata from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Fetch
// ============================================================================

/// Failure downloading a release asset
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to download {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to download {url}: {message}")]
    Transport { url: String, message: String },

    #[error("failed to read response body from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Decode
// ============================================================================

/// Which layer of a (possibly nested) package format failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Zip,
    Gzip,
    Xz,
    Tar,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Zip => "zip",
            Layer::Gzip => "gzip",
            Layer::Xz => "xz",
            Layer::Tar => "tar",
        };
        f.write_str(name)
    }
}

/// Failure extracting the executable from a downloaded package
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("corrupt {layer} data in {url}: {source}")]
    Corrupt {
        layer: Layer,
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("file {name:?} for the command is not found in {url}")]
    EntryNotFound { name: String, url: String },

    #[error("file name {found:?} embedded in {url} does not match command {expected:?}")]
    NameMismatch {
        expected: String,
        found: String,
        url: String,
    },
}

// ============================================================================
// Validate
// ============================================================================

/// Digest or signature verification failure
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("malformed checksum proof: {0}")]
    MalformedChecksum(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(#[source] p256::ecdsa::Error),

    #[error("signature does not match the downloaded asset")]
    SignatureMismatch(#[source] p256::ecdsa::Error),

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("release has no {suffix} proof asset for {asset}")]
    MissingProof { asset: String, suffix: String },
}

// ============================================================================
// Apply
// ============================================================================

/// Failure replacing the on-disk executable. The destination is untouched
/// whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("failed to stat {path}: {source}")]
    StatPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve symlink {path}: {source}")]
    ResolveSymlink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write new binary next to {path}: {source}")]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move new binary into {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid enterprise base URL {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid asset filter {pattern:?}: {source}")]
    Filter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid validation settings: {0}")]
    Validator(#[source] IntegrityError),
}

// ============================================================================
// Transaction
// ============================================================================

/// Stage of the update transaction an error terminated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Fetch,
    Decode,
    Validate,
    Apply,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Slug(#[from] SlugError),

    #[error("failed to query releases of {slug}: {source}")]
    Provider {
        slug: String,
        #[source]
        source: ProviderError,
    },

    #[error("tag {tag:?} is not a semantic version: {source}")]
    Version {
        tag: String,
        #[source]
        source: semver::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl UpdateError {
    /// The transaction stage this error belongs to, `None` for configuration
    /// errors raised before any transaction starts.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UpdateError::Slug(_) | UpdateError::Provider { .. } | UpdateError::Version { .. } => {
                Some(Stage::Resolve)
            }
            UpdateError::Fetch(_) => Some(Stage::Fetch),
            UpdateError::Decode(_) => Some(Stage::Decode),
            UpdateError::Integrity(_) => Some(Stage::Validate),
            UpdateError::Apply(_) => Some(Stage::Apply),
            UpdateError::Config(_) => None,
        }
    }
}
