//! gh_selfupdate - let a program update itself from GitHub releases
//!
//! The library resolves the newest release of a repository that ships an
//! asset for the running platform, downloads it, optionally verifies it
//! against a checksum or signature published next to it, extracts the
//! executable from whatever archive it was packaged in, and swaps it into
//! place without ever leaving a half-written binary behind.
//!
//! ```no_run
//! use gh_selfupdate::{Logger, StderrSink, Updater, UpdaterConfig};
//! use semver::Version;
//!
//! let updater = Updater::new(&UpdaterConfig::default(), Logger::new(StderrSink))?;
//! let current = Version::parse(env!("CARGO_PKG_VERSION"))?;
//! let release = updater.update_self(&current, "owner/tool")?;
//! if release.is_found() {
//!     println!("updated to {}", release.version);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod apply;
pub mod config;
pub mod decode;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod platform;
pub mod provider;
pub mod release;
pub mod repo;
pub mod resolver;
pub mod updater;
pub mod validate;

pub use config::{UpdaterConfig, ValidationConfig};
pub use error::{
    ApplyError, ConfigError, DecodeError, FetchError, IntegrityError, ProviderError, SlugError,
    Stage, UpdateError,
};
pub use logging::{FacadeSink, LogLevel, LogSink, Logger, MemorySink, NullSink, StderrSink};
pub use matcher::{find_asset_from_release, FilterSet};
pub use platform::Platform;
pub use provider::{GithubProvider, ReleaseProvider, StaticProvider};
pub use release::{AssetSummary, Release, ReleaseSummary};
pub use repo::RepoSlug;
pub use resolver::Resolver;
pub use updater::Updater;
pub use validate::{EcdsaValidator, Sha256Validator, Validator};
