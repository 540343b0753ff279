//! Target platform detection for asset selection
//!
//! Release assets are conventionally named with Go-style platform words
//! (`linux`, `darwin`, `windows`; `amd64`, `arm64`, `386`), so the host's Rust
//! target names are translated into that vocabulary.

use std::fmt;
use std::sync::OnceLock;

/// Process-wide default, set at most once before any resolution starts
static PROCESS_DEFAULT: OnceLock<Platform> = OnceLock::new();

const EXTENSIONS: [&str; 7] = ["", ".zip", ".tar.gz", ".gzip", ".gz", ".tar.xz", ".xz"];
const SEPARATORS: [char; 2] = ['_', '-'];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was compiled for
    pub fn host() -> Self {
        Self::new(
            os_name(std::env::consts::OS),
            arch_name(std::env::consts::ARCH),
        )
    }

    /// The process default if one was installed, otherwise the host
    pub fn current() -> Self {
        PROCESS_DEFAULT.get().cloned().unwrap_or_else(Self::host)
    }

    /// Install a process-wide default for cross-targeting. Only the first call
    /// wins; later calls get their platform handed back as the error.
    pub fn init_process_default(platform: Platform) -> Result<(), Platform> {
        PROCESS_DEFAULT.set(platform)
    }

    /// Host platform with any of its parts replaced
    pub fn with_overrides(os: Option<&str>, arch: Option<&str>) -> Self {
        let base = Self::current();
        Self {
            os: os.map(str::to_string).unwrap_or(base.os),
            arch: arch.map(str::to_string).unwrap_or(base.arch),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// File name suffixes an asset built for this platform may end with
    ///
    /// `<os><sep><arch><ext>` for every separator and extension, plus an
    /// `.exe`-infixed variant of each on Windows.
    pub fn asset_suffixes(&self) -> Vec<String> {
        let mut suffixes = Vec::with_capacity(SEPARATORS.len() * EXTENSIONS.len() * 2);
        for sep in SEPARATORS {
            for ext in EXTENSIONS {
                suffixes.push(format!("{}{}{}{}", self.os, sep, self.arch, ext));
                if self.is_windows() {
                    suffixes.push(format!("{}{}{}.exe{}", self.os, sep, self.arch, ext));
                }
            }
        }
        suffixes
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

fn os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}
