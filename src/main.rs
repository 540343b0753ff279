//! selfupdate - inspect and install GitHub releases of a command
//!
//! Thin command line front end over the `gh_selfupdate` library.

use clap::{Args, Parser, Subcommand};
use semver::Version;
use std::path::PathBuf;
use std::process::ExitCode;

use gh_selfupdate::apply::can_replace;
use gh_selfupdate::{
    FacadeSink, Logger, NullSink, Platform, Release, StderrSink, UpdateError, Updater,
    UpdaterConfig,
};

#[derive(Parser, Debug)]
#[command(version, about = "Update a command from its GitHub releases")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to configuration file (TOML or JSON)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// API token (overrides config, $GITHUB_TOKEN and git config)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Target OS in release naming (linux, darwin, windows, ...)
    #[arg(long, global = true)]
    os: Option<String>,

    /// Target architecture in release naming (amd64, arm64, 386, ...)
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Only consider assets whose name matches this regex (repeatable)
    #[arg(long = "filter", global = true)]
    filters: Vec<String>,

    /// Log timestamped lines to stderr instead of through env_logger
    #[arg(long, global = true, conflicts_with = "quiet")]
    plain_log: bool,

    /// No log output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Debug level logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the newest release (or the given version) for this platform
    Detect {
        /// Repository as owner/name
        slug: String,

        /// Look for exactly this version instead of the newest
        #[arg(long)]
        version: Option<String>,
    },
    /// List every release with an asset for this platform
    List {
        /// Repository as owner/name
        slug: String,
    },
    /// Replace the executable at PATH with a newer release
    Update {
        /// Repository as owner/name
        slug: String,

        /// Executable to replace
        path: PathBuf,

        /// Version of the executable currently at PATH
        #[arg(long)]
        current: Version,

        /// Install exactly this version, even if it is not newer
        #[arg(long)]
        version: Option<String>,
    },
    /// Replace the executable at PATH with whatever URL serves
    FromUrl {
        url: String,

        /// Executable to replace
        path: PathBuf,
    },
    /// Update this program itself
    SelfUpdate {
        /// Repository this program is released from
        #[arg(long)]
        slug: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = init_logging(&cli.opts);

    match run(cli, log) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let stage = e
                .stage()
                .map(|s| format!(" ({:?} stage)", s))
                .unwrap_or_default();
            eprintln!("Error{}: {}", stage, e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(opts: &GlobalOpts) -> Logger {
    if opts.quiet {
        return Logger::new(NullSink);
    }
    if opts.plain_log {
        return Logger::new(StderrSink);
    }

    let level = if opts.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_target(false)
        .init();
    Logger::new(FacadeSink)
}

fn load_config(opts: &GlobalOpts) -> Result<UpdaterConfig, UpdateError> {
    let mut config = match &opts.config {
        Some(path) => UpdaterConfig::load(path)?,
        None => match dirs::config_dir() {
            Some(dir) => UpdaterConfig::load_or_default(&UpdaterConfig::default_path(&dir))?,
            None => UpdaterConfig::default(),
        },
    };

    if opts.token.is_some() {
        config.api_token = opts.token.clone();
    }
    config.filters.extend(opts.filters.iter().cloned());

    if opts.os.is_some() || opts.arch.is_some() {
        let target = Platform::with_overrides(opts.os.as_deref(), opts.arch.as_deref());
        config.os = Some(target.os.clone());
        config.arch = Some(target.arch.clone());
        // Fixed before any resolution starts
        let _ = Platform::init_process_default(target);
    }
    Ok(config)
}

fn run(cli: Cli, log: Logger) -> Result<(), UpdateError> {
    let config = load_config(&cli.opts)?;
    let updater = Updater::new(&config, log)?;

    match cli.cmd {
        Cmd::Detect { slug, version } => {
            let found = match version {
                Some(version) => updater.detect_version(&slug, &version)?,
                None => updater.detect_latest(&slug)?,
            };
            match found {
                Some(release) => print_release(&release),
                None => println!("No release of {} for {}", slug, updater.platform()),
            }
        }
        Cmd::List { slug } => {
            let releases = updater.list_releases(&slug)?;
            if releases.is_empty() {
                println!("No release of {} for {}", slug, updater.platform());
            }
            for release in releases {
                println!("{}\t{}\t{}", release.version, release.asset_name, release.asset_url);
            }
        }
        Cmd::Update {
            slug,
            path,
            current,
            version,
        } => {
            if !can_replace(&path) {
                println!("Cannot write next to {}; try again with more privileges", path.display());
            }
            match version {
                Some(version) => match updater.detect_version(&slug, &version)? {
                    Some(release) => {
                        let replaced = updater.update_to(&release, &path)?;
                        println!("Installed {} at {}", release.version, replaced.display());
                    }
                    None => println!("Version {} of {} not found", version, slug),
                },
                None => {
                    let release = updater.update_command(&path, &current, &slug)?;
                    report_update(&release, &current);
                }
            }
        }
        Cmd::FromUrl { url, path } => {
            let replaced = updater.update_to_url(&url, &path)?;
            println!("Installed {} at {}", url, replaced.display());
        }
        Cmd::SelfUpdate { slug } => {
            let current = Version::parse(env!("CARGO_PKG_VERSION")).map_err(|source| {
                UpdateError::Version {
                    tag: env!("CARGO_PKG_VERSION").to_string(),
                    source,
                }
            })?;
            let release = updater.update_self(&current, &slug)?;
            report_update(&release, &current);
        }
    }
    Ok(())
}

fn report_update(release: &Release, current: &Version) {
    if release.is_found() {
        println!("Updated {} -> {}", current, release.version);
        if !release.release_notes.is_empty() {
            println!("\n{}", release.release_notes);
        }
    } else {
        println!("Current version {} is the latest", current);
    }
}

fn print_release(release: &Release) {
    println!("Version:   {}", release.version);
    if !release.name.is_empty() {
        println!("Name:      {}", release.name);
    }
    println!("Asset:     {} ({} bytes)", release.asset_name, release.asset_byte_size);
    println!("URL:       {}", release.asset_url);
    if let Some(url) = &release.validation_asset_url {
        println!("Proof:     {}", url);
    }
    if let Some(published) = release.published_at {
        println!("Published: {}", published.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("Release:   {}", release.browse_url);
    if !release.release_notes.is_empty() {
        println!("\n{}", release.release_notes);
    }
}
