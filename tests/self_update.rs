use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use gh_selfupdate::apply::AtomicRename;
use gh_selfupdate::{
    AssetSummary, EcdsaValidator, FilterSet, GithubProvider, LogLevel, Logger, MemorySink,
    Platform, ReleaseSummary, RepoSlug, StaticProvider, Stage, UpdateError, Updater,
};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use semver::Version;
use xz2::write::XzEncoder;
use zip::write::SimpleFileOptions;

const SLUG: &str = "acme/widget";
const NEW_BINARY: &[u8] = b"\x7fELF new widget build";

fn tar_xz(path: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(XzEncoder::new(Vec::new(), 6));
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

fn zip(path: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_directory("widget-1.1.0/", SimpleFileOptions::default()).unwrap();
    writer.start_file("widget-1.1.0/README.md", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"# widget").unwrap();
    writer.start_file(path, SimpleFileOptions::default()).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn asset(name: &str, id: u64) -> AssetSummary {
    AssetSummary {
        name: name.to_string(),
        size: 0,
        id,
        download_url: format!("https://downloads.example.com/acme/widget/{}", name),
    }
}

fn summary(tag: &str, assets: Vec<AssetSummary>) -> ReleaseSummary {
    ReleaseSummary {
        tag: tag.to_string(),
        name: format!("widget {}", tag),
        body: "Bug fixes".to_string(),
        published_at: None,
        is_draft: false,
        is_prerelease: false,
        browse_url: format!("https://github.com/acme/widget/releases/tag/{}", tag),
        assets,
    }
}

fn install_old(dir: &Path) -> PathBuf {
    let path = dir.join("widget");
    fs::write(&path, b"old widget build").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name != "widget")
        .collect()
}

#[test]
fn signed_zip_release_replaces_binary() {
    let repo = RepoSlug::parse(SLUG).unwrap();
    let key = SigningKey::from_slice(&[0x11; 32]).unwrap();

    let package = zip("widget-1.1.0/widget", NEW_BINARY);
    let signature: Signature = key.sign(&package);
    let main = asset("widget_1.1.0_linux-amd64.zip", 10);
    let sig = asset("widget_1.1.0_linux-amd64.zip.sig", 11);

    let provider = StaticProvider::new()
        .with_release(&repo, summary("v1.0.0", vec![asset("widget_1.0.0_linux-amd64.zip", 1)]))
        .with_release(
            &repo,
            summary(
                "v1.1.0",
                vec![asset("widget_1.1.0_darwin-amd64.zip", 9), main.clone(), sig.clone()],
            ),
        )
        .with_asset(main.download_url, package)
        .with_asset(sig.download_url, signature.to_der().as_bytes().to_vec());

    let sink = Arc::new(MemorySink::default());
    let updater = Updater::with_provider(
        Box::new(provider),
        Platform::new("linux", "amd64"),
        Logger::from_arc(sink.clone()),
    )
    .with_validator(Box::new(EcdsaValidator::new(VerifyingKey::from(&key))))
    .with_strategy(AtomicRename);

    let dir = tempfile::tempdir().unwrap();
    let path = install_old(dir.path());

    let releases = updater.list_releases(SLUG).unwrap();
    assert_eq!(releases.len(), 2);

    let target = updater.detect_version(SLUG, "1.1.0").unwrap().unwrap();
    assert_eq!(target.asset_id, 10);
    assert_eq!(target.validation_asset_id, Some(11));

    updater.update_to(&target, &path).unwrap();

    assert_eq!(fs::read(&path).unwrap(), NEW_BINARY);
    assert!(leftovers(dir.path()).is_empty());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    let lines = sink.lines();
    assert!(lines.iter().any(|(level, _)| *level == LogLevel::Download));
    assert!(lines.iter().any(|(level, _)| *level == LogLevel::Install));
}

#[test]
fn tampered_download_never_reaches_disk() {
    let repo = RepoSlug::parse(SLUG).unwrap();
    let key = SigningKey::from_slice(&[0x22; 32]).unwrap();

    let package = tar_xz("widget", NEW_BINARY);
    let signature: Signature = key.sign(b"some other package");
    let main = asset("widget_linux_amd64.tar.xz", 20);
    let sig = asset("widget_linux_amd64.tar.xz.sig", 21);

    let provider = StaticProvider::new()
        .with_release(&repo, summary("v2.0.0", vec![main.clone(), sig.clone()]))
        .with_asset(main.download_url, package)
        .with_asset(sig.download_url, signature.to_der().as_bytes().to_vec());

    let updater = Updater::with_provider(
        Box::new(provider),
        Platform::new("linux", "amd64"),
        Logger::default(),
    )
    .with_validator(Box::new(EcdsaValidator::new(VerifyingKey::from(&key))));

    let dir = tempfile::tempdir().unwrap();
    let path = install_old(dir.path());

    let err = updater
        .update_command(&path, &Version::new(1, 0, 0), SLUG)
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Validate));
    assert_eq!(fs::read(&path).unwrap(), b"old widget build");
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn filters_pick_between_platform_assets() {
    let repo = RepoSlug::parse(SLUG).unwrap();
    let musl = asset("widget-musl_linux_amd64.tar.xz", 30);
    let gnu = asset("widget_linux_amd64.tar.xz", 31);

    let provider = StaticProvider::new()
        .with_release(&repo, summary("v1.4.0", vec![gnu.clone(), musl.clone()]))
        .with_asset(musl.download_url, tar_xz("bin/widget", NEW_BINARY))
        .with_asset(gnu.download_url, tar_xz("bin/widget", b"gnu build"));

    let updater = Updater::with_provider(
        Box::new(provider),
        Platform::new("linux", "amd64"),
        Logger::default(),
    )
    .with_filters(FilterSet::compile(["musl"]).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let path = install_old(dir.path());

    let release = updater
        .update_command(&path, &Version::new(1, 3, 9), SLUG)
        .unwrap();
    assert_eq!(release.asset_id, 30);
    assert_eq!(fs::read(&path).unwrap(), NEW_BINARY);
}

// ============================================================================
// Over HTTP
// ============================================================================

/// Serves fixed bodies by request path until `requests` have been answered
fn serve(
    listener: TcpListener,
    routes: HashMap<String, Vec<u8>>,
    requests: usize,
) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }

            let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
            let (status, body) = match routes.get(&path) {
                Some(body) => ("200 OK", body.clone()),
                None => ("404 Not Found", b"{\"message\":\"Not Found\"}".to_vec()),
            };
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .unwrap();
            stream.write_all(&body).unwrap();
            seen.push(path);
        }
        seen
    })
}

#[test]
fn github_provider_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());
    let asset_path = "/acme/widget/releases/download/v1.2.0/widget_linux_amd64.zip";

    let releases = format!(
        r#"[
            {{
                "tag_name": "v1.2.0",
                "name": "widget 1.2.0",
                "body": "Faster",
                "draft": false,
                "prerelease": false,
                "published_at": "2024-05-01T00:00:00Z",
                "html_url": "https://github.com/acme/widget/releases/tag/v1.2.0",
                "assets": [
                    {{
                        "id": 7,
                        "name": "widget_linux_amd64.zip",
                        "size": 512,
                        "browser_download_url": "{base}{asset}"
                    }}
                ]
            }},
            {{
                "tag_name": "v1.3.0-beta.1",
                "prerelease": true,
                "published_at": "2024-06-01T00:00:00Z",
                "assets": []
            }}
        ]"#,
        base = base.trim_end_matches('/'),
        asset = asset_path,
    );

    let mut routes = HashMap::new();
    routes.insert(
        "/repos/acme/widget/releases?per_page=100".to_string(),
        releases.into_bytes(),
    );
    routes.insert(asset_path.to_string(), zip("widget", NEW_BINARY));
    let server = serve(listener, routes, 2);

    let provider = GithubProvider::with_api_base(&base, None).unwrap();
    let updater = Updater::with_provider(
        Box::new(provider),
        Platform::new("linux", "amd64"),
        Logger::default(),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = install_old(dir.path());

    let release = updater
        .update_command(&path, &Version::new(1, 1, 0), SLUG)
        .unwrap();
    let seen = server.join().unwrap();

    assert_eq!(release.version, Version::new(1, 2, 0));
    assert_eq!(release.asset_byte_size, 512);
    assert_eq!(release.release_notes, "Faster");
    assert_eq!(fs::read(&path).unwrap(), NEW_BINARY);
    assert_eq!(seen.len(), 2);
    assert!(seen[1].ends_with("widget_linux_amd64.zip"));
}

#[test]
fn missing_repository_over_http_is_not_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());
    let server = serve(listener, HashMap::new(), 1);

    let provider = GithubProvider::with_api_base(&base, None).unwrap();
    let updater = Updater::with_provider(
        Box::new(provider),
        Platform::new("linux", "amd64"),
        Logger::default(),
    );

    let found = updater.detect_latest("acme/nothing-here").unwrap();
    server.join().unwrap();
    assert!(found.is_none());

    let err = updater.detect_latest("acme").unwrap_err();
    assert!(matches!(err, UpdateError::Slug(_)));
}
