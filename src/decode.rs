//! Extracting the executable from a downloaded release asset
//!
//! The package format is picked from the asset URL's suffix:
//! `.zip`, `.tar.gz`, `.tar.xz`, single-file `.gz`/`.gzip`, single-file `.xz`,
//! or anything else which is taken to be the raw binary already.

use flate2::read::GzDecoder;
use std::cell::Cell;
use std::io::{self, Cursor, Read};
use std::rc::Rc;
use xz2::read::XzDecoder;
use zip::ZipArchive;

use crate::error::{DecodeError, Layer};
use crate::logging::Logger;
use crate::platform::Platform;

const PREALLOC_LIMIT: u64 = 8 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Zip,
    TarGz,
    TarXz,
    Gzip,
    Xz,
    Raw,
}

impl PackageFormat {
    pub fn from_url(url: &str) -> Self {
        if url.ends_with(".zip") {
            PackageFormat::Zip
        } else if url.ends_with(".tar.gz") {
            PackageFormat::TarGz
        } else if url.ends_with(".tar.xz") {
            PackageFormat::TarXz
        } else if url.ends_with(".gzip") || url.ends_with(".gz") {
            PackageFormat::Gzip
        } else if url.ends_with(".xz") {
            PackageFormat::Xz
        } else {
            PackageFormat::Raw
        }
    }
}

/// Archive decoder for one target platform
#[derive(Debug, Clone)]
pub struct Decoder {
    windows: bool,
    log: Logger,
}

impl Decoder {
    pub fn new(platform: &Platform, log: Logger) -> Self {
        Self {
            windows: platform.is_windows(),
            log,
        }
    }

    /// Extract the entry named `cmd` from `src`, which was downloaded from `url`
    ///
    /// Archive entries are compared by base name, so `dist/bin/cmd` matches
    /// `cmd`. On Windows `cmd` and `cmd.exe` are treated as the same name.
    pub fn decode<'a, R>(&self, src: R, url: &str, cmd: &str) -> Result<Box<dyn Read + 'a>, DecodeError>
    where
        R: Read + 'a,
    {
        match PackageFormat::from_url(url) {
            PackageFormat::Zip => {
                self.log.info(&format!("Uncompressing zip file {}", url));
                self.unzip(src, url, cmd)
            }
            PackageFormat::TarGz => {
                self.log.info(&format!("Uncompressing tar.gz file {}", url));
                self.untar(GzDecoder::new(src), Layer::Gzip, url, cmd)
            }
            PackageFormat::TarXz => {
                self.log.info(&format!("Uncompressing tar.xz file {}", url));
                self.untar(XzDecoder::new(src), Layer::Xz, url, cmd)
            }
            PackageFormat::Gzip => {
                self.log.info(&format!("Uncompressing gzip file {}", url));
                self.gunzip(src, url, cmd)
            }
            PackageFormat::Xz => {
                self.log.info(&format!("Uncompressing xz file {}", url));
                let mut buf = Vec::new();
                XzDecoder::new(src)
                    .read_to_end(&mut buf)
                    .map_err(|e| corrupt(Layer::Xz, url, e))?;
                Ok(Box::new(Cursor::new(buf)))
            }
            PackageFormat::Raw => {
                self.log.info(&format!("Uncompression is not needed for {}", url));
                Ok(Box::new(src))
            }
        }
    }

    fn is_command(&self, name: &str, cmd: &str) -> bool {
        if !self.windows {
            return name == cmd;
        }
        let stem = cmd.strip_suffix(".exe").unwrap_or(cmd);
        name == stem || name.strip_suffix(".exe") == Some(stem)
    }

    fn unzip<'a, R: Read>(&self, mut src: R, url: &str, cmd: &str) -> Result<Box<dyn Read + 'a>, DecodeError> {
        // The zip directory sits at the end of the file, so the whole archive
        // has to be in memory before anything can be opened.
        let mut buf = Vec::new();
        src.read_to_end(&mut buf)
            .map_err(|e| corrupt(Layer::Zip, url, e))?;

        let mut archive =
            ZipArchive::new(Cursor::new(buf)).map_err(|e| corrupt(Layer::Zip, url, io::Error::other(e)))?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| corrupt(Layer::Zip, url, io::Error::other(e)))?;
            if file.is_dir() || !self.is_command(base_name(file.name()), cmd) {
                continue;
            }
            let size = file.size();
            let out = read_entry(&mut file, size).map_err(|e| corrupt(Layer::Zip, url, e))?;
            return Ok(Box::new(Cursor::new(out)));
        }

        Err(DecodeError::EntryNotFound {
            name: cmd.to_string(),
            url: url.to_string(),
        })
    }

    /// Walk tar entries in stream order; only the matching entry is buffered
    fn untar<'a, D: Read>(
        &self,
        decompressed: D,
        layer: Layer,
        url: &str,
        cmd: &str,
    ) -> Result<Box<dyn Read + 'a>, DecodeError> {
        let tracked = TrackedReader::new(decompressed);
        let inner_failed = tracked.failed.clone();
        let fail = |e: io::Error| {
            let failed_layer = if inner_failed.get() { layer } else { Layer::Tar };
            corrupt(failed_layer, url, e)
        };

        let mut archive = tar::Archive::new(tracked);
        for entry in archive.entries().map_err(&fail)? {
            let mut entry = entry.map_err(&fail)?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let matched = {
                let path = entry.path().map_err(&fail)?;
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| self.is_command(n, cmd))
            };
            if !matched {
                continue;
            }
            let size = entry.size();
            let out = read_entry(&mut entry, size).map_err(&fail)?;
            return Ok(Box::new(Cursor::new(out)));
        }

        Err(DecodeError::EntryNotFound {
            name: cmd.to_string(),
            url: url.to_string(),
        })
    }

    fn gunzip<'a, R: Read>(&self, src: R, url: &str, cmd: &str) -> Result<Box<dyn Read + 'a>, DecodeError> {
        let mut gz = GzDecoder::new(src);
        let mut buf = Vec::new();
        gz.read_to_end(&mut buf)
            .map_err(|e| corrupt(Layer::Gzip, url, e))?;

        let Some(header) = gz.header() else {
            return Err(corrupt(
                Layer::Gzip,
                url,
                io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"),
            ));
        };
        let name = header
            .filename()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();
        if !self.is_command(&name, cmd) {
            return Err(DecodeError::NameMismatch {
                expected: cmd.to_string(),
                found: name,
                url: url.to_string(),
            });
        }

        Ok(Box::new(Cursor::new(buf)))
    }
}

fn corrupt(layer: Layer, url: &str, source: io::Error) -> DecodeError {
    DecodeError::Corrupt {
        layer,
        url: url.to_string(),
        source,
    }
}

/// Read an archive entry whose header claims `expected` bytes. The claim is
/// untrusted: it only sizes the initial buffer up to a bound, and a body of
/// any other length is corrupt.
fn read_entry<R: Read>(mut entry: R, expected: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(PREALLOC_LIMIT) as usize);
    entry.read_to_end(&mut out)?;
    if out.len() as u64 != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "entry holds {} bytes but its header claims {}",
                out.len(),
                expected
            ),
        ));
    }
    Ok(out)
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Remembers whether the wrapped (decompressing) reader ever failed, so a
/// tar error can be blamed on the right layer.
struct TrackedReader<R> {
    inner: R,
    failed: Rc<Cell<bool>>,
}

impl<R> TrackedReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            failed: Rc::new(Cell::new(false)),
        }
    }
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed.set(true))
    }
}
