//! Archive extraction.
//!
//! This module handles:
//! - Detecting the archive format from the file name
//! - Extracting zip archives in-process
//! - Extracting tar and 7z archives with the system tools
//! - Skipping extraction when the destination is already populated

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors raised while expanding an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive format is not recognized.
    #[error("unsupported archive format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The archive file does not exist.
    #[error("archive not found: {}", .path.display())]
    ArchiveMissing { path: PathBuf },

    /// Extraction failed part-way.
    #[error("failed to extract {}: {reason}", .path.display())]
    Failed { path: PathBuf, reason: String },

    /// The archive was expanded but the expected marker file is absent.
    #[error("extracted {} but {marker} is missing from {}", .archive.display(), .destination.display())]
    MarkerMissing {
        archive: PathBuf,
        destination: PathBuf,
        marker: String,
    },

    /// A required external tool is not installed.
    #[error("{tool} command not found; please install {tool}")]
    ToolMissing { tool: &'static str },

    /// Filesystem error while preparing or cleaning the destination.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Archive formats understood by [`SystemExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    /// Any tarball; `tar` detects the compression itself.
    Tar,
    SevenZip,
}

impl ArchiveFormat {
    /// Detect the format from the archive's file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".7z") {
            Some(Self::SevenZip)
        } else if [".tar", ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tar.zst"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Expands one archive into a directory.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ExtractError>;
}

/// Extractor using the `zip` crate for zip files and the system `tar`/`7z`
/// commands for everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExtractor;

impl SystemExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_zip(&self, archive: &Path, destination: &Path) -> Result<(), ExtractError> {
        let failed = |reason: String| ExtractError::Failed {
            path: archive.to_path_buf(),
            reason,
        };

        let file = File::open(archive).map_err(|source| ExtractError::Io {
            path: archive.to_path_buf(),
            source,
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| failed(e.to_string()))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(failed(format!("unsafe entry path: {}", entry.name())));
            };
            let out_path = destination.join(relative);

            if entry.is_dir() {
                create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                create_dir_all(parent)?;
            }

            let mut out = File::create(&out_path).map_err(|source| ExtractError::Io {
                path: out_path.clone(),
                source,
            })?;
            io::copy(&mut entry, &mut out).map_err(|source| ExtractError::Io {
                path: out_path.clone(),
                source,
            })?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode)).map_err(
                    |source| ExtractError::Io {
                        path: out_path.clone(),
                        source,
                    },
                )?;
            }
        }

        Ok(())
    }

    fn extract_with_tool(
        &self,
        tool: &'static str,
        args: &[&std::ffi::OsStr],
        archive: &Path,
    ) -> Result<(), ExtractError> {
        let output = Command::new(tool).args(args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ExtractError::ToolMissing { tool }
            } else {
                ExtractError::Failed {
                    path: archive.to_path_buf(),
                    reason: format!("failed to run {}: {}", tool, e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Failed {
                path: archive.to_path_buf(),
                reason: format!("{} extraction failed: {}", tool, stderr.trim()),
            });
        }

        Ok(())
    }
}

impl ArchiveExtractor for SystemExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ExtractError> {
        let format =
            ArchiveFormat::from_path(archive).ok_or_else(|| ExtractError::UnsupportedFormat {
                path: archive.to_path_buf(),
            })?;

        match format {
            ArchiveFormat::Zip => self.extract_zip(archive, destination),
            ArchiveFormat::Tar => self.extract_with_tool(
                "tar",
                &[
                    "-xf".as_ref(),
                    archive.as_os_str(),
                    "-C".as_ref(),
                    destination.as_os_str(),
                ],
                archive,
            ),
            ArchiveFormat::SevenZip => {
                let mut out_flag = std::ffi::OsString::from("-o");
                out_flag.push(destination.as_os_str());
                self.extract_with_tool(
                    "7z",
                    &["x".as_ref(), "-y".as_ref(), out_flag.as_os_str(), archive.as_os_str()],
                    archive,
                )
            }
        }
    }
}

/// Idempotent archive expansion into a cache directory.
#[derive(Debug, Default, Clone)]
pub struct ArchiveExpander<E: ArchiveExtractor = SystemExtractor> {
    extractor: E,
}

impl ArchiveExpander<SystemExtractor> {
    pub fn system() -> Self {
        Self {
            extractor: SystemExtractor::new(),
        }
    }
}

impl<E: ArchiveExtractor> ArchiveExpander<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Whether `destination` already holds an expanded archive.
    ///
    /// With a marker, the marker file must exist. Without one, any non-empty
    /// directory counts.
    pub fn is_expanded(destination: &Path, marker: Option<&str>) -> bool {
        match marker {
            Some(marker) => destination.join(marker).exists(),
            None => fs::read_dir(destination)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
        }
    }

    /// Expand `archive` into `destination` unless it is already populated.
    ///
    /// A failed extraction removes the destination so a later call does not
    /// mistake a half-written directory for a finished one.
    pub fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        marker: Option<&str>,
    ) -> Result<PathBuf, ExtractError> {
        if Self::is_expanded(destination, marker) {
            tracing::debug!(
                destination = %destination.display(),
                "Extraction destination already populated; skipping"
            );
            return Ok(destination.to_path_buf());
        }

        if !archive.is_file() {
            return Err(ExtractError::ArchiveMissing {
                path: archive.to_path_buf(),
            });
        }

        create_dir_all(destination)?;
        tracing::debug!(
            archive = %archive.display(),
            destination = %destination.display(),
            "Extracting archive"
        );

        let result = self.extractor.extract(archive, destination).and_then(|()| {
            match marker {
                Some(marker) if !destination.join(marker).exists() => {
                    Err(ExtractError::MarkerMissing {
                        archive: archive.to_path_buf(),
                        destination: destination.to_path_buf(),
                        marker: marker.to_string(),
                    })
                }
                _ => Ok(()),
            }
        });

        if let Err(e) = result {
            tracing::warn!(archive = %archive.display(), error = %e, "Extraction failed; cleaning up");
            if let Err(cleanup) = fs::remove_dir_all(destination) {
                tracing::warn!(destination = %destination.display(), error = %cleanup, "Failed to remove partial extraction");
            }
            return Err(e);
        }

        Ok(destination.to_path_buf())
    }
}

fn create_dir_all(path: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Check that an external extraction tool is available.
pub fn check_tool(tool: &'static str) -> Result<(), ExtractError> {
    Command::new(tool)
        .arg("--help")
        .output()
        .map(|_| ())
        .map_err(|_| ExtractError::ToolMissing { tool })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Extractor that counts calls and writes a fixed file.
    struct CountingExtractor {
        calls: Cell<usize>,
        writes: &'static str,
    }

    impl ArchiveExtractor for CountingExtractor {
        fn extract(&self, _archive: &Path, destination: &Path) -> Result<(), ExtractError> {
            self.calls.set(self.calls.get() + 1);
            fs::write(destination.join(self.writes), b"x").unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a/MO2.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("skse.7z")), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_path(Path::new("jre.tar.gz")), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_path(Path::new("winetricks")), None);
    }

    #[test]
    fn test_zip_extraction() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mo2.zip");
        write_zip(
            &archive,
            &[("ModOrganizer.exe", b"exe"), ("plugins/check.dll", b"dll")],
        );
        let dest = temp.path().join("out");

        let expander = ArchiveExpander::system();
        let path = expander.extract(&archive, &dest, Some("ModOrganizer.exe")).unwrap();

        assert_eq!(path, dest);
        assert_eq!(fs::read(dest.join("ModOrganizer.exe")).unwrap(), b"exe");
        assert_eq!(fs::read(dest.join("plugins/check.dll")).unwrap(), b"dll");
    }

    #[test]
    fn test_marker_present_skips_extraction() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mo2.zip");
        fs::write(&archive, b"not really a zip").unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("ModOrganizer.exe"), b"exe").unwrap();

        let extractor = CountingExtractor {
            calls: Cell::new(0),
            writes: "unused",
        };
        let expander = ArchiveExpander::new(extractor);
        expander.extract(&archive, &dest, Some("ModOrganizer.exe")).unwrap();

        assert_eq!(expander.extractor.calls.get(), 0);
    }

    #[test]
    fn test_second_extract_is_noop() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, b"stub").unwrap();
        let dest = temp.path().join("out");

        let expander = ArchiveExpander::new(CountingExtractor {
            calls: Cell::new(0),
            writes: "payload.bin",
        });
        expander.extract(&archive, &dest, None).unwrap();
        expander.extract(&archive, &dest, None).unwrap();

        assert_eq!(expander.extractor.calls.get(), 1);
    }

    #[test]
    fn test_missing_marker_cleans_destination() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, b"stub").unwrap();
        let dest = temp.path().join("out");

        let expander = ArchiveExpander::new(CountingExtractor {
            calls: Cell::new(0),
            writes: "other.exe",
        });
        let err = expander
            .extract(&archive, &dest, Some("ModOrganizer.exe"))
            .unwrap_err();

        assert!(matches!(err, ExtractError::MarkerMissing { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_corrupt_zip_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        let dest = temp.path().join("out");

        let err = ArchiveExpander::system().extract(&archive, &dest, None).unwrap_err();
        assert!(matches!(err, ExtractError::Failed { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_archive() {
        let temp = TempDir::new().unwrap();
        let err = ArchiveExpander::system()
            .extract(&temp.path().join("nope.zip"), &temp.path().join("out"), None)
            .unwrap_err();
        assert!(matches!(err, ExtractError::ArchiveMissing { .. }));
    }

    #[test]
    fn test_unsupported_format() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("file.rar");
        fs::write(&archive, b"rar").unwrap();

        let err = ArchiveExpander::system()
            .extract(&archive, &temp.path().join("out"), None)
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }
}
