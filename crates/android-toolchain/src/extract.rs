//! Archive Extraction
//!
//! Unpacks downloaded archives in-process with the `zip`, `tar` and
//! `flate2` crates. When that fails the platform's own utility is tried:
//! PowerShell `Expand-Archive` then 7-Zip on Windows, `unzip` elsewhere,
//! and `tar` for gzip tarballs.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::download::DownloadError;
use crate::runner::CommandRunner;

/// Timeout for the native unzip fallbacks
const UNZIP_TIMEOUT_SECS: u64 = 120;

/// Timeout for the native tar fallback
const TAR_TIMEOUT_SECS: u64 = 300;

/// How a downloaded file is unpacked, chosen from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Jar,
    Pkg,
    Msi,
    Other,
}

impl ArchiveKind {
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".zip") {
            ArchiveKind::Zip
        } else if lower.ends_with(".jar") {
            ArchiveKind::Jar
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if lower.ends_with(".pkg") {
            ArchiveKind::Pkg
        } else if lower.ends_with(".msi") {
            ArchiveKind::Msi
        } else {
            ArchiveKind::Other
        }
    }

    /// Whether the file is handed to a system installer
    pub fn is_installer(&self) -> bool {
        matches!(self, ArchiveKind::Pkg | ArchiveKind::Msi)
    }
}

/// Extracts archives into a directory
pub struct Extractor {
    runner: CommandRunner,
}

impl Extractor {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Extract a ZIP file, falling back to the native utility
    pub async fn extract_zip(&self, archive: &Path, target_dir: &Path) -> Result<(), DownloadError> {
        info!("Extracting {:?} to {:?}", archive, target_dir);
        match unzip_in_process(archive.to_path_buf(), target_dir.to_path_buf()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("In-process unzip failed ({}), trying native utility", e);
                self.unzip_native(archive, target_dir).await
            }
        }
    }

    /// Extract a tar.gz file, falling back to `tar -xzf`
    pub async fn extract_tar_gz(&self, archive: &Path, target_dir: &Path) -> Result<(), DownloadError> {
        info!("Extracting {:?} to {:?}", archive, target_dir);
        match untar_in_process(archive.to_path_buf(), target_dir.to_path_buf()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("In-process untar failed ({}), trying tar", e);
                let args = [
                    "-xzf".to_string(),
                    archive.display().to_string(),
                    "-C".to_string(),
                    target_dir.display().to_string(),
                ];
                let result = self.runner.run("tar", args, TAR_TIMEOUT_SECS).await;
                if result.success() {
                    Ok(())
                } else {
                    Err(DownloadError::Extraction(result.failure_detail()))
                }
            }
        }
    }

    /// Copy a file into `target_dir`, replacing an existing copy
    pub async fn copy_into(&self, file: &Path, target_dir: &Path) -> Result<PathBuf, DownloadError> {
        let name = file
            .file_name()
            .ok_or_else(|| DownloadError::Extraction(format!("{:?} has no file name", file)))?;
        let target = target_dir.join(name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tokio::fs::remove_file(&target).await?;
        }
        tokio::fs::copy(file, &target).await.map_err(|e| {
            DownloadError::Extraction(format!("could not copy {:?} to {:?}: {}", file, target, e))
        })?;
        debug!("Copied {:?} to {:?}", file, target);
        Ok(target)
    }

    async fn unzip_native(&self, archive: &Path, target_dir: &Path) -> Result<(), DownloadError> {
        if self.runner.platform().is_windows() {
            let script = format!(
                "Expand-Archive -Path '{}' -DestinationPath '{}' -Force",
                archive.display(),
                target_dir.display()
            );
            let result = self
                .runner
                .run("powershell", ["-NoProfile", "-Command", script.as_str()], UNZIP_TIMEOUT_SECS)
                .await;
            if result.success() {
                return Ok(());
            }

            let output = format!("-o{}", target_dir.display());
            let args = ["x".to_string(), archive.display().to_string(), output, "-y".to_string()];
            let mut detail = "7-Zip not found".to_string();
            for seven_zip in seven_zip_candidates() {
                if seven_zip.is_absolute() && !seven_zip.is_file() {
                    continue;
                }
                let result = self.runner.run(&seven_zip, args.iter(), UNZIP_TIMEOUT_SECS).await;
                if result.success() {
                    return Ok(());
                }
                debug!("{:?} could not extract: {}", seven_zip, result.failure_detail());
                detail = result.failure_detail();
            }
            return Err(DownloadError::Extraction(detail));
        }

        let args = ["-q".to_string(), "-o".to_string(), archive.display().to_string()];
        let result = self
            .runner
            .run_in("unzip", args, UNZIP_TIMEOUT_SECS, Some(target_dir))
            .await;
        if result.success() {
            Ok(())
        } else {
            Err(DownloadError::Extraction(result.failure_detail()))
        }
    }
}

/// 7-Zip on PATH, then its default install locations
fn seven_zip_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("7z"),
        PathBuf::from(r"C:\Program Files\7-Zip\7z.exe"),
        PathBuf::from(r"C:\Program Files (x86)\7-Zip\7z.exe"),
    ]
}

async fn unzip_in_process(archive: PathBuf, target_dir: PathBuf) -> Result<(), DownloadError> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| DownloadError::Extraction(e.to_string()))?;

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| DownloadError::Extraction(e.to_string()))?;

            let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
                warn!("Skipping unsafe zip entry {}", entry.name());
                continue;
            };
            let outpath = target_dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath)?;
            } else {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut outfile = std::fs::File::create(&outpath)?;
                std::io::copy(&mut entry, &mut outfile)?;
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
                }
            }
        }

        Ok(())
    })
    .await
    .map_err(|e| DownloadError::Extraction(e.to_string()))?
}

async fn untar_in_process(archive: PathBuf, target_dir: PathBuf) -> Result<(), DownloadError> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive)?;
        let gz = flate2::read::GzDecoder::new(file);
        let mut tar = tar::Archive::new(gz);
        tar.set_preserve_permissions(true);

        tar.unpack(&target_dir)
            .map_err(|e| DownloadError::Extraction(e.to_string()))?;

        Ok(())
    })
    .await
    .map_err(|e| DownloadError::Extraction(e.to_string()))?
}
