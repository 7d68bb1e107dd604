//! Backup and restore of the flat configuration files as a zip archive.
//!
//! Entries are always flat basenames. On restore, untrusted entry names are
//! reduced to their basename and matched against a fixed whitelist; anything
//! else is skipped and logged, never written.

use std::{
    fs,
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, warn};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    config::{
        API_KEY_FILE, API_PORT_FILE, BOT_CONFIG_FILE, DOMAIN_FILE, SERVICE_CONFIG_FILE,
        USERS_FILE,
    },
    domain::UserId,
    errors::Error,
    Result,
};

/// The only names a restore may write.
pub const RESTORE_WHITELIST: [&str; 6] = [
    SERVICE_CONFIG_FILE,
    USERS_FILE,
    DOMAIN_FILE,
    BOT_CONFIG_FILE,
    API_KEY_FILE,
    API_PORT_FILE,
];

pub fn is_whitelisted(name: &str) -> bool {
    RESTORE_WHITELIST.contains(&name)
}

/// Final path component of an archive entry name, `/` or `\` separated.
pub fn entry_basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[derive(Clone, Copy, Debug)]
pub struct ExtractLimits {
    /// Maximum number of entries inspected.
    pub max_entries: usize,
    /// Maximum total bytes written across all files.
    pub max_total_bytes: u64,
    /// Maximum bytes per file.
    pub max_file_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entries: 64,
            max_total_bytes: 64 * 1024 * 1024, // 64MB
            max_file_bytes: 32 * 1024 * 1024,  // 32MB per file
        }
    }
}

// ============== Backup ==============

#[derive(Clone, Debug)]
pub struct BackupArchive {
    pub bytes: Vec<u8>,
    /// Entry names in archive order.
    pub included: Vec<String>,
    /// Sources left out because they were missing or unreadable.
    pub skipped: Vec<PathBuf>,
}

/// Zip the given files in memory under their basenames.
///
/// Missing or unreadable sources are skipped with a warning. A failure to
/// finalize the archive is an error and nothing partial is returned.
pub fn build_backup(sources: &[PathBuf]) -> Result<BackupArchive> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut included: Vec<String> = Vec::new();
    let mut skipped = Vec::new();

    for path in sources {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "backup source has no usable file name");
            skipped.push(path.clone());
            continue;
        };
        if included.iter().any(|n| n == name) {
            warn!(path = %path.display(), "duplicate backup entry name, skipping");
            skipped.push(path.clone());
            continue;
        }

        let data = match fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "backup source not found");
                skipped.push(path.clone());
                continue;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read backup source");
                skipped.push(path.clone());
                continue;
            }
        };

        zw.start_file(name, options).map_err(zip_err)?;
        zw.write_all(&data)?;
        included.push(name.to_string());
    }

    let bytes = zw.finish().map_err(zip_err)?.into_inner();
    info!(entries = included.len(), bytes = bytes.len(), "backup archive built");

    Ok(BackupArchive {
        bytes,
        included,
        skipped,
    })
}

/// Backup written to disk for upload; the file is removed on drop.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    pub fn write(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(entry_basename(file_name));
        fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "failed to remove temp backup");
        }
    }
}

// ============== Restore ==============

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    /// Entry names that were not on the whitelist (or not regular files).
    pub skipped: Vec<String>,
    /// Whitelisted entries that could not be written, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Applies uploaded backups to the configuration directory.
#[derive(Clone, Debug)]
pub struct Restorer {
    pub dest_dir: PathBuf,
    pub admin: UserId,
    pub limits: ExtractLimits,
}

impl Restorer {
    pub fn new(dest_dir: impl Into<PathBuf>, admin: UserId) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            admin,
            limits: ExtractLimits::default(),
        }
    }

    /// Restore whitelisted entries from `bytes`.
    ///
    /// Only the admin may restore, and the check happens before the archive is
    /// even parsed. Per-file failures are logged and recorded; the rest of the
    /// archive is still processed.
    pub fn apply(&self, caller: UserId, bytes: &[u8]) -> Result<RestoreReport> {
        if caller != self.admin {
            warn!(user_id = %caller, "restore attempted by non-admin");
            return Err(Error::AccessDenied(
                "only the administrator may restore".to_string(),
            ));
        }

        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::Archive(format!("not a valid zip archive: {e}")))?;

        fs::create_dir_all(&self.dest_dir)?;

        let mut report = RestoreReport::default();
        let mut total = 0u64;

        for i in 0..zip.len() {
            if i >= self.limits.max_entries {
                warn!(max = self.limits.max_entries, "archive has too many entries, ignoring rest");
                break;
            }

            let mut entry = match zip.by_index(i) {
                Ok(e) => e,
                Err(e) => {
                    error!(index = i, error = %e, "failed to open archive entry");
                    report.failed.push((format!("#{i}"), e.to_string()));
                    continue;
                }
            };

            let raw_name = entry.name().to_string();
            let name = entry_basename(&raw_name).to_string();

            if !is_whitelisted(&name) {
                warn!(entry = %raw_name, "archive entry not allowed, skipping");
                report.skipped.push(raw_name);
                continue;
            }
            if entry.is_dir() || is_symlink(entry.unix_mode()) {
                warn!(entry = %raw_name, "archive entry is not a regular file, skipping");
                report.skipped.push(raw_name);
                continue;
            }

            let size = entry.size();
            if size > self.limits.max_file_bytes
                || total.saturating_add(size) > self.limits.max_total_bytes
            {
                error!(entry = %raw_name, size, "archive entry exceeds size limits");
                report
                    .failed
                    .push((name, format!("too large ({size} bytes)")));
                continue;
            }

            // Read fully before touching the destination, and enforce the bound
            // even if the zip metadata lies.
            let mut data = Vec::new();
            let mut limited = (&mut entry).take(self.limits.max_file_bytes + 1);
            if let Err(e) = limited.read_to_end(&mut data) {
                error!(entry = %raw_name, error = %e, "failed to read archive entry");
                report.failed.push((name, e.to_string()));
                continue;
            }
            if data.len() as u64 > self.limits.max_file_bytes {
                error!(entry = %raw_name, "archive entry exceeds max_file_bytes while reading");
                report
                    .failed
                    .push((name, "too large while reading".to_string()));
                continue;
            }

            let dst = self.dest_dir.join(&name);
            match write_file(&dst, &data) {
                Ok(()) => {
                    total += data.len() as u64;
                    info!(path = %dst.display(), "restored file");
                    report.restored.push(name);
                }
                Err(e) => {
                    error!(path = %dst.display(), error = %e, "failed to write restored file");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(data)?;
    f.sync_all()
}

fn is_symlink(mode: Option<u32>) -> bool {
    mode.map(|m| m & 0o170000 == 0o120000).unwrap_or(false)
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::Archive(format!("zip error: {e}"))
}
