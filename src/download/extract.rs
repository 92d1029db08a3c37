use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::errors::AcquisitionError;

/// Prefix of the scratch directory an archive is unpacked into.
pub const STAGING_PREFIX: &str = ".staging-";

const COPY_BUFFER: usize = 64 * 1024;

struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

/// Unpack `archive` into `dest_dir` and return the extracted files in archive order.
///
/// Every entry is validated before anything is written: one entry resolving
/// outside `dest_dir` fails the whole archive. Files are written to a staging
/// directory first and moved into place only after every entry succeeded.
/// Blocking; run on the blocking pool.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f64),
) -> Result<Vec<PathBuf>, AcquisitionError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let (plan, total) = plan_entries(&mut archive)?;
    if !plan.iter().any(|entry| !entry.is_dir) {
        return Err(AcquisitionError::EmptyArchive);
    }

    let stem = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = dest_dir.join(format!("{}{}", STAGING_PREFIX, stem));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = unpack(&mut archive, &plan, total, &staging, cancel, &mut on_progress)
        .and_then(|staged| install(&staging, dest_dir, staged));

    if let Err(e) = fs::remove_dir_all(&staging) {
        warn!(dir = %staging.display(), error = %e, "failed to remove staging directory");
    }
    result
}

fn plan_entries(
    archive: &mut ZipArchive<File>,
) -> Result<(Vec<PlannedEntry>, u64), AcquisitionError> {
    let mut plan = Vec::with_capacity(archive.len());
    let mut total = 0u64;

    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .map(|path| path.to_path_buf())
            .filter(|path| is_contained(path))
            .ok_or_else(|| AcquisitionError::ExtractionSecurityViolation {
                entry: name.clone(),
            })?;

        total += entry.size();
        plan.push(PlannedEntry {
            index,
            relative,
            is_dir: entry.is_dir(),
        });
    }
    Ok((plan, total))
}

/// Relative path made only of plain names.
fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn unpack(
    archive: &mut ZipArchive<File>,
    plan: &[PlannedEntry],
    total: u64,
    staging: &Path,
    cancel: &CancellationToken,
    on_progress: &mut impl FnMut(f64),
) -> Result<Vec<PathBuf>, AcquisitionError> {
    let mut staged = Vec::new();
    let mut extracted = 0u64;
    let mut buffer = vec![0u8; COPY_BUFFER];

    for planned in plan {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        let target = staging.join(&planned.relative);
        if planned.is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entry = archive.by_index(planned.index)?;
        let mut out = File::create(&target)?;
        loop {
            if cancel.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }
            let n = entry.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])?;
            extracted += n as u64;
            if total > 0 {
                on_progress((extracted as f64 / total as f64).min(1.0));
            }
        }
        out.flush()?;
        debug!(entry = %planned.relative.display(), "extracted");
        staged.push(planned.relative.clone());
    }

    on_progress(1.0);
    Ok(staged)
}

fn install(
    staging: &Path,
    dest_dir: &Path,
    staged: Vec<PathBuf>,
) -> Result<Vec<PathBuf>, AcquisitionError> {
    let mut installed = Vec::with_capacity(staged.len());
    for relative in staged {
        let target = dest_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging.join(&relative), &target)?;
        installed.push(target);
    }
    Ok(installed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write_archive(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("snapshot.zip");
        fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }

    #[test]
    fn test_extracts_in_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("databases");
        fs::create_dir_all(&dest).unwrap();
        let archive = write_archive(
            dir.path(),
            &[("webcatalog105.db", b"text"), ("extra/readme.txt", b"hello")],
        );

        let mut progress = Vec::new();
        let files =
            extract_archive(&archive, &dest, &CancellationToken::new(), |p| progress.push(p)).unwrap();

        assert_eq!(
            files,
            vec![dest.join("webcatalog105.db"), dest.join("extra").join("readme.txt")]
        );
        assert_eq!(fs::read(&files[0]).unwrap(), b"text");
        assert_eq!(progress.last().copied(), Some(1.0));
        assert!(!dest.join(format!("{}snapshot.zip", STAGING_PREFIX)).exists());
    }

    #[test]
    fn test_traversal_entry_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("databases");
        fs::create_dir_all(&dest).unwrap();
        let archive = write_archive(
            dir.path(),
            &[("webcatalog105.db", b"text"), ("../evil.db", b"pwned")],
        );

        let err = extract_archive(&archive, &dest, &CancellationToken::new(), |_| {}).unwrap_err();
        assert!(
            matches!(&err, AcquisitionError::ExtractionSecurityViolation { entry } if entry == "../evil.db")
        );
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
        assert!(!dir.path().join("evil.db").exists());
    }

    #[test]
    fn test_contained_paths() {
        assert!(is_contained(Path::new("webcatalog105.db")));
        assert!(is_contained(Path::new("sub/dir/file.db")));
        assert!(!is_contained(Path::new("")));
        assert!(!is_contained(Path::new("sub/../../file.db")));
        assert!(!is_contained(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_cancel_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("databases");
        fs::create_dir_all(&dest).unwrap();
        let archive = write_archive(dir.path(), &[("webcatalog105.db", b"text")]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = extract_archive(&archive, &dest, &cancel, |_| {}).unwrap_err();
        assert!(matches!(err, AcquisitionError::Cancelled));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"definitely not a zip").unwrap();
        let err = extract_archive(&path, dir.path(), &CancellationToken::new(), |_| {}).unwrap_err();
        assert!(matches!(err, AcquisitionError::Zip(_)));
    }
}
