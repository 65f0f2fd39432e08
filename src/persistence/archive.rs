//! Zip packing and unpacking for profile and storage-state archives.
//!
//! These helpers are synchronous; callers run them on the blocking pool.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::{AppError, Result};

/// Extract a zip archive's contents into `dest`, creating it if needed.
///
/// # Errors
///
/// Returns `AppError::Io` when the archive is malformed or the destination
/// cannot be written.
pub fn unzip_into(bytes: &[u8], dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| AppError::Io(format!("invalid archive: {err}")))?;
    archive
        .extract(dest)
        .map_err(|err| AppError::Io(format!("failed to extract archive: {err}")))?;
    Ok(())
}

/// Pack a directory tree into an in-memory zip archive.
///
/// Entry names are relative to `dir`, using forward slashes.
///
/// # Errors
///
/// Returns `AppError::Io` when the directory cannot be read or the archive
/// cannot be assembled.
pub fn zip_dir(dir: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    add_dir_entries(&mut writer, dir, Path::new(""), options)?;
    let cursor = writer
        .finish()
        .map_err(|err| AppError::Io(format!("failed to finish archive: {err}")))?;
    Ok(cursor.into_inner())
}

fn add_dir_entries(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    root: &Path,
    prefix: &Path,
    options: SimpleFileOptions,
) -> Result<()> {
    let dir = root.join(prefix);
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let rel = prefix.join(entry.file_name());
        let name = rel.to_string_lossy().replace('\\', "/");
        if entry.file_type()?.is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|err| AppError::Io(format!("failed to add directory: {err}")))?;
            add_dir_entries(writer, root, &rel, options)?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|err| AppError::Io(format!("failed to start entry: {err}")))?;
            let mut file = File::open(entry.path())?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
    }
    Ok(())
}
