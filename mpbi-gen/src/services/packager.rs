//! ZIP packaging of generated invoices
//!
//! Every `*.pdf` regular file in the output directory is added, flat, to
//! `memberpress-invoices-YYYY-MM-DD-HH-MM-SS.zip` (UTC) in the same
//! directory. Source files are never modified.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::services::file_manager::list_files_with_extension;

pub const ARCHIVE_PREFIX: &str = "memberpress-invoices-";

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("PDF directory not found.")]
    DirectoryNotFound(PathBuf),

    #[error("No PDF files found to download.")]
    NoPdfFiles,

    #[error("Failed to create ZIP file: {0}")]
    ArchiveFailed(String),
}

impl From<io::Error> for PackagingError {
    fn from(e: io::Error) -> Self {
        PackagingError::ArchiveFailed(e.to_string())
    }
}

impl From<zip::result::ZipError> for PackagingError {
    fn from(e: zip::result::ZipError) -> Self {
        PackagingError::ArchiveFailed(e.to_string())
    }
}

/// A written archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    #[serde(skip)]
    pub path: PathBuf,
    pub filename: String,
    pub file_count: usize,
}

pub fn archive_name(now: DateTime<Utc>) -> String {
    format!("{}{}.zip", ARCHIVE_PREFIX, now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Package every PDF in `output_dir` (blocking)
///
/// An empty PDF set still produces a valid, empty archive.
pub fn create_archive(output_dir: &Path, now: DateTime<Utc>) -> Result<ArchiveInfo, PackagingError> {
    if !output_dir.is_dir() {
        return Err(PackagingError::DirectoryNotFound(output_dir.to_path_buf()));
    }

    let pdfs = list_files_with_extension(output_dir, "pdf")?;
    if pdfs.is_empty() {
        warn!(dir = %output_dir.display(), "No PDF files to package, writing empty archive");
    }

    package_files(output_dir, now, &pdfs)
}

/// Archive an explicit PDF list into `output_dir`
///
/// On failure the partial archive is removed.
fn package_files(
    output_dir: &Path,
    now: DateTime<Utc>,
    pdfs: &[PathBuf],
) -> Result<ArchiveInfo, PackagingError> {
    let filename = archive_name(now);
    let path = output_dir.join(&filename);

    let file_count = match write_archive(&path, pdfs) {
        Ok(count) => count,
        Err(e) => {
            // A half-written archive has no central directory
            if let Err(remove_err) = std::fs::remove_file(&path) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    warn!(archive = %filename, error = %remove_err, "Failed to remove partial archive");
                }
            }
            return Err(e);
        }
    };

    info!(archive = %filename, file_count, "Invoice archive created");

    Ok(ArchiveInfo {
        path,
        filename,
        file_count,
    })
}

/// Write `pdfs` flat into a new archive at `path`, returning the entry count
///
/// A PDF that disappeared after listing (concurrent delete) is skipped.
fn write_archive(path: &Path, pdfs: &[PathBuf]) -> Result<usize, PackagingError> {
    // File::create truncates an archive of the same name
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut added = 0;

    for pdf in pdfs {
        let Some(name) = pdf.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %pdf.display(), "Skipping PDF with non UTF-8 name");
            continue;
        };
        let mut source = match File::open(pdf) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %pdf.display(), "PDF vanished before packaging, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        zip.start_file(name, options)?;
        io::copy(&mut source, &mut zip)?;
        added += 1;
    }

    zip.finish()?.flush()?;
    Ok(added)
}

/// Package on the blocking pool
pub async fn package(output_dir: PathBuf) -> Result<ArchiveInfo, PackagingError> {
    tokio::task::spawn_blocking(move || create_archive(&output_dir, Utc::now()))
        .await
        .map_err(|e| PackagingError::ArchiveFailed(format!("Packaging task failed: {}", e)))?
}

/// Like [`package`] but refuses when there is nothing to package
pub async fn package_for_download(output_dir: PathBuf) -> Result<ArchiveInfo, PackagingError> {
    tokio::task::spawn_blocking(move || {
        if !output_dir.is_dir() {
            return Err(PackagingError::DirectoryNotFound(output_dir));
        }
        if list_files_with_extension(&output_dir, "pdf")?.is_empty() {
            return Err(PackagingError::NoPdfFiles);
        }
        create_archive(&output_dir, Utc::now())
    })
    .await
    .map_err(|e| PackagingError::ArchiveFailed(format!("Packaging task failed: {}", e)))?
}
