//! Output directory management: stats, bulk delete, download lookup

use mpbi_common::human_size::format_bytes;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("PDF directory not found.")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Regular files in `dir` with the given extension (case-insensitive),
/// sorted by name. Subdirectories are not descended into.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub pdf_count: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub archive_count: usize,
}

/// Count and size the generated PDFs. A missing directory reports zeros.
pub fn file_stats(output_dir: &Path) -> Result<FileStats, FileError> {
    if !output_dir.is_dir() {
        return Ok(FileStats {
            total_size_formatted: format_bytes(0),
            ..Default::default()
        });
    }

    let pdfs = list_files_with_extension(output_dir, "pdf")?;
    let mut total_size = 0u64;
    for pdf in &pdfs {
        total_size += std::fs::metadata(pdf)?.len();
    }
    let archive_count = list_files_with_extension(output_dir, "zip")?.len();

    Ok(FileStats {
        pdf_count: pdfs.len(),
        total_size,
        total_size_formatted: format_bytes(total_size),
        archive_count,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted_count: usize,
    pub errors: Vec<String>,
    pub message: String,
}

/// Delete every PDF, then every ZIP, in `output_dir`
///
/// Per-file failures are collected and never abort the sweep.
pub fn delete_all(output_dir: &Path) -> Result<DeleteReport, FileError> {
    if !output_dir.is_dir() {
        return Err(FileError::DirectoryNotFound(output_dir.to_path_buf()));
    }

    let mut report = DeleteReport::default();
    for extension in ["pdf", "zip"] {
        for path in list_files_with_extension(output_dir, extension)? {
            match std::fs::remove_file(&path) {
                Ok(()) => report.deleted_count += 1,
                Err(e) => {
                    let name = display_name(&path);
                    warn!(file = %name, "Failed to delete: {}", e);
                    report.errors.push(format!("Failed to delete: {}", name));
                }
            }
        }
    }

    report.message = if report.deleted_count == 0 && report.errors.is_empty() {
        "No files found to delete.".to_string()
    } else if report.errors.is_empty() {
        format!(
            "Successfully deleted {} files from the PDF folder.",
            report.deleted_count
        )
    } else {
        format!(
            "Successfully deleted {} files from the PDF folder. {} files could not be deleted.",
            report.deleted_count,
            report.errors.len()
        )
    };

    info!(
        deleted = report.deleted_count,
        failed = report.errors.len(),
        "Output folder emptied"
    );
    Ok(report)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolve a download request to an archive inside `output_dir`
///
/// Only plain `*.zip` base names are accepted.
pub fn resolve_archive(output_dir: &Path, filename: &str) -> Result<PathBuf, FileError> {
    let plain = !filename.is_empty()
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
        && !filename.starts_with('.');
    let is_zip = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !plain || !is_zip {
        return Err(FileError::InvalidName(filename.to_string()));
    }

    let path = output_dir.join(filename);
    if !path.is_file() {
        return Err(FileError::NotFound(filename.to_string()));
    }
    Ok(path)
}
