//! Business logic for invoice generation
//!
//! - `renderer`: the invoice rendering capability and its implementations
//! - `batch_executor`: run start, batch advance and progress reads
//! - `packager`: ZIP packaging of generated PDFs
//! - `file_manager`: output directory stats, bulk delete, downloads
//! - `cleanup`: stale job eviction

pub mod batch_executor;
pub mod cleanup;
pub mod file_manager;
pub mod packager;
pub mod renderer;

pub use batch_executor::{AdvanceOutcome, BatchExecutor, StartError, StartOutcome};
pub use file_manager::{DeleteReport, FileError, FileStats};
pub use packager::{ArchiveInfo, PackagingError};
pub use renderer::{build_renderer, BuiltinPdfRenderer, CommandRenderer, InvoiceRenderer, RenderError};
