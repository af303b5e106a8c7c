//! Invoice rendering capability
//!
//! The batch executor only knows [`InvoiceRenderer`]. Two implementations
//! ship:
//! - [`CommandRenderer`] delegates to an external program
//! - [`BuiltinPdfRenderer`] writes a one-page text PDF
//!
//! A renderer returns `Ok(Some(path))` when it produced a file, `Ok(None)`
//! when it produced nothing, and `Err` when rendering failed.

use async_trait::async_trait;
use mpbi_common::config::{RendererConfig, RendererKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::models::Transaction;

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),

    #[error("Renderer timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    fn name(&self) -> &str;

    /// Prerequisite check run before every batch
    async fn is_available(&self) -> bool;

    /// Render the invoice for `txn` into `output_dir`
    async fn render(
        &self,
        txn: &Transaction,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError>;
}

/// Build the renderer selected by configuration
pub fn build_renderer(config: &RendererConfig) -> Arc<dyn InvoiceRenderer> {
    match (config.kind, &config.command) {
        (RendererKind::Command, Some(command)) => Arc::new(CommandRenderer::new(
            command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )),
        _ => Arc::new(BuiltinPdfRenderer),
    }
}

/// `invoice-{trans_num}.pdf`, falling back to the numeric id when the
/// transaction number is empty. Only `[A-Za-z0-9_-]` survive.
pub fn invoice_file_name(txn: &Transaction) -> String {
    let cleaned: String = txn
        .trans_num
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        format!("invoice-{}.pdf", txn.id)
    } else {
        format!("invoice-{}.pdf", cleaned)
    }
}

// ========================================
// External command
// ========================================

/// Delegates rendering to an external program
///
/// The transaction is written to the program's stdin as JSON. Arguments may
/// contain the placeholders `{output}` (target PDF path), `{txn_id}` and
/// `{trans_num}`. A zero exit status with the target file present is a
/// success; a zero exit without the file means nothing was produced.
pub struct CommandRenderer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(command: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            args,
            timeout,
        }
    }

    fn expand_args(&self, txn: &Transaction, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{txn_id}", &txn.id.to_string())
                    .replace("{trans_num}", &txn.trans_num)
            })
            .collect()
    }
}

#[async_trait]
impl InvoiceRenderer for CommandRenderer {
    fn name(&self) -> &str {
        "command"
    }

    async fn is_available(&self) -> bool {
        let available = if self.command.contains(std::path::MAIN_SEPARATOR) {
            Path::new(&self.command).is_file()
        } else {
            Command::new("which")
                .arg(&self.command)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false)
        };

        debug!(command = %self.command, available, "Renderer availability check");
        available
    }

    async fn render(
        &self,
        txn: &Transaction,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError> {
        let output_path = output_dir.join(invoice_file_name(txn));

        // Only a file written by this run counts as output
        match tokio::fs::remove_file(&output_path).await {
            Ok(()) => debug!(path = %output_path.display(), "Removed previous invoice"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let payload = serde_json::to_vec(txn)
            .map_err(|e| RenderError::Failed(format!("Failed to encode transaction: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(self.expand_args(txn, &output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Unavailable(format!("{}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A renderer that ignores stdin may close it early
            let _ = stdin.write_all(&payload).await;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(RenderError::Failed(if detail.is_empty() {
                format!("renderer exited with {}", output.status)
            } else {
                detail.to_string()
            }));
        }

        if tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            Ok(Some(output_path))
        } else {
            Ok(None)
        }
    }
}

// ========================================
// Built-in PDF
// ========================================

/// Writes a single-page PDF listing the transaction fields
pub struct BuiltinPdfRenderer;

#[async_trait]
impl InvoiceRenderer for BuiltinPdfRenderer {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn render(
        &self,
        txn: &Transaction,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError> {
        let path = output_dir.join(invoice_file_name(txn));
        let bytes = invoice_pdf(txn);

        let target = path.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&target, bytes))
            .await
            .map_err(|e| RenderError::Failed(format!("Render task failed: {}", e)))??;

        Ok(Some(path))
    }
}

fn invoice_lines(txn: &Transaction) -> Vec<String> {
    vec![
        format!("Receipt #{}", txn.trans_num),
        format!("Transaction ID: {}", txn.id),
        format!("Date: {}", txn.created_at),
        format!(
            "Customer: {}",
            txn.customer_email
                .clone()
                .unwrap_or_else(|| format!("user {}", txn.user_id))
        ),
        format!("Membership: {}", txn.product_id),
        format!("Amount: {:.2}", txn.amount),
        format!("Total: {:.2}", txn.total),
        format!("Status: {}", txn.status),
    ]
}

/// Escape text for a PDF literal string; non-ASCII becomes `?`
fn pdf_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Minimal PDF 1.4 document: A4 page, Helvetica, one title and a field list
pub fn invoice_pdf(txn: &Transaction) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 20 Tf\n72 770 Td\n(Invoice) Tj\n/F1 11 Tf\n0 -36 Td\n");
    for line in invoice_lines(txn) {
        content.push_str(&format!("({}) Tj\n0 -18 Td\n", pdf_escape(&line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    pdf.into_bytes()
}
