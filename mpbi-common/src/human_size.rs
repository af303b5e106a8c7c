//! Human-readable byte size formatting
//!
//! Used by the file management card to display the total size of generated
//! invoices ("12.34 MB").

/// Binary unit ladder (1 KB = 1024 B)
const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
const STEP: f64 = 1024.0;

/// Format a byte count with two decimals in the largest fitting unit.
///
/// Counts below 1 KB are printed as whole bytes.
///
/// # Examples
///
/// ```
/// use mpbi_common::human_size::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    if (bytes as f64) < STEP {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for candidate in UNITS {
        value /= STEP;
        unit = candidate;
        if value < STEP {
            break;
        }
    }

    format!("{:.2} {}", value, unit)
}
