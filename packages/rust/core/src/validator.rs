//! File acceptance rules applied before anything is uploaded.

use std::fmt;

/// Extensions the parse service can extract text from.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".doc", ".docx"];

/// Why a selected file was not accepted into the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRejection {
    UnsupportedType { extension: String },
    TooLarge { size: u64, limit: u64 },
    Empty,
}

impl fmt::Display for FileRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType { extension } => write!(
                f,
                "unsupported file type \"{extension}\". Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ),
            Self::TooLarge { size, limit } => write!(
                f,
                "file too large ({}). Max: {}",
                format_file_size(*size),
                format_file_size(*limit)
            ),
            Self::Empty => write!(f, "file is empty"),
        }
    }
}

/// Lower-cased extension including the dot, or `""` when there is none.
pub fn file_extension(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Check a single file against the type and size rules.
pub fn validate_file(name: &str, size: u64, max_file_bytes: u64) -> Result<(), FileRejection> {
    let extension = file_extension(name);
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(FileRejection::UnsupportedType { extension });
    }
    if size == 0 {
        return Err(FileRejection::Empty);
    }
    if size > max_file_bytes {
        return Err(FileRejection::TooLarge {
            size,
            limit: max_file_bytes,
        });
    }
    Ok(())
}

/// Content type to store a file under.
///
/// Trusts the declared type unless it is missing or generic, then falls
/// back to the extension.
pub fn resolve_mime_type(name: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared.map(str::trim) {
        if !declared.is_empty() && declared != "application/octet-stream" {
            return declared.to_string();
        }
    }
    match file_extension(name).as_str() {
        ".pdf" => "application/pdf",
        ".txt" => "text/plain",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".doc" => "application/msword",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `30.0 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
