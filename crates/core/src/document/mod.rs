//! Document inspection for PDF assets.
//!
//! [`PopplerInspector`] shells out to poppler's `pdfinfo` and `pdftotext`,
//! the same way the encoder module drives ffprobe.

mod poppler;

pub use poppler::PopplerInspector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from document inspection.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    #[error("Document not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Document inspection failed: {reason}")]
    Failed { reason: String },

    #[error("Document inspection timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page count and text access for paged documents.
#[async_trait]
pub trait DocumentInspector: Send + Sync {
    async fn page_count(&self, path: &Path) -> Result<u32, DocumentError>;

    /// Plain text of the first page.
    async fn first_page_text(&self, path: &Path) -> Result<String, DocumentError>;
}

/// Configuration for the poppler-based inspector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_pdfinfo_path")]
    pub pdfinfo_path: PathBuf,
    #[serde(default = "default_pdftotext_path")]
    pub pdftotext_path: PathBuf,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_pdfinfo_path() -> PathBuf {
    PathBuf::from("pdfinfo")
}

fn default_pdftotext_path() -> PathBuf {
    PathBuf::from("pdftotext")
}

fn default_timeout() -> u64 {
    30
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            pdfinfo_path: default_pdfinfo_path(),
            pdftotext_path: default_pdftotext_path(),
            timeout_secs: default_timeout(),
        }
    }
}
