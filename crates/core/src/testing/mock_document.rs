//! Mock document inspector for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::document::{DocumentError, DocumentInspector};

#[derive(Debug)]
struct State {
    pages: u32,
    text: Option<String>,
}

/// Mock implementation of [`DocumentInspector`].
///
/// Reports a fixed page count. With no text configured, text extraction
/// fails the way a missing `pdftotext` would.
#[derive(Debug, Clone)]
pub struct MockDocumentInspector {
    state: Arc<Mutex<State>>,
}

impl MockDocumentInspector {
    pub fn new(pages: u32, text: Option<&str>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                pages,
                text: text.map(str::to_string),
            })),
        }
    }

    pub fn set_text(&self, text: Option<&str>) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).text = text.map(str::to_string);
    }
}

#[async_trait]
impl DocumentInspector for MockDocumentInspector {
    async fn page_count(&self, path: &Path) -> Result<u32, DocumentError> {
        if !path.exists() {
            return Err(DocumentError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).pages)
    }

    async fn first_page_text(&self, _path: &Path) -> Result<String, DocumentError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .text
            .clone()
            .ok_or_else(|| DocumentError::Failed {
                reason: "pdftotext produced no output".to_string(),
            })
    }
}
