use async_trait::async_trait;
use regex_lite::Regex;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::{DocumentConfig, DocumentError, DocumentInspector};

/// Inspector backed by poppler-utils.
pub struct PopplerInspector {
    config: DocumentConfig,
}

impl PopplerInspector {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        tool: &Path,
        leading: &[&str],
        path: &Path,
        trailing: &[&str],
    ) -> Result<Output, DocumentError> {
        if !path.exists() {
            return Err(DocumentError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let command = Command::new(tool)
            .args(leading)
            .arg(path)
            .args(trailing)
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_secs(self.config.timeout_secs), command)
            .await
            .map_err(|_| DocumentError::Timeout {
                timeout_secs: self.config.timeout_secs,
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DocumentError::ToolNotFound {
                        path: tool.to_path_buf(),
                    }
                } else {
                    DocumentError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(DocumentError::Failed {
                reason: format!(
                    "{} exited with code {:?}: {}",
                    tool.display(),
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(output)
    }

    /// Reads the `Pages:` field from `pdfinfo` output.
    fn parse_page_count(info: &str) -> Result<u32, DocumentError> {
        let re = Regex::new(r"(?m)^Pages:\s+(\d+)").map_err(|e| DocumentError::Failed {
            reason: e.to_string(),
        })?;

        re.captures(info)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(|| DocumentError::Failed {
                reason: "pdfinfo output has no page count".to_string(),
            })
    }
}

#[async_trait]
impl DocumentInspector for PopplerInspector {
    async fn page_count(&self, path: &Path) -> Result<u32, DocumentError> {
        let output = self.run(&self.config.pdfinfo_path, &[], path, &[]).await?;
        Self::parse_page_count(&String::from_utf8_lossy(&output.stdout))
    }

    async fn first_page_text(&self, path: &Path) -> Result<String, DocumentError> {
        let output = self
            .run(
                &self.config.pdftotext_path,
                &["-f", "1", "-l", "1", "-layout"],
                path,
                // Write to stdout
                &["-"],
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          Quarterly report\n\
                    Producer:       LibreOffice 7.6\n\
                    Pages:          12\n\
                    Encrypted:      no\n";
        assert_eq!(PopplerInspector::parse_page_count(info).unwrap(), 12);
    }

    #[test]
    fn test_parse_page_count_missing() {
        let result = PopplerInspector::parse_page_count("Title: nothing here\n");
        assert!(matches!(result, Err(DocumentError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let inspector = PopplerInspector::new(DocumentConfig::default());
        let result = inspector
            .page_count(&PathBuf::from("/nonexistent/report.pdf"))
            .await;
        assert!(matches!(result, Err(DocumentError::InputNotFound { .. })));
    }
}
