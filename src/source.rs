// Record sources - where the sheet CSV comes from

use crate::error::LocatorError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Raw CSV text. Any failure is a `LocatorError::Network`.
    async fn fetch_csv(&self) -> Result<String, LocatorError>;

    /// Shown in logs
    fn describe(&self) -> String;
}

/// Published spreadsheet fetched over HTTPS
pub struct HttpSheet {
    client: reqwest::Client,
    url: String,
}

impl HttpSheet {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LocatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocatorError::Network(e.to_string()))?;

        Ok(HttpSheet {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RecordSource for HttpSheet {
    async fn fetch_csv(&self) -> Result<String, LocatorError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LocatorError::Network(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| LocatorError::Network(e.to_string()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Local CSV export of the sheet
pub struct FileSheet {
    path: PathBuf,
}

impl FileSheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSheet { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for FileSheet {
    async fn fetch_csv(&self) -> Result<String, LocatorError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LocatorError::Network(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory CSV, for tests and fixtures
pub struct StaticSheet(pub String);

#[async_trait]
impl RecordSource for StaticSheet {
    async fn fetch_csv(&self) -> Result<String, LocatorError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_network_error() {
        let sheet = FileSheet::new("/definitely/not/here.csv");
        match sheet.fetch_csv().await {
            Err(LocatorError::Network(msg)) => assert!(msg.contains("here.csv")),
            other => panic!("Expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_sheet_reads_contents() {
        let path = std::env::temp_dir().join(format!("locator-sheet-{}.csv", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "ref,addr\nA1B1,1 Rue A\n").await.unwrap();

        let text = FileSheet::new(&path).fetch_csv().await.unwrap();
        assert!(text.contains("A1B1"));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
