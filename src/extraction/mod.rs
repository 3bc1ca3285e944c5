// Reference extraction - uploaded document → LLM → reference codes
//
// Stateless across requests: the credential is read and the API client is
// built again on every call.

pub mod anthropic;
pub mod prompt;
pub mod salvage;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use anthropic::{AnthropicConnector, ContentBlock, Message, MessageRequest, ModelConnector};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub use salvage::salvage;

/// References found in one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub references: Vec<String>,
    pub count: usize,
}

impl ExtractionResult {
    pub fn new(references: Vec<String>) -> Self {
        let count = references.len();
        ExtractionResult { references, count }
    }

    pub fn message(&self) -> String {
        format!("{} référence(s) extraite(s) avec succès", self.count)
    }
}

/// Success body of the endpoint
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub references: Vec<String>,
    pub count: usize,
    pub message: String,
}

impl From<ExtractionResult> for ExtractResponse {
    fn from(result: ExtractionResult) -> Self {
        let message = result.message();
        ExtractResponse {
            references: result.references,
            count: result.count,
            message,
        }
    }
}

/// Request body as sent by the page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A request that passed boundary validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Base64 payload, data-URL prefix removed
    pub data: String,
    pub mime_type: String,
}

const MISSING_FIELDS: &str = "Fichier ou type MIME manquant";

impl ExtractRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, ExtractError> {
        serde_json::from_slice(body).map_err(|e| ExtractError::Input(format!("Corps de requête JSON invalide : {}", e)))
    }

    pub fn validate(self) -> Result<Upload, ExtractError> {
        let file = self.file.filter(|f| !f.is_empty());
        let mime_type = self.mime_type.filter(|m| !m.is_empty());

        let (Some(file), Some(mime_type)) = (file, mime_type) else {
            return Err(ExtractError::Input(MISSING_FIELDS.to_string()));
        };

        let data = strip_data_url(&file);
        if data.is_empty() {
            return Err(ExtractError::Input(MISSING_FIELDS.to_string()));
        }

        STANDARD
            .decode(data)
            .map_err(|e| ExtractError::Input(format!("Fichier non encodé en base64 : {}", e)))?;

        Ok(Upload {
            data: data.to_string(),
            mime_type,
        })
    }
}

/// Payload of a `data:<mime>;base64,<payload>` URL; plain base64 is returned as is
pub fn strip_data_url(file: &str) -> &str {
    if file.contains(',') {
        file.split(',').nth(1).unwrap_or("")
    } else {
        file
    }
}

/// Where the API key comes from
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Environment variable, read on every request
    Env(String),
    Fixed(Option<String>),
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<String> {
        let key = match self {
            CredentialSource::Env(name) => std::env::var(name).ok(),
            CredentialSource::Fixed(key) => key.clone(),
        };
        key.filter(|key| !key.trim().is_empty())
    }
}

pub struct ExtractionService {
    model: String,
    max_tokens: u32,
    max_body_bytes: usize,
    credential: CredentialSource,
    connector: Arc<dyn ModelConnector>,
}

impl ExtractionService {
    pub fn new(config: &ExtractionConfig, credential: CredentialSource, connector: Arc<dyn ModelConnector>) -> Self {
        ExtractionService {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_body_bytes: config.max_body_bytes,
            credential,
            connector,
        }
    }

    /// Messages API over HTTPS, key taken from the configured variable
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let connector = AnthropicConnector {
            api_url: config.api_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        };
        Self::new(config, CredentialSource::Env(config.api_key_env.clone()), Arc::new(connector))
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn build_request(&self, upload: &Upload) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![
                    ContentBlock::for_upload(&upload.mime_type, upload.data.clone()),
                    ContentBlock::Text {
                        text: prompt::EXTRACTION_PROMPT.to_string(),
                    },
                ],
            }],
        }
    }

    /// Handle one raw request body.
    ///
    /// Input and credential problems are rejected before any upstream
    /// call. Upstream failures are classified; salvage failure aborts.
    pub async fn extract(&self, body: &[u8]) -> Result<ExtractionResult, ExtractError> {
        let upload = ExtractRequest::from_json(body)?.validate()?;

        let Some(api_key) = self.credential.resolve() else {
            error!("No API key configured for extraction");
            return Err(ExtractError::Config);
        };

        info!("Extracting references from {} upload ({} base64 chars)", upload.mime_type, upload.data.len());

        let reply = self
            .connector
            .connect(&api_key)
            .map_err(ExtractError::from)?
            .complete(&self.build_request(&upload))
            .await
            .map_err(|e| {
                error!("Model call failed: {:?}", e);
                ExtractError::from(e)
            })?;

        debug!("Model reply: {}", reply);

        let result = salvage(&reply)?;
        info!("{}", result.message());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use anthropic::LanguageModel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedModel {
        reply: Result<String, UpstreamError>,
        seen: Arc<Mutex<Vec<MessageRequest>>>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, request: &MessageRequest) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    struct CannedConnector {
        reply: Result<String, UpstreamError>,
        seen: Arc<Mutex<Vec<MessageRequest>>>,
        keys: Arc<Mutex<Vec<String>>>,
    }

    impl ModelConnector for CannedConnector {
        fn connect(&self, api_key: &str) -> Result<Box<dyn LanguageModel>, UpstreamError> {
            self.keys.lock().unwrap().push(api_key.to_string());
            Ok(Box::new(CannedModel {
                reply: self.reply.clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    fn service(reply: Result<String, UpstreamError>, key: Option<&str>) -> (ExtractionService, Arc<Mutex<Vec<MessageRequest>>>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let keys = Arc::new(Mutex::new(Vec::new()));
        let connector = CannedConnector {
            reply,
            seen: seen.clone(),
            keys: keys.clone(),
        };
        let service = ExtractionService::new(
            &ExtractionConfig::default(),
            CredentialSource::Fixed(key.map(str::to_string)),
            Arc::new(connector),
        );
        (service, seen, keys)
    }

    fn body(file: &str, mime: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({"file": file, "mimeType": mime})).unwrap()
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,iVBORw0K"), "iVBORw0K");
        assert_eq!(strip_data_url("iVBORw0K"), "iVBORw0K");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        for raw in [
            r#"{"file":"","mimeType":"image/png"}"#,
            r#"{"file":"aGVsbG8=","mimeType":""}"#,
            r#"{"mimeType":"image/png"}"#,
            r#"{}"#,
            r#"{"file":"data:image/png;base64,","mimeType":"image/png"}"#,
        ] {
            let err = ExtractRequest::from_json(raw.as_bytes()).unwrap().validate().unwrap_err();
            assert_eq!(err, ExtractError::Input(MISSING_FIELDS.to_string()), "body: {}", raw);
        }
    }

    #[test]
    fn test_validate_rejects_bad_json_and_base64() {
        assert!(matches!(ExtractRequest::from_json(b"not json"), Err(ExtractError::Input(_))));

        let err = ExtractRequest::from_json(&body("%%%not-base64%%%", "image/png"))
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_validate_accepts_data_url() {
        let upload = ExtractRequest::from_json(&body("data:application/pdf;base64,JVBERi0xLjQ=", "application/pdf"))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(upload.data, "JVBERi0xLjQ=");
        assert_eq!(upload.mime_type, "application/pdf");
    }

    #[test]
    fn test_result_message() {
        let result = ExtractionResult::new(vec!["A1B205".into(), "A0B123".into()]);
        assert_eq!(result.count, 2);
        assert_eq!(result.message(), "2 référence(s) extraite(s) avec succès");
    }

    #[tokio::test]
    async fn test_extract_happy_path() {
        let (service, seen, keys) = service(Ok("```json\n{\"references\":[\"A1B205\"]}\n```".into()), Some("sk-test"));

        let result = service.extract(&body("data:image/png;base64,aGVsbG8=", "image/png")).await.unwrap();
        assert_eq!(result.references, vec!["A1B205"]);

        assert_eq!(*keys.lock().unwrap(), vec!["sk-test".to_string()]);
        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "claude-sonnet-4-5-20250929");
        assert_eq!(requests[0].max_tokens, 1024);
        assert!(matches!(requests[0].messages[0].content[0], ContentBlock::Image { .. }));
        assert!(matches!(requests[0].messages[0].content[1], ContentBlock::Text { .. }));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error_without_upstream_call() {
        let (service, seen, _) = service(Ok("{}".into()), None);

        let err = service.extract(&body("aGVsbG8=", "image/png")).await.unwrap_err();
        assert_eq!(err, ExtractError::Config);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_input_checked_before_credential() {
        let (service, _, keys) = service(Ok("{}".into()), None);

        let err = service.extract(&body("", "image/png")).await.unwrap_err();
        assert!(matches!(err, ExtractError::Input(_)));
        assert!(keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_is_classified() {
        let (service, _, _) = service(
            Err(UpstreamError {
                status: Some(429),
                message: "rate_limit_error".into(),
            }),
            Some("sk-test"),
        );

        let err = service.extract(&body("aGVsbG8=", "image/png")).await.unwrap_err();
        assert!(matches!(err, ExtractError::UpstreamRateLimit { .. }));
    }

    #[tokio::test]
    async fn test_unsalvageable_reply() {
        let (service, _, _) = service(Ok("I could not find any references.".into()), Some("sk-test"));

        let err = service.extract(&body("aGVsbG8=", "application/pdf")).await.unwrap_err();
        assert!(matches!(err, ExtractError::ResponseParse { .. }));
        assert!(err.to_string().contains("I could not find any references."));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        assert_eq!(CredentialSource::Fixed(Some("  ".into())).resolve(), None);
        assert_eq!(CredentialSource::Fixed(Some("k".into())).resolve(), Some("k".into()));
    }
}
