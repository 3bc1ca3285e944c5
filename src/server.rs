// Extraction endpoint - axum router
//
// Every method reaches the same handler so OPTIONS and unsupported methods
// get the endpoint's own JSON answers. CORS and content-type headers are set
// on every response, errors included.

use crate::error::ExtractError;
use crate::extraction::{ExtractResponse, ExtractionService};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{warn, Instrument};
use uuid::Uuid;

/// Path of the extraction endpoint
pub const EXTRACT_PATH: &str = "/extract-references";

/// Error body: `details` only for upstream and parse failures
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// POST /extract-references - document → reference codes
async fn extract_references(
    State(service): State<Arc<ExtractionService>>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    if method != Method::POST {
        let body = ErrorResponse {
            error: "Method not allowed".to_string(),
            details: None,
        };
        return (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response();
    }

    // Oversized or unreadable bodies still get a JSON error
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return ExtractError::Input(format!("Corps de requête illisible : {}", rejection.body_text()))
                .into_response();
        }
    };

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("extract", %request_id);

    match service.extract(&body).instrument(span).await {
        Ok(result) => (StatusCode::OK, Json(ExtractResponse::from(result))).into_response(),
        Err(e) => {
            warn!(%request_id, "Extraction failed: {}", e);
            e.into_response()
        }
    }
}

/// Router with the extraction endpoint and health check
pub fn router(service: Arc<ExtractionService>) -> Router {
    let body_limit = DefaultBodyLimit::max(service.max_body_bytes());

    Router::new()
        .route(EXTRACT_PATH, any(extract_references))
        .route("/health", get(health_check))
        .with_state(service)
        .layer(body_limit)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::error::UpstreamError;
    use crate::extraction::anthropic::{LanguageModel, MessageRequest, ModelConnector};
    use crate::extraction::CredentialSource;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct CannedModel(Result<String, UpstreamError>);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, _request: &MessageRequest) -> Result<String, UpstreamError> {
            self.0.clone()
        }
    }

    struct CannedConnector(Result<String, UpstreamError>);

    impl ModelConnector for CannedConnector {
        fn connect(&self, _api_key: &str) -> Result<Box<dyn LanguageModel>, UpstreamError> {
            Ok(Box::new(CannedModel(self.0.clone())))
        }
    }

    fn app(reply: Result<String, UpstreamError>, key: Option<&str>) -> Router {
        app_with(&ExtractionConfig::default(), reply, key)
    }

    fn app_with(config: &ExtractionConfig, reply: Result<String, UpstreamError>, key: Option<&str>) -> Router {
        let service = ExtractionService::new(
            config,
            CredentialSource::Fixed(key.map(str::to_string)),
            Arc::new(CannedConnector(reply)),
        );
        router(Arc::new(service))
    }

    fn post(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(EXTRACT_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn upload() -> Value {
        json!({ "file": "data:application/pdf;base64,JVBERi0xLjQ=", "mimeType": "application/pdf" })
    }

    #[tokio::test]
    async fn test_extract_success() {
        let reply = "```json\n{\"references\": [\"A1B205\", \"A0B123\"]}\n```".to_string();
        let response = app(Ok(reply), Some("sk-test")).oneshot(post(upload())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = json_body(response).await;
        assert_eq!(body["references"], json!(["A1B205", "A0B123"]));
        assert_eq!(body["count"], 2);
        assert_eq!(body["message"], "2 référence(s) extraite(s) avec succès");
    }

    #[tokio::test]
    async fn test_multi_megabyte_pdf_is_accepted() {
        // 3 MiB of zero bytes, about 4 MiB once base64-encoded
        let pdf = STANDARD.encode(vec![0u8; 3 * 1024 * 1024]);
        let request = json!({ "file": format!("data:application/pdf;base64,{}", pdf), "mimeType": "application/pdf" });
        let reply = r#"{"references": ["A1B205"]}"#.to_string();

        let response = app(Ok(reply), Some("sk-test")).oneshot(post(request)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["references"], json!(["A1B205"]));
    }

    #[tokio::test]
    async fn test_body_over_limit_is_json_bad_request() {
        let config = ExtractionConfig {
            max_body_bytes: 1024,
            ..ExtractionConfig::default()
        };
        let pdf = STANDARD.encode(vec![0u8; 4096]);
        let request = json!({ "file": pdf, "mimeType": "application/pdf" });

        let response = app_with(&config, Ok(String::new()), Some("sk-test"))
            .oneshot(post(request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Corps de requête illisible"));
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let response = app(Ok(String::new()), Some("sk-test"))
            .oneshot(post(json!({ "file": "", "mimeType": "image/png" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Fichier ou type MIME manquant");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_missing_key_has_no_details() {
        let response = app(Ok(String::new()), None).oneshot(post(upload())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Clé API Claude non configurée sur le serveur");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_upstream_auth_failure_carries_details() {
        let rejected = Err(UpstreamError {
            status: Some(401),
            message: "invalid x-api-key".to_string(),
        });
        let response = app(rejected, Some("sk-bad")).oneshot(post(upload())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Clé API Claude invalide"));
        assert!(body["details"].as_str().unwrap().contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_server_error() {
        let response = app(Ok("désolé, rien trouvé".to_string()), Some("sk-test"))
            .oneshot(post(upload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("désolé, rien trouvé"));
    }

    #[tokio::test]
    async fn test_preflight_is_empty_ok() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(EXTRACT_PATH)
            .body(Body::empty())
            .unwrap();
        let response = app(Ok(String::new()), None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_get_is_method_not_allowed() {
        let request = Request::builder()
            .method(Method::GET)
            .uri(EXTRACT_PATH)
            .body(Body::empty())
            .unwrap();
        let response = app(Ok(String::new()), None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(json_body(response).await, json!({ "error": "Method not allowed" }));
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(Ok(String::new()), None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }
}
