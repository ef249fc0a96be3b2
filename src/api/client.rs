//! HTTP implementation of [`ReportingApi`] backed by `reqwest`.
//!
//! One `reqwest::Client` (and therefore one connection pool) is held for the
//! whole process and released by [`ReportingApi::close`]. No call is retried:
//! a failure is logged here and handed back to the caller as a
//! [`ReportingFailure`].

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::models::{
    ArtifactReference, FinishTest, FinishTestRun, FinishTestSession, LogRecord, RerunData,
    StartTest, StartTestRun, StartTestSession,
};
use super::{ApiResult, ReportingApi, ReportingFailure};
use crate::config::ServerConfig;

const AUTH_REFRESH_PATH: &str = "/api/iam/v1/auth/refresh";
const REPORTING_PATH: &str = "/api/reporting/v1";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokenResponse {
    auth_token: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: i64,
}

/// Request body plus how it may appear in diagnostics.
enum Payload {
    Empty,
    Json(String),
    /// JSON carrying a credential; never logged.
    Secret(String),
    Bytes {
        data: Vec<u8>,
        content_type: &'static str,
    },
}

impl Payload {
    fn json<T: serde::Serialize + ?Sized>(url: &str, body: &T) -> ApiResult<Self> {
        serde_json::to_string(body).map(Payload::Json).map_err(|e| {
            warn!("Could not serialize request body for {url}: {e}");
            ReportingFailure::Decode {
                url: url.to_string(),
                reason: format!("failed to serialize request body: {e}"),
            }
        })
    }

    fn describe(&self) -> String {
        match self {
            Payload::Empty => String::new(),
            Payload::Json(text) => text.clone(),
            Payload::Secret(_) => "<redacted>".to_string(),
            Payload::Bytes { data, content_type } => {
                format!("<{} bytes of {content_type}>", data.len())
            }
        }
    }
}

/// Authenticated client for a Zebrunner-compatible reporting service.
///
/// # Example
///
/// ```no_run
/// use zebrunner_reporter::api::{ReportingApi, ZebrunnerClient};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let mut client = ZebrunnerClient::new(
///     Some("https://mycompany.zebrunner.com".to_string()),
///     Some("refresh-token".to_string()),
/// )?;
/// client.authenticate().await;
/// assert!(client.is_authenticated());
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ZebrunnerClient {
    base_url: Option<String>,
    access_token: Option<String>,
    http: Option<Client>,
    auth_token: Option<String>,
}

impl ZebrunnerClient {
    /// Creates a client for `hostname`, authenticating with `access_token`.
    ///
    /// Either value may be absent; the client then never authenticates and
    /// every call fails (and is logged) instead of panicking.
    pub fn new(hostname: Option<String>, access_token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let base_url = hostname
            .map(|h| h.trim().trim_end_matches('/').to_string())
            .filter(|h| !h.is_empty());
        let access_token = access_token.filter(|t| !t.is_empty());

        Ok(Self {
            base_url,
            access_token,
            http: Some(http),
            auth_token: None,
        })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self> {
        Self::new(server.hostname.clone(), server.access_token.clone())
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn url(&self, path: &str) -> ApiResult<String> {
        match &self.base_url {
            Some(base) => Ok(format!("{base}{path}")),
            None => {
                warn!("No server hostname configured; skipping request to {path}");
                Err(ReportingFailure::NotConnected("reporting service"))
            }
        }
    }

    fn reporting_url(&self, path: &str) -> ApiResult<String> {
        self.url(&format!("{REPORTING_PATH}{path}"))
    }

    /// Sends one request and classifies the outcome.
    ///
    /// Transport errors and a closed client are logged at WARN, non-2xx
    /// responses at ERROR with the request and response bodies.
    async fn send(
        &self,
        method: Method,
        url: String,
        query: &[(&str, &str)],
        payload: Payload,
    ) -> ApiResult<Response> {
        let Some(client) = self.http.as_ref() else {
            warn!("Reporting client is closed; dropping request {method} {url}");
            return Err(ReportingFailure::Closed);
        };
        let described = payload.describe();

        let mut builder = client.request(method.clone(), &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder = match payload {
            Payload::Empty => builder,
            Payload::Json(text) | Payload::Secret(text) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(text),
            Payload::Bytes { data, content_type } => {
                builder.header(CONTENT_TYPE, content_type).body(data)
            }
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(source) => {
                warn!(
                    "Error while sending request to reporting service: {method} {url}: {source:?}"
                );
                return Err(ReportingFailure::Transport { url, source });
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("{method} {url} -> {status}");
            return Ok(response);
        }

        let response_body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        error!(
            "Request {method} {url}\n\nContent: \n{described}\n\nResponse Code: {status}\n Content: \n{response_body}"
        );
        Err(ReportingFailure::Status {
            method: method.to_string(),
            url,
            status: status.as_u16(),
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let url = response.url().to_string();
        response.json::<T>().await.map_err(|e| {
            warn!("Unexpected response body from {url}: {e}");
            ReportingFailure::Decode {
                url,
                reason: e.to_string(),
            }
        })
    }
}

/// A rerun-context token holding a JSON object is sent as that object; any
/// other token is sent as a JSON string.
fn rerun_context_body(run_context: &str) -> serde_json::Value {
    match serde_json::from_str(run_context) {
        Ok(object @ serde_json::Value::Object(_)) => object,
        _ => serde_json::Value::String(run_context.to_string()),
    }
}

#[async_trait]
impl ReportingApi for ZebrunnerClient {
    async fn authenticate(&mut self) {
        if self.auth_token.is_some() {
            return;
        }
        let Some(token) = self.access_token.clone() else {
            debug!("No access token configured; skipping authentication");
            return;
        };
        if self.base_url.is_none() {
            debug!("No server hostname configured; skipping authentication");
            return;
        }

        let Ok(url) = self.url(AUTH_REFRESH_PATH) else {
            return;
        };
        let body = serde_json::json!({ "refreshToken": token }).to_string();
        let Ok(response) = self
            .send(Method::POST, url, &[], Payload::Secret(body))
            .await
        else {
            return;
        };

        if let Ok(auth) = Self::parse::<AuthTokenResponse>(response).await {
            self.auth_token = Some(auth.auth_token);
            info!("Authenticated with reporting service");
        }
    }

    fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    async fn start_test_run(&self, project_key: &str, body: &StartTestRun) -> ApiResult<i64> {
        let url = self.reporting_url("/test-runs")?;
        let payload = Payload::json(&url, body)?;
        let response = self
            .send(Method::POST, url, &[("projectKey", project_key)], payload)
            .await?;
        Ok(Self::parse::<IdResponse>(response).await?.id)
    }

    async fn start_test(&self, run_id: i64, body: &StartTest) -> ApiResult<i64> {
        let url = self.reporting_url(&format!("/test-runs/{run_id}/tests"))?;
        let payload = Payload::json(&url, body)?;
        let response = self.send(Method::POST, url, &[], payload).await?;
        Ok(Self::parse::<IdResponse>(response).await?.id)
    }

    async fn finish_test(&self, run_id: i64, test_id: i64, body: &FinishTest) -> ApiResult<()> {
        let url = self.reporting_url(&format!("/test-runs/{run_id}/tests/{test_id}"))?;
        let payload = Payload::json(&url, body)?;
        self.send(Method::PUT, url, &[], payload).await?;
        Ok(())
    }

    async fn finish_test_run(&self, run_id: i64, ended_at: &str) -> ApiResult<()> {
        let url = self.reporting_url(&format!("/test-runs/{run_id}"))?;
        let body = FinishTestRun {
            ended_at: ended_at.to_string(),
        };
        let payload = Payload::json(&url, &body)?;
        self.send(Method::PUT, url, &[], payload).await?;
        Ok(())
    }

    async fn send_logs(&self, run_id: i64, logs: &[LogRecord]) -> ApiResult<()> {
        let url = self.reporting_url(&format!("/test-runs/{run_id}/logs"))?;
        let payload = Payload::json(&url, logs)?;
        self.send(Method::POST, url, &[], payload).await?;
        Ok(())
    }

    async fn send_screenshot(&self, run_id: i64, test_id: i64, image: &Path) -> ApiResult<()> {
        let url = self.reporting_url(&format!("/test-runs/{run_id}/tests/{test_id}/screenshots"))?;
        let data = tokio::fs::read(image).await.map_err(|e| {
            warn!("Could not read screenshot {}: {e}", image.display());
            ReportingFailure::Io(e)
        })?;
        let payload = Payload::Bytes {
            data,
            content_type: "image/png",
        };
        self.send(Method::POST, url, &[], payload).await?;
        Ok(())
    }

    async fn start_test_session(
        &self,
        _run_id: i64,
        body: &StartTestSession,
    ) -> ApiResult<String> {
        debug!(
            "Test session {} not reported: sessions are not connected",
            body.session_id
        );
        Err(ReportingFailure::NotConnected("test session start"))
    }

    async fn finish_test_session(
        &self,
        _run_id: i64,
        session_id: &str,
        _body: &FinishTestSession,
    ) -> ApiResult<()> {
        debug!("Test session {session_id} not finished: sessions are not connected");
        Err(ReportingFailure::NotConnected("test session finish"))
    }

    async fn send_artifact(&self, _run_id: i64, _artifacts: &[ArtifactReference]) -> ApiResult<()> {
        Err(ReportingFailure::Unsupported("artifact upload"))
    }

    async fn get_rerun_tests(&self, run_context: &str) -> ApiResult<RerunData> {
        let url = self.reporting_url("/run-context-exchanges")?;
        let context = rerun_context_body(run_context);
        let payload = Payload::json(&url, &context)?;
        let response = self.send(Method::POST, url, &[], payload).await?;
        Self::parse::<RerunData>(response).await
    }

    async fn close(&mut self) {
        if self.http.take().is_some() {
            debug!("Released reporting service connection pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client =
            ZebrunnerClient::new(Some(" https://example.com/ ".into()), Some("t".into())).unwrap();
        assert_eq!(client.base_url(), Some("https://example.com"));

        let client = ZebrunnerClient::new(Some(String::new()), None).unwrap();
        assert_eq!(client.base_url(), None);
    }

    #[test]
    fn test_secret_payload_is_not_described() {
        let payload = Payload::Secret("{\"refreshToken\":\"abc\"}".into());
        assert_eq!(payload.describe(), "<redacted>");

        let payload = Payload::Bytes {
            data: vec![0; 4],
            content_type: "image/png",
        };
        assert_eq!(payload.describe(), "<4 bytes of image/png>");
    }

    #[test]
    fn test_rerun_context_body_keeps_only_objects() {
        assert_eq!(
            rerun_context_body(r#"{"id":"ctx"}"#),
            serde_json::json!({"id": "ctx"})
        );
        assert_eq!(rerun_context_body("12345"), serde_json::json!("12345"));
        assert_eq!(rerun_context_body("true"), serde_json::json!("true"));
        assert_eq!(rerun_context_body("[1]"), serde_json::json!("[1]"));
        assert_eq!(rerun_context_body("ctx-token"), serde_json::json!("ctx-token"));
    }

    #[tokio::test]
    async fn test_missing_hostname_is_not_connected() {
        let mut client = ZebrunnerClient::new(None, Some("token".into())).unwrap();
        client.authenticate().await;
        assert!(!client.is_authenticated());

        let err = client
            .start_test_run("DEF", &StartTestRun::new("run", "uuid"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportingFailure::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_calls_after_close_fail() {
        let mut client =
            ZebrunnerClient::new(Some("http://127.0.0.1:9".into()), Some("t".into())).unwrap();
        client.close().await;
        let err = client.finish_test_run(1, "now").await.unwrap_err();
        assert!(matches!(err, ReportingFailure::Closed));
    }

    #[tokio::test]
    async fn test_artifact_upload_is_fatal() {
        let client = ZebrunnerClient::new(None, None).unwrap();
        let err = client.send_artifact(1, &[]).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
