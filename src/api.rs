//! Remote reporting service surface.
//!
//! The orchestrator only ever talks to the service through [`ReportingApi`],
//! so it can be driven against a recording double in tests and against
//! [`client::ZebrunnerClient`] in production.
//!
//! # Failure model
//!
//! Every operation returns [`ApiResult<T>`]. Implementations log their own
//! diagnostics when a call fails; callers decide whether a failure matters.
//! Only [`ReportingFailure::Unsupported`] is fatal: it signals a call into an
//! interface point that has no implementation, which is a caller bug rather
//! than a network condition.
//!
//! ```text
//!   Orchestrator ──► ReportingApi::start_test(...) ──► Ok(test_id)
//!                                                  └─► Err(ReportingFailure)
//!                                                        │
//!                                  is_fatal()? ──yes──► propagate
//!                                        │
//!                                        no ──► drop, keep the run going
//! ```

pub mod client;
pub mod models;

use std::path::Path;

use async_trait::async_trait;

pub use client::ZebrunnerClient;
use models::{
    ArtifactReference, FinishTest, FinishTestSession, LogRecord, RerunData, StartTest,
    StartTestRun, StartTestSession,
};

/// Result type for remote operations.
pub type ApiResult<T> = Result<T, ReportingFailure>;

/// Why a remote operation produced no result.
#[derive(Debug, thiserror::Error)]
pub enum ReportingFailure {
    /// Connection refused, timeout, DNS or TLS failure.
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status.
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    /// The service answered 2xx but the body was not what was expected.
    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The operation is modeled but not wired to a live endpoint.
    #[error("{0} is not connected to a remote endpoint")]
    NotConnected(&'static str),

    /// The operation is deliberately unimplemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// The client's connection resources were already released.
    #[error("Client has been closed")]
    Closed,

    /// A local file needed for the request could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportingFailure {
    /// Whether the failure must be surfaced instead of absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReportingFailure::Unsupported(_))
    }
}

/// Operations offered by the reporting service.
///
/// Calls are issued strictly one at a time by the orchestrator; an
/// implementation never has to handle overlapping requests.
#[async_trait]
pub trait ReportingApi: Send + Sync {
    /// Exchanges the refresh token for a bearer credential.
    ///
    /// No-op once a credential has been obtained.
    async fn authenticate(&mut self);

    /// Whether a bearer credential is held.
    fn is_authenticated(&self) -> bool;

    async fn start_test_run(&self, project_key: &str, body: &StartTestRun) -> ApiResult<i64>;

    async fn start_test(&self, run_id: i64, body: &StartTest) -> ApiResult<i64>;

    async fn finish_test(&self, run_id: i64, test_id: i64, body: &FinishTest) -> ApiResult<()>;

    /// Stamps the run as ended at `ended_at`.
    async fn finish_test_run(&self, run_id: i64, ended_at: &str) -> ApiResult<()>;

    async fn send_logs(&self, run_id: i64, logs: &[LogRecord]) -> ApiResult<()>;

    async fn send_screenshot(&self, run_id: i64, test_id: i64, image: &Path) -> ApiResult<()>;

    /// Starts an environment session and returns its server id.
    async fn start_test_session(&self, run_id: i64, body: &StartTestSession)
    -> ApiResult<String>;

    async fn finish_test_session(
        &self,
        run_id: i64,
        session_id: &str,
        body: &FinishTestSession,
    ) -> ApiResult<()>;

    /// Attaches artifact references to a run.
    async fn send_artifact(&self, run_id: i64, artifacts: &[ArtifactReference]) -> ApiResult<()>;

    /// Fetches the rerun descriptor for a rerun-context token.
    async fn get_rerun_tests(&self, run_context: &str) -> ApiResult<RerunData>;

    /// Releases connection resources. Later calls fail with
    /// [`ReportingFailure::Closed`].
    async fn close(&mut self);
}
