//! Shared test doubles.

#![allow(dead_code)]

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use zebrunner_reporter::api::models::{
    ArtifactReference, FinishTest, FinishTestSession, LogRecord, RerunData, StartTest,
    StartTestRun, StartTestSession,
};
use zebrunner_reporter::api::{ApiResult, ReportingApi, ReportingFailure};
use zebrunner_reporter::config::Settings;

pub const RUN_ID: i64 = 100;

/// One call observed by [`RecordingApi`]. Bodies are kept as JSON so
/// assertions see exactly what would go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Authenticate,
    StartRun { project_key: String, body: Value },
    StartTest { run_id: i64, body: Value },
    FinishTest { run_id: i64, test_id: i64, body: Value },
    FinishRun { run_id: i64, ended_at: String },
    SendLogs { run_id: i64, logs: Vec<LogRecord> },
    Screenshot { run_id: i64, test_id: i64 },
    StartSession { run_id: i64, body: Value },
    FinishSession { run_id: i64, session_id: String, body: Value },
    Artifact { run_id: i64 },
    Rerun { context: String },
    Close,
}

impl Call {
    /// Whether the call belongs to a test's lifecycle.
    pub fn is_test_call(&self) -> bool {
        matches!(self, Call::StartTest { .. } | Call::FinishTest { .. })
    }
}

fn rejected(operation: &str) -> ReportingFailure {
    ReportingFailure::Status {
        method: "POST".to_string(),
        url: format!("http://mock/{operation}"),
        status: 500,
    }
}

/// A [`ReportingApi`] that records every call and answers from canned data.
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    authenticated: bool,
    next_test_id: AtomicI64,
    pub auth_succeeds: bool,
    pub fail_start_run: bool,
    pub fail_start_test: bool,
    pub fail_finish_test: bool,
    pub session_id: Option<String>,
    pub rerun: Option<Value>,
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            authenticated: false,
            next_test_id: AtomicI64::new(1),
            auth_succeeds: true,
            fail_start_run: false,
            fail_start_test: false,
            fail_finish_test: false,
            session_id: None,
            rerun: None,
        }
    }
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start_run() -> Self {
        Self {
            fail_start_run: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn finish_test_bodies(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::FinishTest { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ReportingApi for RecordingApi {
    async fn authenticate(&mut self) {
        if self.authenticated {
            return;
        }
        self.record(Call::Authenticate);
        self.authenticated = self.auth_succeeds;
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn start_test_run(&self, project_key: &str, body: &StartTestRun) -> ApiResult<i64> {
        self.record(Call::StartRun {
            project_key: project_key.to_string(),
            body: serde_json::to_value(body).unwrap(),
        });
        if self.fail_start_run {
            return Err(rejected("test-runs"));
        }
        Ok(RUN_ID)
    }

    async fn start_test(&self, run_id: i64, body: &StartTest) -> ApiResult<i64> {
        self.record(Call::StartTest {
            run_id,
            body: serde_json::to_value(body).unwrap(),
        });
        if self.fail_start_test {
            return Err(rejected("tests"));
        }
        Ok(self.next_test_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn finish_test(&self, run_id: i64, test_id: i64, body: &FinishTest) -> ApiResult<()> {
        self.record(Call::FinishTest {
            run_id,
            test_id,
            body: serde_json::to_value(body).unwrap(),
        });
        if self.fail_finish_test {
            return Err(rejected("tests/finish"));
        }
        Ok(())
    }

    async fn finish_test_run(&self, run_id: i64, ended_at: &str) -> ApiResult<()> {
        self.record(Call::FinishRun {
            run_id,
            ended_at: ended_at.to_string(),
        });
        Ok(())
    }

    async fn send_logs(&self, run_id: i64, logs: &[LogRecord]) -> ApiResult<()> {
        self.record(Call::SendLogs {
            run_id,
            logs: logs.to_vec(),
        });
        Ok(())
    }

    async fn send_screenshot(&self, run_id: i64, test_id: i64, _image: &Path) -> ApiResult<()> {
        self.record(Call::Screenshot { run_id, test_id });
        Ok(())
    }

    async fn start_test_session(
        &self,
        run_id: i64,
        body: &StartTestSession,
    ) -> ApiResult<String> {
        self.record(Call::StartSession {
            run_id,
            body: serde_json::to_value(body).unwrap(),
        });
        self.session_id
            .clone()
            .ok_or(ReportingFailure::NotConnected("test session start"))
    }

    async fn finish_test_session(
        &self,
        run_id: i64,
        session_id: &str,
        body: &FinishTestSession,
    ) -> ApiResult<()> {
        self.record(Call::FinishSession {
            run_id,
            session_id: session_id.to_string(),
            body: serde_json::to_value(body).unwrap(),
        });
        Ok(())
    }

    async fn send_artifact(&self, run_id: i64, _artifacts: &[ArtifactReference]) -> ApiResult<()> {
        self.record(Call::Artifact { run_id });
        Err(ReportingFailure::Unsupported("artifact upload"))
    }

    async fn get_rerun_tests(&self, run_context: &str) -> ApiResult<RerunData> {
        self.record(Call::Rerun {
            context: run_context.to_string(),
        });
        match &self.rerun {
            Some(value) => Ok(serde_json::from_value(value.clone()).unwrap()),
            None => Err(rejected("run-context-exchanges")),
        }
    }

    async fn close(&mut self) {
        self.record(Call::Close);
    }
}

/// Enabled settings that never need a real server.
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.project_key = "WEB".to_string();
    settings.run.display_name = "Nightly".to_string();
    settings.run.environment = Some("staging".to_string());
    settings.run.build = Some("1.2.3".to_string());
    settings
}

/// Records this crate's diagnostics with their level.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the capture as the current thread's subscriber until the
    /// guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Messages logged at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[derive(Default)]
struct MessageText(String);

impl Visit for MessageText {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("zebrunner_reporter") {
            return;
        }
        let mut text = MessageText::default();
        event.record(&mut text);
        self.events
            .lock()
            .unwrap()
            .push((*metadata.level(), text.0));
    }
}
