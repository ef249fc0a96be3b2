//! Wire payloads exchanged with the reporting service.
//!
//! Field names are camelCase on the wire and optional fields are omitted
//! rather than sent as `null`.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Framework identifier sent with every run.
pub const FRAMEWORK: &str = "pytest";

/// Current UTC time as an RFC 3339 string with an explicit offset.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Fresh client-side correlation uuid.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Canonical result of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Unknown,
    InProgress,
    Passed,
    Failed,
    Skipped,
    Aborted,
    Queued,
}

/// Kind of notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    EmailRecipients,
    SlackChannels,
    MsTeamsChannels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// CI environment the run executes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiContext {
    pub ci_type: String,
    pub env_variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestRun {
    pub name: String,
    pub framework: String,
    pub started_at: String,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<TestRunConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_context: Option<CiContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_targets: Option<Vec<NotificationTarget>>,
}

impl StartTestRun {
    /// Creates a payload stamped with the current time and the given uuid.
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            framework: FRAMEWORK.to_string(),
            started_at: now_rfc3339(),
            uuid: uuid.into(),
            config: None,
            milestone: None,
            ci_context: None,
            notification_targets: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// Data the service uses to match a test across reruns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationData {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTest {
    pub name: String,
    pub class_name: String,
    pub method_name: String,
    pub uuid: String,
    pub started_at: String,
    /// JSON-encoded [`CorrelationData`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishTest {
    pub result: TestStatus,
    pub ended_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FinishTest {
    pub fn new(result: TestStatus, reason: Option<String>) -> Self {
        Self {
            result,
            ended_at: now_rfc3339(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishTestRun {
    pub ended_at: String,
}

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub test_id: String,
    pub level: String,
    /// Epoch milliseconds.
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestSession {
    pub session_id: String,
    pub started_at: String,
    pub desired_capabilities: serde_json::Map<String, serde_json::Value>,
    pub capabilities: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub test_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishTestSession {
    pub ended_at: String,
    #[serde(default)]
    pub test_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub name: String,
    pub value: String,
}

/// A test listed in a rerun descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunTest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_correlation_data")]
    pub correlation_data: Option<CorrelationData>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
}

/// Tests the service wants re-executed for a rerun-context token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub run_exists: bool,
    #[serde(default)]
    pub rerun_only_failed_tests: bool,
    #[serde(default)]
    pub tests: Vec<RerunTest>,
}

impl RerunData {
    /// Names carried in correlation data. Entries without it are not eligible.
    pub fn correlated_names(&self) -> impl Iterator<Item = &str> {
        self.tests
            .iter()
            .filter_map(|test| test.correlation_data.as_ref())
            .map(|data| data.name.as_str())
    }
}

/// Correlation data is echoed back either as an object or as the JSON string
/// it was originally sent as.
fn deserialize_correlation_data<'de, D>(deserializer: D) -> Result<Option<CorrelationData>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) => Ok(serde_json::from_str(&raw).ok()),
        Some(other) => Ok(serde_json::from_value(other).ok()),
    }
}
