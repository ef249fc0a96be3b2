//! Reporting orchestration.
//!
//! [`ReportingService`] receives test-framework lifecycle events, keeps the
//! [`ExecutionContext`] up to date, and issues calls to a [`ReportingApi`] in
//! causal order.
//!
//! # Event Flow
//!
//! ```text
//!   filter_items ──► (collection narrowed by rerun context)
//!        │
//!   start_run ─────► authenticate, start run, arm log capture
//!        │
//!        ├──► start_test ──► start test ──┬──► (skipped) finish SKIPPED
//!        │                                │
//!        │    finish_test ◄───────────────┘
//!        │        └──► resolve status ──► finish test
//!        │   (repeat per test)
//!        │
//!   finish_run ────► finish run, ship logs, close client
//! ```
//!
//! # Failure Policy
//!
//! Reporting must never fail the test run. Every remote failure is logged by
//! the client and then deliberately dropped here: a run whose start call
//! failed stays inactive for the rest of the process and every later test
//! event becomes local bookkeeping only. The single exception is
//! [`ReportingService::attach_artifact`], which surfaces the fatal
//! [`ReportingFailure::Unsupported`].
//!
//! # Example
//!
//! ```no_run
//! use zebrunner_reporter::api::ZebrunnerClient;
//! use zebrunner_reporter::config::load_config;
//! use zebrunner_reporter::framework::{TestItem, TestReport};
//! use zebrunner_reporter::orchestrator::ReportingService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = load_config(std::path::Path::new("zebrunner.toml"))?;
//!     let client = ZebrunnerClient::from_config(&settings.server)?;
//!     let mut service = ReportingService::new(settings, client);
//!
//!     let item = TestItem::new("tests/test_math.py::test_add");
//!     service.start_run().await;
//!     service.start_test(&TestReport::passed(), &item).await;
//!     service.finish_test(&TestReport::passed(), &item).await;
//!     service.finish_run().await;
//!     Ok(())
//! }
//! ```

pub mod status;

use std::collections::HashSet;
use std::path::Path;

use chrono::{SecondsFormat, TimeDelta, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::models::{
    ArtifactReference, CorrelationData, FinishTest, FinishTestSession, Label, Milestone,
    NotificationTarget, NotificationType, StartTest, StartTestRun, StartTestSession, TestRunConfig,
    TestStatus, now_rfc3339,
};
use crate::api::{ApiResult, ReportingApi, ReportingFailure};
use crate::ci::{CiContextResolver, EnvCiResolver};
use crate::config::{NotificationConfig, Settings};
use crate::context::{ExecutionContext, Run, Session, Test};
use crate::framework::{CollectedItem, TestItem, TestReport};
use crate::logs::LogShipper;

pub use status::{Resolution, resolve_status};

/// Builds notification targets in email, Slack, MS Teams order, skipping
/// channels whose value is empty.
pub fn notification_targets(config: &NotificationConfig) -> Vec<NotificationTarget> {
    [
        (NotificationType::EmailRecipients, &config.emails),
        (NotificationType::SlackChannels, &config.slack_channels),
        (NotificationType::MsTeamsChannels, &config.ms_teams_channels),
    ]
    .into_iter()
    .filter_map(|(kind, value)| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| NotificationTarget {
                kind,
                value: v.to_string(),
            })
    })
    .collect()
}

/// Drops a non-fatal failure after the client has logged it.
fn absorb(operation: &str, failure: ReportingFailure) {
    debug!("{operation} not reported: {failure}");
}

/// The reporting state machine.
///
/// Owns the execution context and the API client for the lifetime of one
/// reporting session. Operations take `&mut self` and are meant to be
/// awaited one at a time, in the order the framework emits events.
pub struct ReportingService<A> {
    settings: Settings,
    api: A,
    context: ExecutionContext,
    ci: Box<dyn CiContextResolver>,
    logs: LogShipper,
}

impl<A: ReportingApi> ReportingService<A> {
    /// Creates a service that resolves the CI context from the process
    /// environment and ships logs through a private buffer.
    pub fn new(settings: Settings, api: A) -> Self {
        Self {
            settings,
            api,
            context: ExecutionContext::new(),
            ci: Box::new(EnvCiResolver::new()),
            logs: LogShipper::new(),
        }
    }

    /// Replaces the CI context resolver.
    pub fn with_ci_resolver(mut self, resolver: impl CiContextResolver + 'static) -> Self {
        self.ci = Box::new(resolver);
        self
    }

    /// Ships logs captured by `shipper` (typically one whose layer is
    /// installed in the global subscriber).
    pub fn with_log_shipper(mut self, shipper: LogShipper) -> Self {
        self.logs = shipper;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn authorize(&mut self) {
        if !self.api.is_authenticated() {
            self.api.authenticate().await;
        }
    }

    /// Starts the run.
    ///
    /// On failure the run stays inactive and every later test event is
    /// handled locally only.
    pub async fn start_run(&mut self) {
        if !self.settings.enabled {
            return;
        }
        self.authorize().await;

        let settings = &self.settings;
        let mut run = Run::new(
            settings.run.display_name.clone(),
            settings.run.environment.clone(),
            settings.run.build.clone(),
        );
        if let Some(milestone) = &settings.milestone {
            run.milestone_id = milestone.id;
            run.milestone_name = milestone.name.clone();
        }

        let mut body = StartTestRun::new(run.name.clone(), run.uuid.clone());
        body.config = Some(TestRunConfig {
            environment: run.environment.clone(),
            build: run.build.clone(),
        });
        body.milestone = settings.milestone.as_ref().map(|m| Milestone {
            id: m.id,
            name: m.name.clone(),
        });
        body.ci_context = self.ci.resolve();
        body.notification_targets = settings.notifications.as_ref().map(notification_targets);

        match self
            .api
            .start_test_run(&self.settings.project_key, &body)
            .await
        {
            Ok(run_id) => {
                info!("Started test run {run_id} ({})", run.name);
                run.server_id = Some(run_id);
            }
            Err(failure) => {
                warn!("Test run was not registered; continuing without reporting");
                absorb("test run start", failure);
            }
        }
        self.context.set_run(run);

        if self.settings.send_logs {
            self.logs.arm();
        }
    }

    /// Records the start of a test.
    ///
    /// If the framework already reports the test as skipped, the test is
    /// finished as `SKIPPED` right away and cleared.
    pub async fn start_test(&mut self, report: &TestReport, item: &TestItem) {
        if !self.settings.enabled {
            return;
        }

        let mut test = Test::new(item.name.clone(), item.source_file());
        test.maintainers = item.metadata.maintainers.clone();
        test.labels = item.metadata.labels.clone();

        if let Some(run_id) = self.context.run_id() {
            let correlation = serde_json::to_string(&CorrelationData {
                name: test.name.clone(),
            })
            .ok();
            let body = StartTest {
                name: test.name.clone(),
                class_name: test.file.clone(),
                method_name: test.name.clone(),
                uuid: test.uuid.clone(),
                started_at: now_rfc3339(),
                correlation_data: correlation,
                maintainer: Some(test.maintainers.join(",")),
                test_case: None,
                labels: test
                    .labels
                    .iter()
                    .map(|(key, value)| Label {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            };

            match self.api.start_test(run_id, &body).await {
                Ok(test_id) => {
                    debug!("Started test {} as {test_id}", test.name);
                    test.server_id = Some(test_id);
                }
                Err(failure) => absorb("test start", failure),
            }
        }

        self.logs.set_test_id(test.server_id);
        self.context.set_test(test);

        if report.is_skipped() {
            if let (Some(run_id), Some(test_id)) = (self.context.run_id(), self.context.test_id()) {
                let reason = item
                    .metadata
                    .skip
                    .as_ref()
                    .and_then(|marker| marker.reason.clone());
                let body = FinishTest::new(TestStatus::Skipped, reason);
                if let Err(failure) = self.api.finish_test(run_id, test_id, &body).await {
                    absorb("test skip", failure);
                }
            }
            self.clear_test();
        }
    }

    /// Records the end of a test with its resolved status.
    ///
    /// The current test is cleared whether or not the call succeeds.
    pub async fn finish_test(&mut self, report: &TestReport, item: &TestItem) {
        if !self.settings.enabled {
            return;
        }

        if let (Some(run_id), Some(test_id)) = (self.context.run_id(), self.context.test_id()) {
            let Resolution { status, reason } =
                resolve_status(report, item.metadata.xfail.as_ref());
            debug!("Finishing test {} as {status:?}", item.name);
            let body = FinishTest::new(status, reason);
            if let Err(failure) = self.api.finish_test(run_id, test_id, &body).await {
                absorb("test finish", failure);
            }
        }
        self.clear_test();
    }

    fn clear_test(&mut self) {
        self.context.clear_test();
        self.logs.set_test_id(None);
    }

    /// Finishes the run, ships captured logs and releases the client.
    pub async fn finish_run(&mut self) {
        if self.settings.enabled {
            if let Some(run_id) = self.context.run_id() {
                let offset = i64::try_from(self.settings.run.finish_offset_ms)
                    .ok()
                    .and_then(TimeDelta::try_milliseconds)
                    .unwrap_or_default();
                let now = Utc::now();
                let ended_at = now
                    .checked_sub_signed(offset)
                    .unwrap_or(now)
                    .to_rfc3339_opts(SecondsFormat::Micros, false);
                match self.api.finish_test_run(run_id, &ended_at).await {
                    Ok(()) => info!("Finished test run {run_id}"),
                    Err(failure) => absorb("test run finish", failure),
                }

                if self.logs.is_armed() {
                    let records = self.logs.drain();
                    if !records.is_empty() {
                        debug!("Shipping {} log records", records.len());
                        if let Err(failure) = self.api.send_logs(run_id, &records).await {
                            absorb("log shipping", failure);
                        }
                    }
                }
            }
            self.context.deactivate_run();
        }

        self.api.close().await;
    }

    /// Starts an environment session grouped under the run and returns its
    /// server id.
    pub async fn start_session(
        &mut self,
        session_id: &str,
        capabilities: Map<String, Value>,
        desired_capabilities: Map<String, Value>,
    ) -> Option<String> {
        if !self.settings.enabled {
            return None;
        }
        let run_id = self.context.run_id()?;

        let mut session = Session {
            session_id: session_id.to_string(),
            desired_capabilities,
            capabilities,
            ..Session::default()
        };
        let body = StartTestSession {
            session_id: session.session_id.clone(),
            started_at: now_rfc3339(),
            desired_capabilities: session.desired_capabilities.clone(),
            capabilities: session.capabilities.clone(),
            test_ids: Vec::new(),
        };

        match self.api.start_test_session(run_id, &body).await {
            Ok(server_id) => {
                session.server_id = Some(server_id.clone());
                self.context.add_session(session);
                Some(server_id)
            }
            Err(failure) => {
                absorb("test session start", failure);
                None
            }
        }
    }

    /// Finishes a session, linking it to the given test ids.
    pub async fn finish_session(&mut self, session_server_id: &str, related_tests: &[String]) {
        if !self.settings.enabled {
            return;
        }
        let Some(run_id) = self.context.run_id() else {
            return;
        };

        if let Some(session) = self.context.session_mut(session_server_id) {
            session.test_ids = related_tests.to_vec();
        }
        let body = FinishTestSession {
            ended_at: now_rfc3339(),
            test_ids: related_tests.to_vec(),
        };
        if let Err(failure) = self
            .api
            .finish_test_session(run_id, session_server_id, &body)
            .await
        {
            absorb("test session finish", failure);
        }
    }

    /// Uploads a screenshot for the current test.
    pub async fn attach_screenshot(&mut self, image: &Path) {
        if !self.settings.enabled {
            return;
        }
        let (Some(run_id), Some(test_id)) = (self.context.run_id(), self.context.test_id()) else {
            return;
        };
        if let Err(failure) = self.api.send_screenshot(run_id, test_id, image).await {
            absorb("screenshot upload", failure);
        }
    }

    /// Attaches artifact references to the run.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`ReportingFailure::Unsupported`] raised by the
    /// client. Non-fatal failures are absorbed like every other call.
    pub async fn attach_artifact(&mut self, artifacts: &[ArtifactReference]) -> ApiResult<()> {
        if !self.settings.enabled {
            return Ok(());
        }
        let Some(run_id) = self.context.run_id() else {
            return Ok(());
        };
        match self.api.send_artifact(run_id, artifacts).await {
            Err(failure) if failure.is_fatal() => Err(failure),
            Err(failure) => {
                absorb("artifact upload", failure);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Narrows collected items to the tests listed for the configured rerun
    /// context.
    ///
    /// Without a rerun context the items are returned unchanged. If the
    /// descriptor cannot be fetched the items are also returned unchanged,
    /// so a reporting outage never silently empties a run.
    pub async fn filter_items<T: CollectedItem>(&mut self, items: Vec<T>) -> Vec<T> {
        if !self.settings.enabled {
            return items;
        }
        let Some(run_context) = self.settings.run.context.clone() else {
            return items;
        };

        self.authorize().await;
        let rerun = match self.api.get_rerun_tests(&run_context).await {
            Ok(rerun) => rerun,
            Err(failure) => {
                warn!("Could not fetch rerun tests ({failure}); running all collected tests");
                return items;
            }
        };

        let names: HashSet<&str> = rerun.correlated_names().collect();
        let before = items.len();
        let kept: Vec<T> = items
            .into_iter()
            .filter(|item| names.contains(item.name()))
            .collect();
        info!("Rerun context selected {} of {before} tests", kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(emails: &str, slack: &str, teams: &str) -> NotificationConfig {
        let value = |s: &str| (!s.is_empty()).then(|| s.to_string());
        NotificationConfig {
            emails: value(emails),
            slack_channels: value(slack),
            ms_teams_channels: value(teams),
        }
    }

    #[test]
    fn test_notification_targets_keep_channel_order() {
        let targets = notification_targets(&channels("qa@example.com", "#qa", "qa-team"));
        let kinds: Vec<NotificationType> = targets.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationType::EmailRecipients,
                NotificationType::SlackChannels,
                NotificationType::MsTeamsChannels,
            ]
        );
        assert_eq!(targets[1].value, "#qa");
    }

    #[test]
    fn test_notification_targets_skip_empty_channels() {
        assert!(notification_targets(&channels("", "", "")).is_empty());

        let targets = notification_targets(&channels("", "#qa", ""));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].kind, NotificationType::SlackChannels);

        let config = NotificationConfig {
            emails: Some(String::new()),
            slack_channels: None,
            ms_teams_channels: Some("teams".into()),
        };
        let targets = notification_targets(&config);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].kind, NotificationType::MsTeamsChannels);
    }
}
