//! JSON-lines lifecycle event stream.
//!
//! A framework adapter that cannot link this crate directly can write one
//! event per line and have the `replay` command drive the orchestrator:
//!
//! ```text
//! {"event": "start_run"}
//! {"event": "start_test", "report": {"outcome": "passed"}, "item": {"node_id": "t.py::test_a", "name": "test_a"}}
//! {"event": "finish_test", "report": {"outcome": "failed", "longrepr": "boom"}, "item": {"node_id": "t.py::test_a", "name": "test_a"}}
//! {"event": "finish_run"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ReportingApi;
use crate::framework::{TestItem, TestReport};
use crate::orchestrator::ReportingService;

/// One lifecycle event emitted by the test framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    StartRun,
    StartTest {
        report: TestReport,
        item: TestItem,
    },
    FinishTest {
        report: TestReport,
        item: TestItem,
    },
    StartSession {
        /// Client-side session id; later events refer to the session by it.
        session_id: String,
        #[serde(default)]
        capabilities: Map<String, Value>,
        #[serde(default)]
        desired_capabilities: Map<String, Value>,
    },
    FinishSession {
        session_id: String,
        #[serde(default)]
        related_tests: Vec<String>,
    },
    Screenshot {
        path: PathBuf,
    },
    FinishRun,
}

/// Parses a JSON-lines event stream.
pub fn parse_events(content: &str) -> Result<Vec<LifecycleEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid lifecycle event on line {}", index + 1))
        })
        .collect()
}

/// Counts of what a replay processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub tests: usize,
    pub finished_run: bool,
}

/// Feeds `events` to `service` in order, finishing the run at the end if the
/// stream did not.
pub async fn replay<A: ReportingApi>(
    service: &mut ReportingService<A>,
    events: Vec<LifecycleEvent>,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let mut sessions: HashMap<String, String> = HashMap::new();

    for event in events {
        summary.events += 1;
        match event {
            LifecycleEvent::StartRun => service.start_run().await,
            LifecycleEvent::StartTest { report, item } => {
                summary.tests += 1;
                service.start_test(&report, &item).await;
            }
            LifecycleEvent::FinishTest { report, item } => {
                service.finish_test(&report, &item).await;
            }
            LifecycleEvent::StartSession {
                session_id,
                capabilities,
                desired_capabilities,
            } => {
                if let Some(server_id) = service
                    .start_session(&session_id, capabilities, desired_capabilities)
                    .await
                {
                    sessions.insert(session_id, server_id);
                }
            }
            LifecycleEvent::FinishSession {
                session_id,
                related_tests,
            } => {
                if let Some(server_id) = sessions.get(&session_id) {
                    service.finish_session(server_id, &related_tests).await;
                }
            }
            LifecycleEvent::Screenshot { path } => service.attach_screenshot(&path).await,
            LifecycleEvent::FinishRun => {
                service.finish_run().await;
                summary.finished_run = true;
                break;
            }
        }
    }

    if !summary.finished_run {
        service.finish_run().await;
        summary.finished_run = true;
    }
    summary
}
