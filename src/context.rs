//! Execution context: the run, test and session state of one reporting
//! session.
//!
//! The context is plain data. It performs no I/O and never fails; the
//! orchestrator is the only writer. Server identifiers double as the
//! "active" flags: an entity is active while it holds one.
//!
//! ```text
//! Run:  absent ─► started ─┬─► active (server id) ─► finished ─► absent
//!                          └─► inactive (start failed, permanent)
//!
//! Test: absent ─► started ─┬─► skipped at start ─────────────┐
//!                          └─► active ─► finished(status) ───┴─► absent
//! ```

use serde_json::{Map, Value};

use crate::api::models::new_uuid;

/// One test-execution session tracked against the service.
#[derive(Debug, Clone)]
pub struct Run {
    pub name: String,
    pub environment: Option<String>,
    pub build: Option<String>,
    /// Client-generated correlation uuid.
    pub uuid: String,
    /// Server id; absent until the start call succeeds and cleared on finish.
    pub server_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub milestone_name: Option<String>,
}

impl Run {
    pub fn new(name: impl Into<String>, environment: Option<String>, build: Option<String>) -> Self {
        Self {
            name: name.into(),
            environment,
            build,
            uuid: new_uuid(),
            server_id: None,
            milestone_id: None,
            milestone_name: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.server_id.is_some()
    }
}

/// One executed test case.
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    /// Source file or class identifier.
    pub file: String,
    pub maintainers: Vec<String>,
    pub labels: Vec<(String, String)>,
    pub uuid: String,
    pub server_id: Option<i64>,
}

impl Test {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            maintainers: Vec::new(),
            labels: Vec::new(),
            uuid: new_uuid(),
            server_id: None,
        }
    }
}

/// An external environment (browser or device) session grouped under a run.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Client-supplied session id.
    pub session_id: String,
    pub desired_capabilities: Map<String, Value>,
    pub capabilities: Map<String, Value>,
    pub server_id: Option<String>,
    pub test_ids: Vec<String>,
}

/// Current run and test of the process.
///
/// At most one run and one test are tracked. Parallel test execution needs
/// one context per worker and external serialization of the run itself.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    run: Option<Run>,
    test: Option<Test>,
    sessions: Vec<Session>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    pub fn test(&self) -> Option<&Test> {
        self.test.as_ref()
    }

    pub fn run_mut(&mut self) -> Option<&mut Run> {
        self.run.as_mut()
    }

    pub fn test_mut(&mut self) -> Option<&mut Test> {
        self.test.as_mut()
    }

    /// Server id of the active run.
    pub fn run_id(&self) -> Option<i64> {
        self.run.as_ref().and_then(|run| run.server_id)
    }

    /// Server id of the active test. Requires the run to be active too.
    pub fn test_id(&self) -> Option<i64> {
        if !self.run_is_active() {
            return None;
        }
        self.test.as_ref().and_then(|test| test.server_id)
    }

    pub fn run_is_active(&self) -> bool {
        self.run.as_ref().is_some_and(Run::is_active)
    }

    pub fn test_is_active(&self) -> bool {
        self.test_id().is_some()
    }

    pub fn set_run(&mut self, run: Run) {
        self.run = Some(run);
    }

    pub fn set_test(&mut self, test: Test) {
        self.test = Some(test);
    }

    /// Drops the current test, returning it.
    pub fn clear_test(&mut self) -> Option<Test> {
        self.test.take()
    }

    /// Records a session the service acknowledged.
    pub fn add_session(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// Session with the given server id.
    pub fn session_mut(&mut self, server_id: &str) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|session| session.server_id.as_deref() == Some(server_id))
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Marks the run finished. The run stays readable but is no longer active.
    pub fn deactivate_run(&mut self) {
        if let Some(run) = self.run.as_mut() {
            run.server_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_is_inactive() {
        let context = ExecutionContext::new();
        assert!(context.run().is_none());
        assert!(context.test().is_none());
        assert!(!context.run_is_active());
        assert!(!context.test_is_active());
    }

    #[test]
    fn test_test_requires_active_run() {
        let mut context = ExecutionContext::new();
        context.set_run(Run::new("run", None, None));

        let mut test = Test::new("test_a", "test_a");
        test.server_id = Some(10);
        context.set_test(test);
        assert!(!context.test_is_active());

        context.run_mut().unwrap().server_id = Some(1);
        assert!(context.run_is_active());
        assert!(context.test_is_active());
        assert_eq!(context.test_id(), Some(10));

        context.deactivate_run();
        assert!(!context.run_is_active());
        assert!(!context.test_is_active());
        assert!(context.run().is_some());
    }

    #[test]
    fn test_clear_test() {
        let mut context = ExecutionContext::new();
        context.set_test(Test::new("test_a", "file"));
        assert_eq!(context.clear_test().unwrap().name, "test_a");
        assert!(context.test().is_none());
        assert!(context.clear_test().is_none());
    }

    #[test]
    fn test_session_lookup_by_server_id() {
        let mut context = ExecutionContext::new();
        context.add_session(Session {
            session_id: "browser-1".into(),
            server_id: Some("srv-1".into()),
            ..Session::default()
        });
        assert!(context.session_mut("srv-2").is_none());
        context.session_mut("srv-1").unwrap().test_ids.push("7".into());
        assert_eq!(context.sessions()[0].test_ids, vec!["7".to_string()]);
    }

    #[test]
    fn test_correlation_uuids_differ() {
        assert_ne!(Test::new("a", "f").uuid, Test::new("a", "f").uuid);
    }
}
