//! zebrunner-reporter: reports test-framework lifecycle events to a
//! Zebrunner-compatible test reporting service.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Orchestrator**: The reporting state machine driven by lifecycle events
//! - **Context**: Current run, test and session, plus their server ids
//! - **API**: Authenticated HTTP client with log-and-degrade failure handling
//! - **Framework**: Typed items, markers and reports supplied by the adapter
//! - **Logs**: Capture of `tracing` events, shipped when the run finishes
//!
//! # Example
//!
//! ```no_run
//! use zebrunner_reporter::api::ZebrunnerClient;
//! use zebrunner_reporter::config::load_config;
//! use zebrunner_reporter::orchestrator::ReportingService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = load_config(std::path::Path::new("zebrunner.toml"))?;
//!     let client = ZebrunnerClient::from_config(&settings.server)?;
//!     let mut service = ReportingService::new(settings, client);
//!     service.start_run().await;
//!     // ... forward test events ...
//!     service.finish_run().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod ci;
pub mod config;
pub mod context;
pub mod events;
pub mod framework;
pub mod logs;
pub mod orchestrator;

// Re-export commonly used types
pub use api::{ApiResult, ReportingApi, ReportingFailure, ZebrunnerClient};
pub use config::{Settings, load_config};
pub use context::ExecutionContext;
pub use framework::{TestItem, TestReport};
pub use orchestrator::ReportingService;
