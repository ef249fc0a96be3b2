//! Configuration schema definitions for the reporter.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. Every section except `[server]` is optional and
//! falls back to the defaults documented on each type.
//!
//! # Schema Overview
//!
//! ```text
//! Settings (root)
//! ├── enabled / project_key / send_logs
//! ├── ServerConfig           - Reporting service hostname and refresh token
//! ├── RunConfig              - Display name, environment, build, rerun context
//! ├── MilestoneConfig        - Optional milestone the run is attached to
//! └── NotificationConfig     - Optional email / Slack / MS Teams targets
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration structure for the reporter.
///
/// # TOML Structure
///
/// ```toml
/// enabled = true
/// project_key = "WEB"
/// send_logs = true
///
/// [server]
/// hostname = "https://mycompany.zebrunner.com"
/// access_token = "refresh-token"
///
/// [run]
/// display_name = "Nightly regression"
/// environment = "staging"
/// build = "1.4.2"
///
/// [milestone]
/// id = 12
/// name = "Release 1.4"
///
/// [notifications]
/// emails = "qa@example.com"
/// slack_channels = "#qa-reports"
/// ```
///
/// # Example
///
/// ```
/// use zebrunner_reporter::config::Settings;
///
/// let settings: Settings = toml::from_str(r#"
///     [server]
///     hostname = "https://example.zebrunner.com"
///     access_token = "token"
/// "#).unwrap();
/// assert_eq!(settings.project_key, "DEF");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Master switch. When false every reporting operation is a no-op.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Project the run is reported under.
    ///
    /// Default: `DEF`
    #[serde(default = "default_project_key")]
    pub project_key: String,

    /// Capture log records during the run and ship them when it finishes.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub send_logs: bool,

    /// Reporting service connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Run identification settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Milestone the run belongs to, if any.
    #[serde(default)]
    pub milestone: Option<MilestoneConfig>,

    /// Notification targets, if any.
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            project_key: default_project_key(),
            send_logs: true,
            server: ServerConfig::default(),
            run: RunConfig::default(),
            milestone: None,
            notifications: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_project_key() -> String {
    "DEF".to_string()
}

/// Reporting service connection settings.
///
/// Both values are required for reporting to reach the service. When either
/// is missing the client never authenticates and every remote call is
/// rejected by the service (and logged).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL of the service, e.g. `https://mycompany.zebrunner.com`.
    pub hostname: Option<String>,

    /// Long-lived refresh token exchanged for a bearer credential.
    pub access_token: Option<String>,
}

/// Run identification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Display name of the run.
    ///
    /// Default: `Unnamed`
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Environment label, e.g. `staging`.
    pub environment: Option<String>,

    /// Build label, e.g. `1.4.2`.
    pub build: Option<String>,

    /// Rerun-context token. When set, collection is narrowed to the tests
    /// the service lists for this token.
    pub context: Option<String>,

    /// Milliseconds subtracted from "now" when stamping the end of a run.
    ///
    /// Default: 1000
    #[serde(default = "default_finish_offset_ms")]
    pub finish_offset_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            environment: None,
            build: None,
            context: None,
            finish_offset_ms: default_finish_offset_ms(),
        }
    }
}

fn default_display_name() -> String {
    "Unnamed".to_string()
}

fn default_finish_offset_ms() -> u64 {
    1000
}

/// Milestone the run is attached to.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MilestoneConfig {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// Notification channels.
///
/// Each value is passed to the service verbatim; an empty or missing value
/// means the channel is not notified.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Comma-separated email recipients.
    pub emails: Option<String>,

    /// Comma-separated Slack channels.
    pub slack_channels: Option<String>,

    /// Comma-separated Microsoft Teams channels.
    pub ms_teams_channels: Option<String>,
}
