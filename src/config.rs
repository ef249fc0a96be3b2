//! Configuration loading and schema definitions for the reporter.
//!
//! Settings come from a TOML file and can be overridden per-variable from the
//! environment, which is how CI jobs usually inject the access token and the
//! rerun context without touching the checked-in file.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result, bail};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "REPORTING_";

/// Loads settings from a TOML file and applies environment overrides.
///
/// A leading `~` in the path is expanded to the home directory.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - An environment override cannot be parsed (e.g., a non-numeric milestone id)
///
/// # Example
///
/// ```no_run
/// use zebrunner_reporter::config::load_config;
/// use std::path::Path;
///
/// let settings = load_config(Path::new("zebrunner.toml"))?;
/// println!("Project: {}", settings.project_key);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Settings> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(&expanded)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    settings.apply_env(|key| std::env::var(key).ok())?;

    Ok(settings)
}

/// Loads settings from a TOML string. No environment overrides are applied.
///
/// # Example
///
/// ```
/// use zebrunner_reporter::config::load_config_str;
///
/// let settings = load_config_str(r#"
///     project_key = "WEB"
///
///     [server]
///     hostname = "https://example.zebrunner.com"
///     access_token = "token"
/// "#)?;
///
/// assert_eq!(settings.project_key, "WEB");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content).context("Failed to parse config")?;

    Ok(settings)
}

impl Settings {
    /// Overrides fields from `REPORTING_*` variables returned by `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(value) = get("ENABLED") {
            self.enabled = parse_bool("ENABLED", &value)?;
        }
        if let Some(value) = get("PROJECT_KEY") {
            self.project_key = value;
        }
        if let Some(value) = get("SEND_LOGS") {
            self.send_logs = parse_bool("SEND_LOGS", &value)?;
        }

        if let Some(value) = get("SERVER_HOSTNAME") {
            self.server.hostname = Some(value);
        }
        if let Some(value) = get("SERVER_ACCESS_TOKEN") {
            self.server.access_token = Some(value);
        }

        if let Some(value) = get("RUN_DISPLAY_NAME") {
            self.run.display_name = value;
        }
        if let Some(value) = get("RUN_ENVIRONMENT") {
            self.run.environment = Some(value);
        }
        if let Some(value) = get("RUN_BUILD") {
            self.run.build = Some(value);
        }
        if let Some(value) = get("RUN_CONTEXT") {
            self.run.context = Some(value);
        }

        let milestone_id = get("MILESTONE_ID");
        let milestone_name = get("MILESTONE_NAME");
        if milestone_id.is_some() || milestone_name.is_some() {
            let milestone = self.milestone.get_or_insert_with(MilestoneConfig::default);
            if let Some(value) = milestone_id {
                milestone.id = Some(value.trim().parse().with_context(|| {
                    format!("{ENV_PREFIX}MILESTONE_ID must be an integer, got {value:?}")
                })?);
            }
            if let Some(value) = milestone_name {
                milestone.name = Some(value);
            }
        }

        let emails = get("NOTIFICATION_EMAILS");
        let slack = get("NOTIFICATION_SLACK_CHANNELS");
        let teams = get("NOTIFICATION_MS_TEAMS_CHANNELS");
        if emails.is_some() || slack.is_some() || teams.is_some() {
            let notifications = self
                .notifications
                .get_or_insert_with(NotificationConfig::default);
            if emails.is_some() {
                notifications.emails = emails;
            }
            if slack.is_some() {
                notifications.slack_channels = slack;
            }
            if teams.is_some() {
                notifications.ms_teams_channels = teams;
            }
        }

        Ok(())
    }

    /// Checks that an enabled configuration can reach the service.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.server.hostname.as_deref().is_none_or(str::is_empty) {
            bail!("server.hostname is required when reporting is enabled");
        }
        if self.server.access_token.as_deref().is_none_or(str::is_empty) {
            bail!("server.access_token is required when reporting is enabled");
        }
        if self.project_key.trim().is_empty() {
            bail!("project_key must not be empty");
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{ENV_PREFIX}{name} must be a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        let settings = load_config_str(
            r#"
            [server]
            hostname = "https://example.zebrunner.com"
            access_token = "token"
            "#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert!(settings.send_logs);
        assert_eq!(settings.project_key, "DEF");
        assert_eq!(settings.run.display_name, "Unnamed");
        assert_eq!(settings.run.finish_offset_ms, 1000);
        assert!(settings.milestone.is_none());
        assert!(settings.notifications.is_none());
        settings.validate().unwrap();
    }

    #[test]
    fn test_full_file() {
        let settings = load_config_str(
            r##"
            project_key = "WEB"
            send_logs = false

            [server]
            hostname = "https://example.zebrunner.com/"
            access_token = "token"

            [run]
            display_name = "Nightly"
            environment = "staging"
            build = "1.2.3"
            context = "{\"id\":\"abc\"}"
            finish_offset_ms = 0

            [milestone]
            id = 7
            name = "Release 1"

            [notifications]
            emails = "qa@example.com"
            slack_channels = "#qa"
            "##,
        )
        .unwrap();

        assert_eq!(settings.project_key, "WEB");
        assert!(!settings.send_logs);
        assert_eq!(settings.run.environment.as_deref(), Some("staging"));
        assert_eq!(settings.run.context.as_deref(), Some("{\"id\":\"abc\"}"));
        assert_eq!(settings.run.finish_offset_ms, 0);
        let milestone = settings.milestone.unwrap();
        assert_eq!(milestone.id, Some(7));
        let notifications = settings.notifications.unwrap();
        assert_eq!(notifications.slack_channels.as_deref(), Some("#qa"));
        assert!(notifications.ms_teams_channels.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env(lookup(&[
                ("REPORTING_SERVER_HOSTNAME", "https://ci.zebrunner.com"),
                ("REPORTING_SERVER_ACCESS_TOKEN", "secret"),
                ("REPORTING_SEND_LOGS", "false"),
                ("REPORTING_RUN_CONTEXT", "ctx"),
                ("REPORTING_MILESTONE_ID", "42"),
                ("REPORTING_NOTIFICATION_SLACK_CHANNELS", "#ci"),
                ("REPORTING_RUN_BUILD", "   "),
            ]))
            .unwrap();

        assert_eq!(
            settings.server.hostname.as_deref(),
            Some("https://ci.zebrunner.com")
        );
        assert!(!settings.send_logs);
        assert_eq!(settings.run.context.as_deref(), Some("ctx"));
        assert_eq!(settings.milestone.unwrap().id, Some(42));
        assert_eq!(
            settings.notifications.unwrap().slack_channels.as_deref(),
            Some("#ci")
        );
        assert!(settings.run.build.is_none());
    }

    #[test]
    fn test_env_override_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(
            settings
                .apply_env(lookup(&[("REPORTING_ENABLED", "maybe")]))
                .is_err()
        );
        assert!(
            settings
                .apply_env(lookup(&[("REPORTING_MILESTONE_ID", "seven")]))
                .is_err()
        );
    }

    #[test]
    fn test_validate_requires_credentials() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let disabled = Settings {
            enabled: false,
            ..Settings::default()
        };
        disabled.validate().unwrap();
    }
}
