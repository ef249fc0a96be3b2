//! CI environment detection.
//!
//! The resolved [`CiContext`] is attached to the run once, at run start.

use std::collections::HashMap;

use crate::api::models::CiContext;

/// Produces the CI context of the current process, if it runs under CI.
pub trait CiContextResolver: Send + Sync {
    fn resolve(&self) -> Option<CiContext>;
}

/// A CI system recognised by a marker variable.
struct CiKind {
    ci_type: &'static str,
    marker: &'static str,
    prefixes: &'static [&'static str],
}

const KNOWN_CI: &[CiKind] = &[
    CiKind {
        ci_type: "GITHUB_ACTIONS",
        marker: "GITHUB_ACTIONS",
        prefixes: &["GITHUB_", "RUNNER_"],
    },
    CiKind {
        ci_type: "GITLAB_CI",
        marker: "GITLAB_CI",
        prefixes: &["CI_", "GITLAB_"],
    },
    CiKind {
        ci_type: "JENKINS",
        marker: "JENKINS_URL",
        prefixes: &["JENKINS_", "BUILD_", "JOB_", "GIT_", "NODE_"],
    },
    CiKind {
        ci_type: "TEAM_CITY",
        marker: "TEAMCITY_VERSION",
        prefixes: &["TEAMCITY_", "BUILD_"],
    },
    CiKind {
        ci_type: "CIRCLE_CI",
        marker: "CIRCLECI",
        prefixes: &["CIRCLE_"],
    },
    CiKind {
        ci_type: "TRAVIS_CI",
        marker: "TRAVIS",
        prefixes: &["TRAVIS_"],
    },
    CiKind {
        ci_type: "BAMBOO",
        marker: "bamboo_buildKey",
        prefixes: &["bamboo_"],
    },
];

/// Detects the CI system from environment variables.
///
/// The first system whose marker variable is set wins; all variables with
/// one of that system's prefixes are collected.
pub struct EnvCiResolver {
    vars: Box<dyn Fn() -> Vec<(String, String)> + Send + Sync>,
}

impl EnvCiResolver {
    /// Reads the process environment.
    pub fn new() -> Self {
        Self {
            vars: Box::new(|| std::env::vars().collect()),
        }
    }

    /// Reads a fixed set of variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: Box::new(move || vars.clone()),
        }
    }
}

impl Default for EnvCiResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CiContextResolver for EnvCiResolver {
    fn resolve(&self) -> Option<CiContext> {
        let vars = (self.vars)();
        let kind = KNOWN_CI
            .iter()
            .find(|kind| vars.iter().any(|(key, _)| key == kind.marker))?;

        let env_variables: HashMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| {
                key == kind.marker || kind.prefixes.iter().any(|p| key.starts_with(p))
            })
            .collect();

        Some(CiContext {
            ci_type: kind.ci_type.to_string(),
            env_variables,
        })
    }
}

/// Resolver for processes that never report a CI context.
pub struct NoCiContext;

impl CiContextResolver for NoCiContext {
    fn resolve(&self) -> Option<CiContext> {
        None
    }
}
