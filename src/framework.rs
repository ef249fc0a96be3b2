//! Typed test-framework adapter values.
//!
//! A framework adapter (e.g. a pytest plugin) translates its native items,
//! markers and reports into these plain values once, at collection or report
//! time. The orchestrator never looks at framework-native objects.
//!
//! # Marker mapping
//!
//! | Framework marker | Field |
//! |------------------|-------|
//! | `maintainer(name)` | [`TestMetadata::maintainers`], one per marker |
//! | `label(key, value)` | [`TestMetadata::labels`], one per marker |
//! | `skip(reason=...)` | [`TestMetadata::skip`], first marker only |
//! | `xfail(reason=..., strict=...)` | [`TestMetadata::xfail`], first marker only |

use serde::{Deserialize, Serialize};

/// Anything collected by the framework that has a display name.
///
/// Lets rerun filtering work on the adapter's own item type.
pub trait CollectedItem {
    fn name(&self) -> &str;
}

/// The first `skip` marker on an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipMarker {
    #[serde(default)]
    pub reason: Option<String>,
}

/// The first `xfail` (expected failure) marker on an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XfailMarker {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub strict: bool,
}

/// Marker data for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMetadata {
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub labels: Vec<(String, String)>,
    #[serde(default)]
    pub skip: Option<SkipMarker>,
    #[serde(default)]
    pub xfail: Option<XfailMarker>,
}

/// A collected test item.
///
/// # Example
///
/// ```
/// use zebrunner_reporter::framework::TestItem;
///
/// let item = TestItem::new("tests/test_math.py::test_add")
///     .with_maintainer("alice")
///     .with_label("priority", "high");
/// assert_eq!(item.name, "test_add");
/// assert_eq!(item.source_file(), "test_add");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestItem {
    /// Fully qualified node id, e.g. `tests/test_math.py::TestAdd::test_ints`.
    pub node_id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub metadata: TestMetadata,
}

impl TestItem {
    /// Creates an item whose name is the last `::` segment of `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let name = node_id
            .rsplit("::")
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| node_id.clone());
        Self {
            node_id,
            name,
            metadata: TestMetadata::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.metadata.maintainers.push(maintainer.into());
        self
    }

    pub fn with_label(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.metadata
            .labels
            .push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_skip(mut self, reason: Option<&str>) -> Self {
        self.metadata.skip = Some(SkipMarker {
            reason: reason.map(str::to_string),
        });
        self
    }

    pub fn with_xfail(mut self, reason: Option<&str>, strict: bool) -> Self {
        self.metadata.xfail = Some(XfailMarker {
            reason: reason.map(str::to_string),
            strict,
        });
        self
    }

    /// Source identifier reported as the test's class name: the second
    /// `::` segment of the node id, or the whole node id if there is none.
    pub fn source_file(&self) -> &str {
        self.node_id.split("::").nth(1).unwrap_or(&self.node_id)
    }
}

impl CollectedItem for TestItem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Raw outcome the framework reports for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Framework report for one phase of a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub outcome: Outcome,

    /// Full failure text captured by the framework. Empty when the phase
    /// produced none.
    #[serde(default)]
    pub longrepr: String,
}

impl TestReport {
    pub fn passed() -> Self {
        Self {
            outcome: Outcome::Passed,
            longrepr: String::new(),
        }
    }

    pub fn failed(longrepr: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            longrepr: longrepr.into(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            outcome: Outcome::Skipped,
            longrepr: String::new(),
        }
    }

    pub fn with_longrepr(mut self, longrepr: impl Into<String>) -> Self {
        self.longrepr = longrepr.into();
        self
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }
}
