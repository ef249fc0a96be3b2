//! Resolution of a test's canonical status.
//!
//! | raw outcome | xfail marker | strict | status  | reason              |
//! |-------------|--------------|--------|---------|---------------------|
//! | passed      | no           | -      | PASSED  | none                |
//! | passed      | yes          | false  | SKIPPED | none                |
//! | passed      | yes          | true   | FAILED  | failure text        |
//! | failed      | no           | -      | FAILED  | failure text        |
//! | failed      | yes          | -      | SKIPPED | marker's reason     |

use crate::api::models::TestStatus;
use crate::framework::{TestReport, XfailMarker};

/// Final status of a test and the reason sent with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: TestStatus,
    pub reason: Option<String>,
}

/// Resolves the status reported when a test finishes.
///
/// Anything other than a pass counts as a failure here; skips are handled
/// when the test starts.
pub fn resolve_status(report: &TestReport, xfail: Option<&XfailMarker>) -> Resolution {
    let failure_text = || Some(report.longrepr.clone());

    match (report.is_passed(), xfail) {
        (true, None) => Resolution {
            status: TestStatus::Passed,
            reason: None,
        },
        (true, Some(marker)) if marker.strict => Resolution {
            status: TestStatus::Failed,
            reason: failure_text(),
        },
        (true, Some(_)) => Resolution {
            status: TestStatus::Skipped,
            reason: None,
        },
        (false, None) => Resolution {
            status: TestStatus::Failed,
            reason: failure_text(),
        },
        (false, Some(marker)) => Resolution {
            status: TestStatus::Skipped,
            reason: marker.reason.clone(),
        },
    }
}
