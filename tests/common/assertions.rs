//! Custom test assertions for integration tests

use std::time::Duration;
use review_batch::{BatchEvent, BatchReport, ErrorKind};
use tokio::sync::broadcast;

/// Assert the report's counts add up and every outcome appears once
pub fn assert_report_consistent(report: &BatchReport) {
    assert_eq!(
        report.succeeded.len() + report.failed.len() + report.partial.len(),
        report.total,
        "outcome lists must add up to total"
    );
    let mut seen = std::collections::HashSet::new();
    for outcome in report.outcomes() {
        assert!(
            seen.insert(outcome.identifier.clone()),
            "{} reported twice",
            outcome.identifier
        );
    }
    assert!(report.total <= report.requested - report.duplicates_removed);
}

/// Failure kinds of the failed list, in report order
pub fn failed_kinds(report: &BatchReport) -> Vec<Option<ErrorKind>> {
    report.failed.iter().map(|o| o.status.error_kind()).collect()
}

/// Drain events until `BatchFinished` or the timeout elapses
pub async fn collect_events(
    events: &mut broadcast::Receiver<BatchEvent>,
    timeout: Duration,
) -> Vec<BatchEvent> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = matches!(event, BatchEvent::BatchFinished { .. });
                    seen.push(event);
                    if finished {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    seen
}
