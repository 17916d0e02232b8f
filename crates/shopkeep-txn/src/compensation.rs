// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs compensation actions after a definitive failure.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use shopkeep_core::panic_message;

use crate::options::Compensation;
use crate::result::CompensationReport;

/// Run every compensation in order. A failing or panicking action is
/// recorded and logged; it never stops the ones after it.
pub(crate) async fn run_compensations(
    compensations: &[Compensation],
    log_enabled: bool,
) -> Vec<CompensationReport> {
    let mut reports = Vec::with_capacity(compensations.len());
    for compensation in compensations {
        let name = compensation.name();
        let outcome = AssertUnwindSafe(compensation.invoke()).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(())) => {
                if log_enabled {
                    debug!(compensation = name, "compensation succeeded");
                }
                None
            }
            Ok(Err(e)) => {
                warn!(compensation = name, error = %e, "compensation failed");
                Some(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(compensation = name, panic = %message, "compensation panicked");
                Some(format!("compensation panicked: {message}"))
            }
        };
        reports.push(CompensationReport {
            name: name.to_string(),
            error,
        });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use shopkeep_core::ShopkeepError;
    use tracing_test::traced_test;

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Compensation {
        let log = Arc::clone(log);
        Compensation::new(name, move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok(())
            }
        })
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_do_not_stop_later_compensations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let compensations = vec![
            recording("first", &log),
            Compensation::new("broken", || async {
                Err(ShopkeepError::execution("gateway unavailable"))
            }),
            Compensation::new("exploding", || async {
                let explode = true;
                if explode {
                    panic!("kaboom");
                }
                Ok(())
            }),
            recording("last", &log),
        ];

        let reports = run_compensations(&compensations, true).await;

        assert_eq!(*log.lock().unwrap(), ["first", "last"]);
        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["first", "broken", "exploding", "last"]);
        assert!(reports[0].error.is_none());
        assert!(
            reports[1]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("gateway unavailable"))
        );
        assert!(
            reports[2]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("kaboom"))
        );
        assert!(logs_contain("compensation failed"));
        assert!(logs_contain("compensation panicked"));
    }
}
