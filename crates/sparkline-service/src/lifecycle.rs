//! Service lifetime.
//!
//! The service keeps answering queries after every collector has finished.
//! It stops on the first fault of a long-lived task or on shutdown.

use std::future::Future;

use tracing::{info, warn};

use crate::collector::CollectorError;

/// Drive the service until it faults or is asked to stop.
///
/// - `collectors` resolves once every device worker has ended. A fatal
///   collector fault is returned; clean completion leaves the service running.
/// - `faults` resolves with the first failure of a surface that must stay up
///   (bus connections, HTTP server, signal forwarder).
/// - `shutdown` resolves when the service should stop cleanly.
pub async fn run_until_stopped<C, F, S>(
    collectors: C,
    faults: F,
    shutdown: S,
) -> anyhow::Result<()>
where
    C: Future<Output = Result<(), CollectorError>>,
    F: Future<Output = anyhow::Error>,
    S: Future<Output = ()>,
{
    tokio::pin!(collectors, faults, shutdown);
    let mut collectors_done = false;

    loop {
        tokio::select! {
            outcome = &mut collectors, if !collectors_done => {
                outcome?;
                collectors_done = true;
                warn!("All collectors finished, serving queries only");
            }
            fault = &mut faults => return Err(fault),
            () = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fault_after_collectors_finish_is_reported() {
        let faults = async {
            sleep(Duration::from_millis(50)).await;
            anyhow::anyhow!("HTTP server stopped")
        };

        let result = timeout(
            WAIT,
            run_until_stopped(
                async { Ok::<(), CollectorError>(()) },
                faults,
                pending::<()>(),
            ),
        )
        .await
        .unwrap();

        assert_eq!(result.unwrap_err().to_string(), "HTTP server stopped");
    }

    #[tokio::test]
    async fn test_shutdown_after_collectors_finish() {
        let shutdown = async {
            sleep(Duration::from_millis(50)).await;
        };

        let result = timeout(
            WAIT,
            run_until_stopped(
                async { Ok::<(), CollectorError>(()) },
                pending::<anyhow::Error>(),
                shutdown,
            ),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fatal_collector_fault_stops_service() {
        let collectors = async {
            Err::<(), _>(CollectorError::Store(sparkline_store::Error::Io(
                std::io::Error::other("disk gone"),
            )))
        };

        let result = timeout(
            WAIT,
            run_until_stopped(collectors, pending::<anyhow::Error>(), pending::<()>()),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }

    #[tokio::test]
    async fn test_keeps_running_while_nothing_fails() {
        let result = timeout(
            Duration::from_millis(100),
            run_until_stopped(
                async { Ok::<(), CollectorError>(()) },
                pending::<anyhow::Error>(),
                pending::<()>(),
            ),
        )
        .await;

        assert!(result.is_err(), "service stopped without a fault");
    }
}
