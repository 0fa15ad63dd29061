//! Races a generation future against a heartbeat timer, a cancellation
//! token, and an overall deadline, so every [`LlmBackend`](crate::LlmBackend)
//! implementation gets the same heartbeat/cancellation contract for free.

use crate::backend::ProviderEvent;
use crate::error::LlmError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Drives `fut` to completion, emitting `Heartbeat` events on `on_event`
/// every `heartbeat_interval` while it is outstanding, returning
/// `LlmError::Cancelled` if `cancel` fires first and `LlmError::Timeout` if
/// `timeout` elapses first. Exactly one `Done` event is emitted, always
/// last, regardless of which arm wins.
pub async fn run_with_heartbeat<F, T>(
    fut: F,
    timeout: Duration,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
    on_event: &(dyn Fn(ProviderEvent) + Send + Sync),
) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    let start = Instant::now();
    let mut interval = tokio::time::interval(heartbeat_interval);
    interval.tick().await; // first tick fires immediately; consume it

    tokio::pin!(fut);

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        tokio::select! {
            result = &mut fut => {
                on_event(ProviderEvent::Done { elapsed_secs: start.elapsed().as_secs_f64() });
                return result;
            }
            () = cancel.cancelled() => {
                let elapsed = start.elapsed().as_secs_f64();
                on_event(ProviderEvent::Done { elapsed_secs: elapsed });
                return Err(LlmError::Cancelled { elapsed_secs: elapsed });
            }
            () = tokio::time::sleep(remaining) => {
                let elapsed = start.elapsed().as_secs_f64();
                on_event(ProviderEvent::Done { elapsed_secs: elapsed });
                return Err(LlmError::Timeout { elapsed_secs: elapsed });
            }
            _ = interval.tick() => {
                on_event(ProviderEvent::Heartbeat { elapsed_secs: start.elapsed().as_secs_f64() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn events_sink() -> (Arc<Mutex<Vec<ProviderEvent>>>, impl Fn(ProviderEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink = move |event: ProviderEvent| sink_events.lock().unwrap().push(event);
        (events, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_before_timeout_emits_single_done() {
        let (events, sink) = events_sink();
        let cancel = CancellationToken::new();
        let fut = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, LlmError>(42)
        };

        let result = run_with_heartbeat(
            fut,
            Duration::from_secs(5),
            Duration::from_secs(1),
            cancel,
            &sink,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProviderEvent::Done { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_and_reports_elapsed() {
        let (events, sink) = events_sink();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel_clone.cancel();
        });

        let fut = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, LlmError>(())
        };

        let result = run_with_heartbeat(
            fut,
            Duration::from_secs(5),
            Duration::from_secs(1),
            cancel,
            &sink,
        )
        .await;

        assert!(matches!(result, Err(LlmError::Cancelled { .. })));
        assert!(events.lock().unwrap().iter().any(|e| matches!(e, ProviderEvent::Done { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_over_slow_future() {
        let (_, sink) = events_sink();
        let cancel = CancellationToken::new();
        let fut = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, LlmError>(())
        };

        let result = run_with_heartbeat(
            fut,
            Duration::from_millis(50),
            Duration::from_secs(1),
            cancel,
            &sink,
        )
        .await;

        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }
}
