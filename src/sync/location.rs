use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::error::AppError;
use crate::geo::{ensure_finite, haversine_km};
use crate::models::mechanic::GeoPoint;

/// Device geolocation seam. The platform's positioning stack sits behind
/// this; tests script it.
pub trait LocationProvider: Send + Sync {
    fn current_position(&self) -> BoxFuture<'_, Result<GeoPoint, AppError>>;
}

/// Acquires one fix with a hard deadline. A stalled positioning stack
/// surfaces as `Timeout` instead of hanging the caller.
pub async fn acquire_position<P: LocationProvider>(
    provider: &P,
    timeout: Duration,
) -> Result<GeoPoint, AppError> {
    let position = tokio::time::timeout(timeout, provider.current_position())
        .await
        .map_err(|_| {
            AppError::Timeout(format!("no position fix within {}s", timeout.as_secs()))
        })??;
    ensure_finite(&position)?;
    Ok(position)
}

pub struct WatchHandle {
    stop: watch::Sender<bool>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }
}

/// Samples the provider on a cadence and emits a fix only when the device
/// moved at least `distance_filter_km` since the last emission. Cancelling
/// the handle stops the feed; an in-flight sample is dropped, not emitted.
pub fn watch_position<P>(
    provider: Arc<P>,
    sample_every: Duration,
    distance_filter_km: f64,
) -> (ReceiverStream<GeoPoint>, WatchHandle)
where
    P: LocationProvider + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut last_emitted: Option<GeoPoint> = None;
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(sample_every) => {}
            }

            let fix = tokio::select! {
                _ = stop_rx.changed() => break,
                fix = provider.current_position() => fix,
            };

            let fix = match fix {
                Ok(fix) if fix.is_finite() => fix,
                Ok(_) => continue,
                Err(err) => {
                    warn!(error = %err, "position sample failed");
                    continue;
                }
            };

            let moved_km = last_emitted
                .map(|prev| haversine_km(&prev, &fix))
                .unwrap_or(f64::MAX);
            if moved_km >= distance_filter_km {
                if tx.send(fix).await.is_err() {
                    break;
                }
                last_emitted = Some(fix);
            }
        }
    });

    (ReceiverStream::new(rx), WatchHandle { stop: stop_tx })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use tokio_stream::StreamExt;

    use super::{acquire_position, watch_position, LocationProvider};
    use crate::error::AppError;
    use crate::models::mechanic::GeoPoint;

    struct ScriptedProvider {
        fixes: Mutex<VecDeque<GeoPoint>>,
        last: GeoPoint,
        hang: bool,
    }

    impl LocationProvider for ScriptedProvider {
        fn current_position(&self) -> BoxFuture<'_, Result<GeoPoint, AppError>> {
            Box::pin(async move {
                if self.hang {
                    futures::future::pending::<()>().await;
                }
                Ok(self.fixes.lock().unwrap().pop_front().unwrap_or(self.last))
            })
        }
    }

    fn point(lat: f64) -> GeoPoint {
        GeoPoint { lat, lng: 72.49 }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out() {
        let provider = ScriptedProvider {
            fixes: Mutex::new(VecDeque::new()),
            last: point(22.99),
            hang: true,
        };

        let err = acquire_position(&provider, Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn fast_provider_returns_the_fix() {
        let provider = ScriptedProvider {
            fixes: Mutex::new(VecDeque::from([point(22.99)])),
            last: point(22.99),
            hang: false,
        };

        let fix = acquire_position(&provider, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(fix.lat, 22.99);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_only_on_meaningful_movement_and_stops_on_cancel() {
        // Second fix barely moves, third jumps ~11 km.
        let provider = Arc::new(ScriptedProvider {
            fixes: Mutex::new(VecDeque::from([point(22.99), point(22.9901), point(23.09)])),
            last: point(23.09),
            hang: false,
        });

        let (mut stream, handle) =
            watch_position(provider, Duration::from_secs(1), 0.5);

        let first = stream.next().await.unwrap();
        assert_eq!(first.lat, 22.99);

        let second = stream.next().await.unwrap();
        assert_eq!(second.lat, 23.09);

        handle.cancel();
        assert!(stream.next().await.is_none());
    }
}
