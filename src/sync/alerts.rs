use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;

/// Outbound emergency messaging seam. Delivery transports (SMS, WhatsApp,
/// push) live behind this; the coordinator only ever fires and forgets.
pub trait EmergencyNotifier: Send + Sync {
    fn notify(&self, contact: &str, message: &str) -> Result<(), AppError>;
}

/// Default notifier: records the outbound message in the log stream.
pub struct LogNotifier;

impl EmergencyNotifier for LogNotifier {
    fn notify(&self, contact: &str, message: &str) -> Result<(), AppError> {
        info!(contact = %contact, message = %message, "emergency alert dispatched");
        Ok(())
    }
}

/// Fans alerts out on a detached task. A failing transport is logged and
/// never surfaces to the caller's flow.
pub fn spawn_alerts(notifier: Arc<dyn EmergencyNotifier>, contacts: Vec<String>, message: String) {
    if contacts.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for contact in contacts {
            if let Err(err) = notifier.notify(&contact, &message) {
                warn!(error = %err, contact = %contact, "emergency alert failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{spawn_alerts, EmergencyNotifier};
    use crate::error::AppError;

    struct FlakyNotifier {
        delivered: AtomicUsize,
    }

    impl EmergencyNotifier for FlakyNotifier {
        fn notify(&self, contact: &str, _message: &str) -> Result<(), AppError> {
            if contact.starts_with("bad") {
                return Err(AppError::Transient("gateway unreachable".to_string()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_transport_never_blocks_the_caller() {
        let notifier = Arc::new(FlakyNotifier {
            delivered: AtomicUsize::new(0),
        });

        spawn_alerts(
            notifier.clone(),
            vec![
                "bad-0000".to_string(),
                "9830000001".to_string(),
                "9830000002".to_string(),
            ],
            "breakdown reported".to_string(),
        );

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(notifier.delivered.load(Ordering::SeqCst), 2);
    }
}
