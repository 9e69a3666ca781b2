use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Fired,
    Cancelled,
}

/// Single-shot countdown racing the mechanics' responses. Exactly one of
/// expiry and cancellation wins the state exchange, so a cancel that lands
/// after an accept can never be followed by a stale fallback firing.
pub struct EscalationTimer {
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl EscalationTimer {
    /// Arms the countdown. `fallback` runs once, only if the window elapses
    /// before `cancel` is called.
    pub fn arm<F, Fut>(window: Duration, fallback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(ARMED));
        let flag = state.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if flag
                .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                fallback().await;
            }
        });

        Self { state, task }
    }

    /// Cancels an armed timer. A no-op once the timer has already fired.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.task.abort();
        }
    }

    pub fn state(&self) -> TimerState {
        match self.state.load(Ordering::Acquire) {
            FIRED => TimerState::Fired,
            CANCELLED => TimerState::Cancelled,
            _ => TimerState::Armed,
        }
    }
}

impl Drop for EscalationTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
