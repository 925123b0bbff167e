use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::warn;

use crate::events::{CaptureEvent, EventBus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub poll_interval: Duration,
    pub stale_threshold: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

/// One-shot staleness alarm for push delivery. Fires a single `SyncTimeout` the first time
/// no push has been seen for `stale_threshold`, then stops.
pub struct TimeoutMonitor {
    last_update: Arc<Mutex<Instant>>,
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TimeoutMonitor {
    pub fn start(timing: MonitorTiming, events: EventBus) -> Self {
        let poll_interval = timing.poll_interval.max(Duration::from_millis(1));
        let last_update = Arc::new(Mutex::new(Instant::now()));
        let fired = Arc::new(AtomicBool::new(false));

        let task_last_update = Arc::clone(&last_update);
        let task_fired = Arc::clone(&fired);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let elapsed = task_last_update.lock().await.elapsed();
                if elapsed >= timing.stale_threshold {
                    task_fired.store(true, Ordering::SeqCst);
                    warn!(
                        elapsed_secs = elapsed.as_secs(),
                        threshold_secs = timing.stale_threshold.as_secs(),
                        "capture: push updates stalled"
                    );
                    events.publish(CaptureEvent::SyncTimeout { elapsed });
                    break;
                }
            }
        });

        Self {
            last_update,
            fired,
            task,
        }
    }

    /// Records a push delivery, restarting the staleness window.
    pub async fn touch(&self) {
        *self.last_update.lock().await = Instant::now();
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for TimeoutMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
