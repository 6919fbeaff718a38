//! Consolidated periodic task scheduler.
//!
//! All recurring governance work (peer rotation, resource re-evaluation,
//! stats sampling and flushing, cleanup, identity rotation) runs as named
//! interval tasks issuing ticks into the coordinator's internal channel.
//! Each task is independently cancellable; all are aborted on shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

struct NamedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the periodic tasks of one coordinator instance.
///
/// Aborts every remaining task on drop so a dead coordinator never leaves
/// timers running.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: Vec<NamedTask>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a named periodic task. The closure runs once per period and
    /// returns false to end the task (typically when its channel closed).
    pub fn spawn_periodic<F>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so tasks run one
            // full period after startup.
            interval.tick().await;

            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
            tracing::debug!("Periodic task '{name}' ended");
        });

        self.tasks.push(NamedTask { name, handle });
    }

    /// Cancels a task by name; returns whether it existed.
    pub fn cancel(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| {
            if task.name == name {
                task.handle.abort();
                false
            } else {
                true
            }
        });
        before != self.tasks.len()
    }

    /// Names of tasks still scheduled.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.name).collect()
    }

    /// Aborts every task.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.handle.abort();
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn periodic_task_ticks_until_cancelled() {
        let mut scheduler = TaskScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = ticks.clone();
        scheduler.spawn_periodic("tick-counter", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.cancel("tick-counter"));

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn task_ends_when_closure_returns_false() {
        let mut scheduler = TaskScheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = ticks.clone();
        scheduler.spawn_periodic("one-shot", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_aborts_all_tasks() {
        let mut scheduler = TaskScheduler::new();
        scheduler.spawn_periodic("a", Duration::from_secs(60), || true);
        scheduler.spawn_periodic("b", Duration::from_secs(60), || true);

        assert_eq!(scheduler.task_names().len(), 2);
        scheduler.shutdown();
        assert!(scheduler.task_names().is_empty());
    }
}
