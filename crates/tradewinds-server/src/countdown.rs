//! Best-effort per-room countdown broadcasts.
//!
//! A countdown is a side loop, never part of the phase machine. Starting one replaces any
//! running countdown for the room; stopping aborts the task.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Countdowns {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Countdowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `on_tick` with `seconds, seconds - 1, ..., 0`, one call per `tick`.
    pub async fn start<F, Fut>(&self, room: &str, seconds: u32, tick: Duration, on_tick: F)
    where
        F: Fn(u32) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            for remaining in (0..=seconds).rev() {
                interval.tick().await;
                on_tick(remaining).await;
            }
        });

        let previous = self.tasks.lock().await.insert(room.to_string(), handle);
        if let Some(previous) = previous {
            previous.abort();
            debug!(room, "replaced running countdown");
        }
    }

    /// Abort the room's countdown. Returns false when none was running.
    pub async fn stop(&self, room: &str) -> bool {
        match self.tasks.lock().await.remove(room) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    pub async fn is_running(&self, room: &str) -> bool {
        self.tasks
            .lock()
            .await
            .get(room)
            .is_some_and(|h| !h.is_finished())
    }

    /// Drop handles of countdowns that ran to completion.
    pub async fn reap(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, h| !h.is_finished());
        before - tasks.len()
    }
}
