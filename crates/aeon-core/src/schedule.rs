//! Named background tasks owned by one agent activation.
//!
//! Every task lives exactly as long as the activation that scheduled it:
//! `cancel_all()` runs on deactivation and again on drop, so no timer can
//! outlive its agent.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, PoisonError},
};

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ScheduledTasks {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ScheduledTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under `name`, aborting any task already registered
    /// under the same name.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(task);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = tasks.insert(name.clone(), handle) {
            debug!(task = %name, "replacing scheduled task");
            previous.abort();
        }
    }

    /// Abort the task registered under `name`. Returns false if there was none.
    pub fn cancel(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        match tasks.remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every task. Returns how many were still registered.
    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        count
    }

    /// True if a task is registered under `name` and has not finished.
    pub fn is_running(&self, name: &str) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.get(name).is_some_and(|handle| !handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ScheduledTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::ScheduledTasks;

    #[tokio::test]
    async fn cancel_all_stops_every_task() {
        let tasks = ScheduledTasks::new();
        let ticks = Arc::new(AtomicU32::new(0));

        for name in ["a", "b"] {
            let ticks = ticks.clone();
            tasks.spawn(name, async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            });
        }
        assert!(tasks.is_running("a"));
        assert_eq!(tasks.cancel_all(), 2);
        assert!(tasks.is_empty());

        // Let aborts land, then make sure the counter is frozen.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frozen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test]
    async fn spawning_same_name_replaces_previous_task() {
        let tasks = ScheduledTasks::new();
        tasks.spawn("probe", std::future::pending());
        tasks.spawn("probe", std::future::pending());
        assert_eq!(tasks.len(), 1);
        assert!(tasks.cancel("probe"));
        assert!(!tasks.cancel("probe"));
    }
}
