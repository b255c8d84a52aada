//! Background execution of pipeline runs
//!
//! The pipeline itself is synchronous. This module wraps a run in a thread
//! and hands back a handle that can be polled or cancelled. Cancellation is
//! cooperative: runs check their [`CancellationToken`] at batch boundaries.

use anyhow::{Context, Result};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Cooperative cancellation flag shared between a caller and a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Observable state of a submitted task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus<T> {
    Running,
    Finished(T),
    Failed(String),
}

impl<T> TaskStatus<T> {
    pub fn is_done(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Handle to a submitted task
pub struct TaskHandle<T> {
    name: String,
    token: CancellationToken,
    state: Arc<Mutex<TaskStatus<T>>>,
    join: Option<JoinHandle<()>>,
}

impl<T: Clone> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status without blocking
    pub fn poll(&self) -> TaskStatus<T> {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(_) => TaskStatus::Failed("task state poisoned".to_string()),
        }
    }

    /// Ask the task to stop at its next batch boundary
    pub fn cancel(&self) {
        info!("[TASK] Cancellation requested for {}", self.name);
        self.token.cancel();
    }

    /// Block until the task finishes and return its final status
    pub fn wait(mut self) -> TaskStatus<T> {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            return TaskStatus::Failed(format!("task {} panicked", self.name));
        }
        self.poll()
    }
}

/// Spawns pipeline runs on background threads
#[derive(Debug, Default, Clone)]
pub struct TaskRunner;

impl TaskRunner {
    pub fn new() -> Self {
        Self
    }

    /// Submit `work` for background execution
    pub fn submit<T, F>(&self, name: impl Into<String>, work: F) -> Result<TaskHandle<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(TaskStatus::Running));

        let thread_token = token.clone();
        let thread_state = Arc::clone(&state);
        let thread_name = name.clone();
        let join = std::thread::Builder::new()
            .name(format!("triage-{}", name))
            .spawn(move || {
                let status = match work(thread_token) {
                    Ok(value) => TaskStatus::Finished(value),
                    Err(e) => {
                        error!("[TASK] {} failed: {:#}", thread_name, e);
                        TaskStatus::Failed(format!("{:#}", e))
                    }
                };
                if let Ok(mut guard) = thread_state.lock() {
                    *guard = status;
                }
            })
            .with_context(|| format!("Failed to spawn task {}", name))?;

        Ok(TaskHandle {
            name,
            token,
            state,
            join: Some(join),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_submit_and_wait() {
        let runner = TaskRunner::new();
        let handle = runner.submit("answer", |_token| Ok(42)).unwrap();
        assert_eq!(handle.wait(), TaskStatus::Finished(42));
    }

    #[test]
    fn test_failure_is_reported() {
        let runner = TaskRunner::new();
        let handle = runner
            .submit::<(), _>("broken", |_token| anyhow::bail!("store unavailable"))
            .unwrap();
        match handle.wait() {
            TaskStatus::Failed(msg) => assert!(msg.contains("store unavailable")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_cancel_is_observed() {
        let runner = TaskRunner::new();
        let handle = runner
            .submit("loop", |token| {
                let mut batches = 0;
                while !token.is_cancelled() {
                    batches += 1;
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(batches)
            })
            .unwrap();

        assert_eq!(handle.poll(), TaskStatus::Running);
        handle.cancel();
        assert!(matches!(handle.wait(), TaskStatus::Finished(_)));
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
