//! Shared FIFO task queue with drain detection
//!
//! The queue counts outstanding tasks: a task is outstanding from the moment
//! it is pushed until a worker calls `task_done` for it (after success,
//! failure or a duplicate drop). The queue is drained when that count reaches
//! zero, at which point no worker can produce further tasks.
//!
//! Workers push child tasks before marking their own task done, so the count
//! never touches zero while fan-out is still pending.

use crate::crawler::task::FetchTask;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Multi-producer, multi-consumer queue of fetch tasks
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<FetchTask>>,
    outstanding: AtomicUsize,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task and wakes idle workers
    pub fn push(&self, task: FetchTask) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
        self.notify.notify_waiters();
    }

    /// Enqueues several tasks in order
    pub fn extend(&self, tasks: impl IntoIterator<Item = FetchTask>) {
        for task in tasks {
            self.push(task);
        }
    }

    fn try_pop(&self) -> Option<FetchTask> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Waits for the next task
    ///
    /// Returns None once the queue is drained or `cancel` fires. Tasks still
    /// queued at cancellation are left behind.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<FetchTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a push in between is not missed
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return None;
            }

            if let Some(task) = self.try_pop() {
                return Some(task);
            }

            if self.is_drained() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Marks one dequeued task as finished
    pub fn task_done(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Resolves once every pushed task has been marked done
    #[cfg(test)]
    async fn wait_drained(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_drained() {
                return;
            }

            notified.await;
        }
    }

    pub fn is_drained(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Tasks pushed but not yet marked done (queued or in flight)
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Tasks waiting to be dequeued
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
