//! Single-worker executor for work that must leave the audio thread.
//!
//! The audio thread posts tasks with `try_send` and never blocks. One
//! dedicated thread runs them in order.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Work the worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    /// Start the earliest remaining timespan, or finish the export.
    StartNextTimespan,
    Shutdown,
}

/// Sending half handed to whoever posts tasks.
#[derive(Debug, Clone)]
pub(crate) struct TaskSender {
    tx: Sender<Task>,
}

impl TaskSender {
    /// Non-blocking post. Returns `false` if the queue is full or the worker is gone.
    pub(crate) fn post(&self, task: Task) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                warn!(?task, "worker queue full");
                false
            }
            Err(TrySendError::Disconnected(task)) => {
                warn!(?task, "worker is gone");
                false
            }
        }
    }
}

/// Receiving half, consumed by [`Worker::spawn`].
pub(crate) struct TaskQueue {
    rx: Receiver<Task>,
    tx: Sender<Task>,
}

const QUEUE_DEPTH: usize = 8;

/// Create the queue before the worker so the sender can be stored in the
/// state the worker later operates on.
pub(crate) fn queue() -> (TaskSender, TaskQueue) {
    let (tx, rx) = bounded(QUEUE_DEPTH);
    (TaskSender { tx: tx.clone() }, TaskQueue { rx, tx })
}

pub(crate) struct Worker {
    thread: Option<JoinHandle<()>>,
    sender: TaskSender,
}

impl Worker {
    /// Spawn the worker on `queue`. `run` is called for every task except `Shutdown`.
    pub(crate) fn spawn<F>(name: &str, queue: TaskQueue, run: F) -> std::io::Result<Self>
    where
        F: Fn(Task) + Send + 'static,
    {
        let TaskQueue { rx, tx } = queue;
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for task in rx.iter() {
                    if task == Task::Shutdown {
                        break;
                    }
                    debug!(?task, "worker running task");
                    run(task);
                }
                debug!("worker exiting");
            })?;

        Ok(Self {
            thread: Some(thread),
            sender: TaskSender { tx },
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Blocking send: the queue may be momentarily full.
        let _ = self.sender.tx.send(Task::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}
