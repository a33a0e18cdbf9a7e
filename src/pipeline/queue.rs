//! Bounded task queue with backpressure and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::error::QueueError;

/// How often blocked callers re-check the cancellation and closed flags.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Multi-producer, multi-consumer FIFO of fixed capacity.
///
/// `submit` blocks while the queue is full and `claim` blocks while it is
/// empty; both wake up periodically to observe cancellation. After
/// [`TaskQueue::close`], submissions fail and claims drain what is left.
#[derive(Debug)]
pub struct TaskQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> TaskQueue<T> {
    /// Create a queue holding at most `capacity` tasks (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a task, waiting for space.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and
    /// [`QueueError::Cancelled`] if `cancel` is set while waiting.
    pub fn submit(&self, task: T, cancel: &AtomicBool) -> Result<(), QueueError> {
        let mut task = task;
        loop {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if cancel.load(Ordering::SeqCst) {
                return Err(QueueError::Cancelled);
            }
            match self.sender.send_timeout(task, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(t)) => task = t,
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueError::Closed),
            }
        }
    }

    /// Take the next task, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained, or as soon as
    /// `cancel` is set.
    pub fn claim(&self, cancel: &AtomicBool) -> Option<T> {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(task) => return Some(task),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_closed() && self.receiver.is_empty() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Stop accepting tasks. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(pending = self.len(), "Task queue closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of queued tasks; never more than the capacity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
