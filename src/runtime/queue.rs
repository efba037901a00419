//! FIFO post-flush queue.

use crate::error::{Result, StoreError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};

use super::Job;

/// Unbounded job queue. Both channel ends live here, so it never disconnects.
pub(crate) struct PostFlushQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    /// Set while a drain is in progress.
    flushing: AtomicBool,
}

/// Clears the flushing flag even if a job panics.
struct FlushingGuard<'a>(&'a AtomicBool);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PostFlushQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            flushing: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        // Cannot fail: the receiver is owned by self.
        let _ = self.sender.send(job);
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Run queued jobs until the queue is empty or `limit` jobs have run.
    pub(crate) fn drain(&self, limit: usize) -> Result<usize> {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }
        let _guard = FlushingGuard(&self.flushing);

        let mut ran = 0;
        loop {
            if ran >= limit && !self.receiver.is_empty() {
                tracing::warn!(
                    limit,
                    pending = self.receiver.len(),
                    "post-flush limit reached, deferring remaining jobs"
                );
                return Err(StoreError::FlushLimitExceeded { limit });
            }
            match self.receiver.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }

        tracing::trace!(jobs = ran, "post-flush queue drained");
        Ok(ran)
    }
}
