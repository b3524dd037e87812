//! The caller-facing event iterator.

use crate::cancellation::CancellationToken;
use crate::core::ProgressEvent;
use crate::errors::PipelineError;
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Slot the background context writes a terminal error into.
pub(crate) type ErrorSlot = Arc<Mutex<Option<PipelineError>>>;

/// Progress events of one run, in the order the coordinator produced them.
///
/// Iteration blocks for at most one poll interval at a time. It ends when the
/// run finishes and the queue is drained, yielding the run's error first if
/// it failed. Once the run is cancelled through this iterator or a
/// [`cancel_handle`](Self::cancel_handle), the next item is
/// [`PipelineError::Cancelled`] and the sequence ends there. Dropping an
/// unfinished iterator cancels its run.
pub struct RunEvents {
    rx: Receiver<ProgressEvent>,
    token: CancellationToken,
    error: ErrorSlot,
    poll: Duration,
    done: bool,
}

impl RunEvents {
    pub(crate) fn new(
        rx: Receiver<ProgressEvent>,
        token: CancellationToken,
        error: ErrorSlot,
        poll: Duration,
    ) -> Self {
        Self {
            rx,
            token,
            error,
            poll,
            done: false,
        }
    }

    /// Returns a handle that cancels this run from any thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests cancellation. The next item is the cancellation error.
    pub fn cancel(&self) {
        self.token.cancel("cancelled by caller");
    }

    /// Returns true once the sequence has ended.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> Option<Result<ProgressEvent, PipelineError>> {
        self.done = true;
        self.error.lock().take().map(Err)
    }
}

impl Iterator for RunEvents {
    type Item = Result<ProgressEvent, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.token.is_cancelled() {
                // Queued events are abandoned; the run's own error wins if it
                // already failed for another reason.
                self.done = true;
                let err = self.error.lock().take().unwrap_or_else(|| self.token.to_error());
                return Some(Err(err));
            }
            match self.rx.recv_timeout(self.poll) {
                Ok(event) => return Some(Ok(event)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.error.lock().is_some() {
                        return self.finish();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return self.finish(),
            }
        }
    }
}

impl Drop for RunEvents {
    fn drop(&mut self) {
        if !self.done {
            self.token.cancel("event stream dropped");
        }
    }
}

impl std::fmt::Debug for RunEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEvents")
            .field("poll", &self.poll)
            .field("done", &self.done)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
