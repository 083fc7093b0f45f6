//! Two-lane intake queue.
//!
//! Producers never wait. The single consumer (the dispatcher) always empties the
//! priority lane before taking chat messages.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use super::request::{Lane, SpeechRequest};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("intake queue is closed")]
    Closed,
}

#[derive(Default)]
struct Lanes {
    priority: VecDeque<SpeechRequest>,
    normal: VecDeque<SpeechRequest>,
    closed: bool,
}

impl Lanes {
    fn pop(&mut self) -> Option<SpeechRequest> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }
}

struct Shared {
    lanes: Mutex<Lanes>,
    ready: Notify,
}

/// Cloneable handle to the intake queue.
#[derive(Clone)]
pub struct Intake {
    shared: Arc<Shared>,
}

impl Default for Intake {
    fn default() -> Self {
        Self::new()
    }
}

impl Intake {
    pub fn new() -> Self {
        Self { shared: Arc::new(Shared { lanes: Mutex::new(Lanes::default()), ready: Notify::new() }) }
    }

    /// Queue a request. Only fails once the queue has been closed.
    pub fn enqueue(&self, request: SpeechRequest) -> Result<(), IntakeError> {
        {
            let mut lanes = self.shared.lanes.lock();
            if lanes.closed {
                return Err(IntakeError::Closed);
            }
            match request.lane() {
                Lane::Priority => lanes.priority.push_back(request),
                Lane::Normal => lanes.normal.push_back(request),
            }
        }
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Next request, priority lane first.
    ///
    /// Returns `None` once the queue is closed and both lanes are drained.
    pub async fn next(&self) -> Option<SpeechRequest> {
        loop {
            {
                let mut lanes = self.shared.lanes.lock();
                if let Some(request) = lanes.pop() {
                    return Some(request);
                }
                if lanes.closed {
                    return None;
                }
            }
            // notify_one keeps a permit, so a wakeup between unlock and here is not lost
            self.shared.ready.notified().await;
        }
    }

    /// Stop accepting requests. Already queued requests are still handed out.
    pub fn close(&self) {
        let pending = {
            let mut lanes = self.shared.lanes.lock();
            lanes.closed = true;
            lanes.priority.len() + lanes.normal.len()
        };
        debug!("Intake closed with {} request(s) pending", pending);
        self.shared.ready.notify_one();
    }

    /// Number of queued requests across both lanes.
    pub fn pending(&self) -> usize {
        let lanes = self.shared.lanes.lock();
        lanes.priority.len() + lanes.normal.len()
    }
}
