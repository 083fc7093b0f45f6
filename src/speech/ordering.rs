//! Reorders completed bundles back into dispatch order.
//!
//! Each lane keeps its own cursor (the next sequence id it expects) and a
//! min-heap of pending bundles. Within a lane nothing is released until the
//! bundle at the cursor has arrived, however many later bundles are already
//! waiting. The normal lane is held for as long as any priority bundle is
//! pending, so an announcement never ends up behind buffered chat while an
//! earlier announcement is still being synthesized.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::{debug, warn};

use super::request::{Bundle, Lane};

struct Queued(Bundle);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence_id == other.0.sequence_id
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sequence_id.cmp(&other.0.sequence_id)
    }
}

#[derive(Default)]
struct LaneQueue {
    cursor: u64,
    pending: BinaryHeap<Reverse<Queued>>,
}

impl LaneQueue {
    fn pop_ready(&mut self, lane: Lane) -> Option<Bundle> {
        while let Some(Reverse(head)) = self.pending.peek() {
            let sequence_id = head.0.sequence_id;
            if sequence_id > self.cursor {
                debug!("{:?} lane waiting for #{}, lowest pending is #{}", lane, self.cursor, sequence_id);
                return None;
            }

            let Reverse(Queued(bundle)) = self.pending.pop()?;
            if sequence_id < self.cursor {
                warn!("Discarding {:?} bundle #{} behind cursor #{}", lane, sequence_id, self.cursor);
                continue;
            }

            self.cursor += 1;
            return Some(bundle);
        }
        None
    }
}

/// Pending bundles of both lanes.
#[derive(Default)]
pub struct OrderingBuffer {
    priority: LaneQueue,
    normal: LaneQueue,
}

impl OrderingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bundle: Bundle) {
        debug!("Buffered {:?} bundle #{} ({} phrase(s))", bundle.lane(), bundle.sequence_id, bundle.phrases.len());
        let lane = match bundle.lane() {
            Lane::Priority => &mut self.priority,
            Lane::Normal => &mut self.normal,
        };
        lane.pending.push(Reverse(Queued(bundle)));
    }

    /// Next bundle allowed to play, advancing its lane cursor.
    pub fn pop_ready(&mut self) -> Option<Bundle> {
        if let Some(bundle) = self.priority.pop_ready(Lane::Priority) {
            return Some(bundle);
        }
        if !self.priority.pending.is_empty() {
            debug!("Normal lane held behind {} pending announcement(s)", self.priority.pending.len());
            return None;
        }
        self.normal.pop_ready(Lane::Normal)
    }

    /// Next sequence id expected on `lane`.
    #[cfg(test)]
    pub fn cursor(&self, lane: Lane) -> u64 {
        match lane {
            Lane::Priority => self.priority.cursor,
            Lane::Normal => self.normal.cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.priority.pending.len() + self.normal.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
