//! Time-ordered storage for scheduled plans.
//!
//! Plans are ordered by time, then by phase, then by the order in which they
//! were scheduled. Payloads live in a map keyed by sequence number, so
//! cancelling only drops the payload and the stale heap key is skipped when it
//! surfaces.
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::HashMap;

/// Handle for cancelling a scheduled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanId(u64);

/// A payload that is due at `time`.
pub struct Plan<T> {
    pub time: f64,
    pub data: T,
}

#[derive(Debug)]
struct Key<P> {
    time: f64,
    phase: P,
    sequence: u64,
}

impl<P: Ord> Ord for Key<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // finite times only, checked by `Context::add_plan_with_phase`
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.phase.cmp(&other.phase))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl<P: Ord> PartialOrd for Key<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: Ord> PartialEq for Key<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P: Ord> Eq for Key<P> {}

pub struct Queue<T, P: Ord> {
    heap: BinaryHeap<Reverse<Key<P>>>,
    pending: HashMap<u64, T>,
    next_sequence: u64,
}

impl<T, P: Ord> Queue<T, P> {
    #[must_use]
    pub fn new() -> Queue<T, P> {
        Queue {
            heap: BinaryHeap::new(),
            pending: HashMap::default(),
            next_sequence: 0,
        }
    }

    pub fn add_plan(&mut self, time: f64, data: T, phase: P) -> PlanId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Key {
            time,
            phase,
            sequence,
        }));
        self.pending.insert(sequence, data);
        PlanId(sequence)
    }

    /// # Panics
    ///
    /// Panics if the plan has already run or been cancelled.
    pub fn cancel_plan(&mut self, id: &PlanId) {
        self.pending.remove(&id.0).expect("Plan does not exist");
    }

    /// True when no live plan is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }

    /// Removes and returns the earliest live plan.
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(data) = self.pending.remove(&key.sequence) {
                return Some(Plan {
                    time: key.time,
                    data,
                });
            }
        }
        None
    }
}

impl<T, P: Ord> Default for Queue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}
