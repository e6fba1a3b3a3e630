//! # Step registry: two independent FIFO queues.
//!
//! Pure data structure. Steps are appended at the tail during registration and
//! removed from the head during a run; the two directions never share state.

use std::collections::VecDeque;

use super::step::{Direction, Step};

/// Apply and revert queues.
#[derive(Debug, Default)]
pub struct StepRegistry {
    apply: VecDeque<Step>,
    revert: VecDeque<Step>,
}

impl StepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step to the tail of the queue for `direction`.
    pub fn enqueue(&mut self, direction: Direction, step: Step) {
        self.queue_mut(direction).push_back(step);
    }

    /// Removes and returns the head of the queue for `direction`, or `None` if empty.
    pub fn dequeue(&mut self, direction: Direction) -> Option<Step> {
        self.queue_mut(direction).pop_front()
    }

    /// Number of steps still waiting in `direction`.
    pub fn len(&self, direction: Direction) -> usize {
        self.queue(direction).len()
    }

    /// True if no step is waiting in `direction`.
    pub fn is_empty(&self, direction: Direction) -> bool {
        self.queue(direction).is_empty()
    }

    fn queue(&self, direction: Direction) -> &VecDeque<Step> {
        match direction {
            Direction::Apply => &self.apply,
            Direction::Revert => &self.revert,
        }
    }

    fn queue_mut(&mut self, direction: Direction) -> &mut VecDeque<Step> {
        match direction {
            Direction::Apply => &mut self.apply,
            Direction::Revert => &mut self.revert,
        }
    }
}
