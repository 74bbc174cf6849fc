//! Per-entity priority queue of commands.
//!
//! Max-heap semantics: the command with the numerically highest priority is
//! always on top; equal priorities break toward the most recently pushed, so
//! a just-spawned sub-command cannot starve behind an equal-priority sibling.
//! In steady state the queue is never empty - a fallback Idle command at
//! [`DEFAULT_PRIORITY`](super::DEFAULT_PRIORITY) sits beneath everything else.

use bevy_ecs::prelude::*;
use std::collections::BinaryHeap;

use super::pool::CommandId;

/// A queued command reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub priority: i32,
    /// Push sequence, used to break priority ties (newest first).
    seq: u64,
    pub id: CommandId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority-ordered command queue scoped to one entity.
#[derive(Component, Debug, Default)]
pub struct CommandQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn push(&mut self, priority: i32, id: CommandId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry { priority, seq, id });
    }

    pub fn peek(&self) -> Option<QueueEntry> {
        self.heap.peek().copied()
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop every entry with priority strictly above `threshold`, returning
    /// the displaced ids so the caller can release them to the pool.
    ///
    /// The loop is bounded by `len > 1` as well as the priority test: the
    /// bottom entry (the fallback) is never popped, and every iteration pops,
    /// so termination is unconditional.
    pub fn displace_above(&mut self, threshold: i32) -> Vec<CommandId> {
        let mut displaced = Vec::new();
        while self.heap.len() > 1 {
            match self.heap.peek() {
                Some(entry) if entry.priority > threshold => {
                    displaced.push(entry.id);
                    self.heap.pop();
                }
                _ => break,
            }
        }
        displaced
    }

    /// Drain every entry (used when the owning entity is destroyed).
    pub fn drain_all(&mut self) -> Vec<CommandId> {
        self.heap.drain().map(|e| e.id).collect()
    }
}
