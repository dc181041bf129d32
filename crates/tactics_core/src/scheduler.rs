//! Priority-ordered turn scheduler.
//!
//! Decisions land in an unordered staging buffer tagged with a priority.
//! [`TurnScheduler::promote`] stable-sorts the buffer (lower priority first)
//! and appends each action to its owner's queue entry. [`TurnScheduler::next`]
//! then hands out actions owner by owner, in each owner's submission order.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::units::UnitId;

/// Identifier handed out on submission, used for cancellation.
pub type ActionId = u64;

/// An action waiting in an owner's queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction<T> {
    /// Identifier from [`TurnScheduler::submit`].
    pub id: ActionId,
    /// The action itself.
    pub action: T,
}

/// One owner and its pending actions, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnQueueItem<T> {
    /// Owning unit.
    pub unit: UnitId,
    /// Pending actions. Never empty while the item is queued.
    pub actions: VecDeque<QueuedAction<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BufferEntry<T> {
    unit: UnitId,
    priority: i32,
    queued: QueuedAction<T>,
}

/// Staging buffer plus ordered queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnScheduler<T> {
    buffer: Vec<BufferEntry<T>>,
    queue: Vec<TurnQueueItem<T>>,
    next_id: ActionId,
}

impl<T> Default for TurnScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TurnScheduler<T> {
    /// Empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            queue: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate an id without queueing anything.
    pub fn reserve_id(&mut self) -> ActionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Stage an action for `unit`.
    pub fn submit(&mut self, unit: UnitId, action: T, priority: i32) -> ActionId {
        let id = self.reserve_id();
        self.buffer.push(BufferEntry {
            unit,
            priority,
            queued: QueuedAction { id, action },
        });
        trace!(unit, id, priority, "action staged");
        id
    }

    /// Move staged actions into the queue, lowest priority first.
    ///
    /// The sort is stable, so equal priorities keep submission order.
    pub fn promote(&mut self) {
        let staged = std::mem::take(&mut self.buffer);
        self.enqueue(staged);
    }

    /// Promote only what was staged after the buffer held `mark` entries.
    ///
    /// Earlier entries stay staged for the next [`promote`](Self::promote).
    pub fn promote_since(&mut self, mark: usize) {
        let mark = mark.min(self.buffer.len());
        let staged = self.buffer.split_off(mark);
        self.enqueue(staged);
    }

    fn enqueue(&mut self, mut staged: Vec<BufferEntry<T>>) {
        staged.sort_by_key(|entry| entry.priority);

        for entry in staged {
            match self.queue.iter_mut().find(|item| item.unit == entry.unit) {
                Some(item) => item.actions.push_back(entry.queued),
                None => self.queue.push(TurnQueueItem {
                    unit: entry.unit,
                    actions: VecDeque::from([entry.queued]),
                }),
            }
        }
    }

    /// Take the head action of the first queued owner.
    ///
    /// Owners whose list becomes empty leave the queue.
    pub fn next(&mut self) -> Option<(UnitId, QueuedAction<T>)> {
        let item = self.queue.first_mut()?;
        let unit = item.unit;
        let queued = item.actions.pop_front();
        if item.actions.is_empty() {
            self.queue.remove(0);
        }
        queued.map(|q| (unit, q))
    }

    /// Withdraw an action that has not started.
    ///
    /// Looks in the buffer and the queue. Returns the action if it was
    /// still pending; cancelling an already-handed-out id is a no-op.
    pub fn cancel(&mut self, id: ActionId) -> Option<T> {
        if let Some(pos) = self.buffer.iter().position(|e| e.queued.id == id) {
            return Some(self.buffer.remove(pos).queued.action);
        }

        for index in 0..self.queue.len() {
            let item = &mut self.queue[index];
            if let Some(pos) = item.actions.iter().position(|q| q.id == id) {
                let removed = item.actions.remove(pos);
                if item.actions.is_empty() {
                    self.queue.remove(index);
                }
                return removed.map(|q| q.action);
            }
        }
        None
    }

    /// Withdraw every pending action of `unit`. Returns the ids removed.
    pub fn cancel_unit(&mut self, unit: UnitId) -> Vec<ActionId> {
        let mut removed: Vec<ActionId> = self
            .buffer
            .iter()
            .filter(|e| e.unit == unit)
            .map(|e| e.queued.id)
            .collect();
        self.buffer.retain(|e| e.unit != unit);

        if let Some(pos) = self.queue.iter().position(|item| item.unit == unit) {
            let item = self.queue.remove(pos);
            removed.extend(item.actions.into_iter().map(|q| q.id));
        }
        removed
    }

    /// True iff no owner entries remain in the queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Actions in the queue, across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.iter().map(|item| item.actions.len()).sum()
    }

    /// Actions waiting in the staging buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// True if `id` is staged or queued.
    #[must_use]
    pub fn is_pending(&self, id: ActionId) -> bool {
        self.buffer.iter().any(|e| e.queued.id == id)
            || self
                .queue
                .iter()
                .any(|item| item.actions.iter().any(|q| q.id == id))
    }

    /// Pending actions of `unit` (staged first, then queued).
    pub fn pending_for(&self, unit: UnitId) -> impl Iterator<Item = &QueuedAction<T>> + '_ {
        let staged = self
            .buffer
            .iter()
            .filter(move |e| e.unit == unit)
            .map(|e| &e.queued);
        let queued = self
            .queue
            .iter()
            .filter(move |item| item.unit == unit)
            .flat_map(|item| item.actions.iter());
        staged.chain(queued)
    }

    /// Queue entries in execution order.
    #[must_use]
    pub fn items(&self) -> &[TurnQueueItem<T>] {
        &self.queue
    }
}
