/// Producer-side change requests.
///
/// Any thread may queue add / remove / update intents through a shared
/// `Arc<ChangeQueues>`. The consumer drains them once per frame in
/// `Bvh::update()`. Each queue has its own lock, held only for a push or a
/// drain.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashSet;
use super::object::{BvhObject, ObjectId};

/// One FIFO of pending objects plus the ids already in it.
#[derive(Default)]
struct PendingQueue {
    items: Vec<Arc<dyn BvhObject>>,
    in_flight: FxHashSet<ObjectId>,
}

impl PendingQueue {
    /// Append unless the object is already queued.
    fn push(&mut self, object: Arc<dyn BvhObject>) -> bool {
        if !self.in_flight.insert(object.id()) {
            return false;
        }
        self.items.push(object);
        true
    }

    fn drain(&mut self) -> Vec<Arc<dyn BvhObject>> {
        self.in_flight.clear();
        std::mem::take(&mut self.items)
    }
}

/// Add, remove and update request queues.
#[derive(Default)]
pub struct ChangeQueues {
    /// Objects waiting for insertion
    add: Mutex<PendingQueue>,
    /// Objects waiting for removal
    remove: Mutex<PendingQueue>,
    /// Objects whose volume changed since they were inserted
    update: Mutex<PendingQueue>,
}

/// A panicking producer can only have left a fully pushed or untouched
/// queue behind, so a poisoned lock is still usable.
fn lock(queue: &Mutex<PendingQueue>) -> MutexGuard<'_, PendingQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChangeQueues {
    /// Three empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insertion. Returns `false` when the object is not indexed
    /// or already queued for insertion.
    pub fn request_add(&self, object: Arc<dyn BvhObject>) -> bool {
        if !object.volume().is_indexed() {
            return false;
        }
        lock(&self.add).push(object)
    }

    /// Queue a removal. Returns `false` when the object is not indexed or
    /// already queued for removal.
    pub fn request_remove(&self, object: Arc<dyn BvhObject>) -> bool {
        if !object.volume().is_indexed() {
            return false;
        }
        lock(&self.remove).push(object)
    }

    /// Queue a move / resize / light volume change. Returns `false` when the
    /// object is not indexed or already queued for update.
    pub fn request_update(&self, object: Arc<dyn BvhObject>) -> bool {
        if !object.volume().is_indexed() {
            return false;
        }
        lock(&self.update).push(object)
    }

    /// Take every queued insertion, in request order.
    pub(crate) fn drain_adds(&self) -> Vec<Arc<dyn BvhObject>> {
        lock(&self.add).drain()
    }

    /// Take every queued removal.
    pub(crate) fn drain_removes(&self) -> Vec<Arc<dyn BvhObject>> {
        lock(&self.remove).drain()
    }

    pub(crate) fn drain_updates(&self) -> Vec<Arc<dyn BvhObject>> {
        lock(&self.update).drain()
    }

    /// Pending requests over all three queues.
    ///
    /// Each queue is locked on its own; the total is a snapshot, producers
    /// may push in between.
    pub fn len(&self) -> usize {
        let adds = lock(&self.add).items.len();
        let removes = lock(&self.remove).items.len();
        let updates = lock(&self.update).items.len();
        adds + removes + updates
    }

    /// `true` when no request is pending in any queue.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "change_queue_tests.rs"]
mod tests;
