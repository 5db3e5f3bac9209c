use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};
use hookline_core::DeliveryId;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, DeliveryId)>>,
    /// Latest schedule per delivery. Heap entries that disagree are stale.
    scheduled: HashMap<DeliveryId, DateTime<Utc>>,
}

/// Delay queue of deliveries keyed by next-attempt time.
///
/// Scheduling a delivery that is already queued replaces its due time.
#[derive(Debug, Default)]
pub struct RetryQueue {
    inner: Mutex<Inner>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` to run at `at`.
    pub fn schedule(&self, id: DeliveryId, at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.scheduled.insert(id.clone(), at);
        inner.heap.push(Reverse((at, id)));
    }

    /// Drop `id` from the queue. Returns whether it was queued.
    pub fn remove(&self, id: &DeliveryId) -> bool {
        // The heap entry is discarded lazily in `pop_due`.
        self.inner.lock().scheduled.remove(id).is_some()
    }

    /// Remove and return every delivery due at or before `now`, earliest
    /// first.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<DeliveryId> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while let Some(Reverse((at, _))) = inner.heap.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((at, id))) = inner.heap.pop() else {
                break;
            };
            if inner.scheduled.get(&id) == Some(&at) {
                inner.scheduled.remove(&id);
                due.push(id);
            }
        }
        due
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().scheduled.values().min().copied()
    }

    pub fn contains(&self, id: &DeliveryId) -> bool {
        self.inner.lock().scheduled.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn id(s: &str) -> DeliveryId {
        DeliveryId::new(s)
    }

    #[test]
    fn pops_only_due_entries_in_order() {
        let q = RetryQueue::new();
        let now = Utc::now();
        q.schedule(id("late"), now + Duration::seconds(60));
        q.schedule(id("second"), now - Duration::seconds(1));
        q.schedule(id("first"), now - Duration::seconds(5));

        assert_eq!(q.pop_due(now), vec![id("first"), id("second")]);
        assert_eq!(q.len(), 1);
        assert!(q.pop_due(now).is_empty());
        assert_eq!(q.pop_due(now + Duration::seconds(60)), vec![id("late")]);
        assert!(q.is_empty());
    }

    #[test]
    fn rescheduling_replaces_due_time() {
        let q = RetryQueue::new();
        let now = Utc::now();
        q.schedule(id("d"), now - Duration::seconds(1));
        q.schedule(id("d"), now + Duration::seconds(30));

        assert!(q.pop_due(now).is_empty(), "stale entry must be skipped");
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(now + Duration::seconds(30)));
        assert_eq!(q.pop_due(now + Duration::seconds(30)), vec![id("d")]);
    }

    #[test]
    fn removed_entries_are_not_returned() {
        let q = RetryQueue::new();
        let now = Utc::now();
        q.schedule(id("d"), now);
        assert!(q.contains(&id("d")));
        assert!(q.remove(&id("d")));
        assert!(!q.remove(&id("d")));
        assert!(q.pop_due(now).is_empty());
    }
}
