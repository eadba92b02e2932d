use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::ActorId;

/// Work deferred to a later tick of the host event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Show the create-zone prompt once the interaction UI has settled.
    ShowPrompt(ActorId),
    /// Erase a group's zone when its activation window lapses.
    EraseZone { group: String, zone_id: String },
}

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

/// Single-owner timer queue. Tasks fire in due order, FIFO among equal due times.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    queue: BTreeMap<(DateTime<Utc>, u64), T>,
    due_by_id: HashMap<u64, DateTime<Utc>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queue: BTreeMap::new(),
            due_by_id: HashMap::new(),
        }
    }

    pub fn schedule_at(&mut self, due: DateTime<Utc>, task: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert((due, id), task);
        self.due_by_id.insert(id, due);
        TaskHandle(id)
    }

    /// Schedule `delay` after `now`; a due time past the clock's range is
    /// clamped to its last instant.
    pub fn schedule_after(&mut self, now: DateTime<Utc>, delay: TimeDelta, task: T) -> TaskHandle {
        let due = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule_at(due, task)
    }

    /// Cancel a pending task, returning it if it had not fired yet.
    pub fn cancel(&mut self, handle: TaskHandle) -> Option<T> {
        let due = self.due_by_id.remove(&handle.0)?;
        self.queue.remove(&(due, handle.0))
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.due_by_id.contains_key(&handle.0)
    }

    /// Remove and return every task due at or before `now`.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let later = self.queue.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut self.queue, later);
        due.into_iter()
            .map(|((_, id), task)| {
                self.due_by_id.remove(&id);
                task
            })
            .collect()
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Drop every pending task. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.due_by_id.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_order_then_fifo() {
        let t0 = Utc::now();
        let mut sched = Scheduler::new();
        sched.schedule_after(t0, TimeDelta::seconds(2), "late");
        sched.schedule_after(t0, TimeDelta::seconds(1), "first");
        sched.schedule_after(t0, TimeDelta::seconds(1), "second");

        assert!(sched.take_due(t0).is_empty());
        assert_eq!(sched.next_due(), Some(t0 + TimeDelta::seconds(1)));
        assert_eq!(
            sched.take_due(t0 + TimeDelta::seconds(1)),
            vec!["first", "second"]
        );
        assert_eq!(sched.take_due(t0 + TimeDelta::seconds(10)), vec!["late"]);
        assert!(sched.is_empty());
    }

    #[test]
    fn cancelled_task_never_fires() {
        let t0 = Utc::now();
        let mut sched = Scheduler::new();
        let handle = sched.schedule_after(t0, TimeDelta::milliseconds(200), 1);

        assert!(sched.is_pending(handle));
        assert_eq!(sched.cancel(handle), Some(1));
        assert!(!sched.is_pending(handle));
        assert_eq!(sched.cancel(handle), None);
        assert!(sched.take_due(t0 + TimeDelta::seconds(1)).is_empty());
    }

    #[test]
    fn fired_handle_is_no_longer_pending() {
        let t0 = Utc::now();
        let mut sched = Scheduler::new();
        let handle = sched.schedule_at(t0, 'x');

        assert_eq!(sched.take_due(t0), vec!['x']);
        assert!(!sched.is_pending(handle));
    }

    #[test]
    fn clear_drops_everything() {
        let t0 = Utc::now();
        let mut sched = Scheduler::new();
        sched.schedule_at(t0, 1);
        sched.schedule_at(t0, 2);

        assert_eq!(sched.clear(), 2);
        assert_eq!(sched.len(), 0);
        assert!(sched.take_due(t0).is_empty());
    }

    #[test]
    fn delay_past_clock_range_is_clamped() {
        let t0 = Utc::now();
        let mut sched = Scheduler::new();
        let handle = sched.schedule_after(t0, TimeDelta::MAX, "never");

        assert_eq!(sched.next_due(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(sched.take_due(t0 + TimeDelta::days(365)).is_empty());
        assert!(sched.is_pending(handle));
    }
}
