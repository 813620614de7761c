//! Deferred tasks for the single-threaded UI loop.
//!
//! The scheduler never sleeps; the host advances its clock and runs
//! whatever became due. Tasks are plain data so the owner decides, at fire
//! time, whether the work still applies.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Entry<T> {
    handle: TimerHandle,
    deadline: Duration,
    task: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    now: Duration,
    next_handle: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_handle: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry {
            handle,
            deadline: self.now + delay,
            task,
        });
        handle
    }

    /// Returns true when the timer was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Moves the clock forward and returns due tasks, earliest first. Ties
    /// keep scheduling order.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<T> {
        self.now += elapsed;
        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.deadline <= now);
        self.entries = pending;
        due.sort_by_key(|entry| (entry.deadline, entry.handle.0));
        due.into_iter().map(|entry| entry.task).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_once_their_delay_has_elapsed() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(1000), "late");
        scheduler.schedule(Duration::from_millis(10), "early");

        assert!(scheduler.advance(Duration::from_millis(5)).is_empty());
        assert_eq!(scheduler.advance(Duration::from_millis(5)), vec!["early"]);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(
            scheduler.advance(Duration::from_millis(990)),
            vec!["late"]
        );
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(Duration::from_millis(1), 1);
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.advance(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn due_tasks_come_back_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(30), 3);
        scheduler.schedule(Duration::from_millis(10), 1);
        scheduler.schedule(Duration::from_millis(10), 2);
        assert_eq!(scheduler.advance(Duration::from_millis(30)), vec![1, 2, 3]);
    }
}
