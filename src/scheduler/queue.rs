use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

use crate::stations::StationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Daily recording of a city at a fixed time of day.
    Slot { city: String, time_of_day: NaiveTime },
    /// Recording of a city every `every`, measured from the previous run.
    Repeat { city: String, every: TimeDelta },
    /// One-shot retry of a single station after a failed recording.
    Retry {
        id: StationId,
        raw_url: String,
        city: String,
    },
    StatusReport { every: TimeDelta },
}

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub fire_at: NaiveDateTime,
    seq: u64,
    pub kind: JobKind,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Delayed-job queue keyed by fire time. Jobs due at the same instant come
/// out in insertion order.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: BinaryHeap<Reverse<QueuedJob>>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fire_at: NaiveDateTime, kind: JobKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(QueuedJob { fire_at, seq, kind }));
    }

    pub fn next_fire_at(&self) -> Option<NaiveDateTime> {
        self.heap.peek().map(|Reverse(job)| job.fire_at)
    }

    /// Removes and returns every job due at or before `now`. Jobs pushed
    /// while the caller processes the batch wait for the next drain.
    pub fn drain_due(&mut self, now: NaiveDateTime) -> Vec<QueuedJob> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(job)| job.fire_at <= now)
        {
            if let Some(Reverse(job)) = self.heap.pop() {
                due.push(job);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending jobs in firing order.
    pub fn snapshot(&self) -> Vec<QueuedJob> {
        let mut jobs: Vec<QueuedJob> = self.heap.iter().map(|Reverse(job)| job.clone()).collect();
        jobs.sort();
        jobs
    }

    pub fn pending_retries(&self) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(job)| matches!(job.kind, JobKind::Retry { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn report() -> JobKind {
        JobKind::StatusReport {
            every: TimeDelta::hours(1),
        }
    }

    fn repeat(city: &str) -> JobKind {
        JobKind::Repeat {
            city: city.into(),
            every: TimeDelta::minutes(10),
        }
    }

    #[test]
    fn drains_in_fire_time_order() {
        let mut queue = JobQueue::new();
        queue.push(at(10, 0), repeat("cairo"));
        queue.push(at(8, 0), repeat("riyadh"));
        queue.push(at(12, 0), report());

        assert_eq!(queue.next_fire_at(), Some(at(8, 0)));
        let due = queue.drain_due(at(10, 0));
        let cities: Vec<_> = due
            .iter()
            .map(|job| match &job.kind {
                JobKind::Repeat { city, .. } => city.clone(),
                other => panic!("unexpected job {other:?}"),
            })
            .collect();
        assert_eq!(cities, vec!["riyadh".to_string(), "cairo".to_string()]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn equal_fire_times_keep_insertion_order() {
        let mut queue = JobQueue::new();
        queue.push(at(9, 0), repeat("b"));
        queue.push(at(9, 0), repeat("a"));
        queue.push(at(9, 0), repeat("c"));

        let order: Vec<_> = queue
            .drain_due(at(9, 0))
            .into_iter()
            .map(|job| match job.kind {
                JobKind::Repeat { city, .. } => city,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn nothing_due_before_first_fire_time() {
        let mut queue = JobQueue::new();
        queue.push(at(9, 0), report());
        assert!(queue.drain_due(at(8, 59)).is_empty());
        assert!(!queue.is_empty());
    }

    #[test]
    fn counts_pending_retries() {
        let mut queue = JobQueue::new();
        queue.push(at(9, 0), report());
        queue.push(
            at(9, 5),
            JobKind::Retry {
                id: "x".into(),
                raw_url: "https://x".into(),
                city: "riyadh".into(),
            },
        );
        assert_eq!(queue.pending_retries(), 1);
        assert_eq!(queue.snapshot().len(), 2);
    }
}
