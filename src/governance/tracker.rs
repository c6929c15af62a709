//! Call Tracker (C2).
//!
//! Concurrency-safe mapping `task_id -> stage -> calls made`, plus a
//! companion corpus-query rate tracker used by
//! [`crate::governance::enforcer::GovernanceEnforcer::validate_corpus_access`].
//! Both guarantee no lost updates under concurrent access to the same task,
//! even though the pipeline driver never actually runs two stages of one
//! task concurrently.

use crate::policy::{Corpus, Stage};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-task, per-stage counter of external model calls.
#[derive(Default)]
pub struct CallTracker {
    counts: Mutex<HashMap<(uuid::Uuid, Stage), u32>>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, task: uuid::Uuid, stage: Stage) -> u32 {
        *self
            .counts
            .lock()
            .expect("call tracker lock poisoned")
            .get(&(task, stage))
            .unwrap_or(&0)
    }

    /// Atomically check `count < max` and increment on pass. Returns the new
    /// count on success, or the current (unchanged) count on failure.
    pub fn try_increment(&self, task: uuid::Uuid, stage: Stage, max: u32) -> Result<u32, u32> {
        let mut counts = self.counts.lock().expect("call tracker lock poisoned");
        let current = counts.entry((task, stage)).or_insert(0);
        if *current >= max {
            Err(*current)
        } else {
            *current += 1;
            Ok(*current)
        }
    }

    pub fn reset(&self, task: uuid::Uuid) {
        let mut counts = self.counts.lock().expect("call tracker lock poisoned");
        counts.retain(|(t, _), _| *t != task);
    }
}

/// Per-task, per-stage, per-corpus sliding-window query timestamps, used to
/// enforce the corpus query rate limit (default 10/min, configurable per the
/// catalog — Open Question 1).
#[derive(Default)]
pub struct CorpusRateTracker {
    timestamps: Mutex<HashMap<(uuid::Uuid, Stage, Corpus), Vec<Instant>>>,
}

impl CorpusRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a query attempt and report whether it is within the
    /// `limit_per_min` window. Expired timestamps are pruned on each call.
    pub fn check_and_record(
        &self,
        task: uuid::Uuid,
        stage: Stage,
        corpus: Corpus,
        limit_per_min: u32,
    ) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut timestamps = self.timestamps.lock().expect("rate tracker lock poisoned");
        let entry = timestamps.entry((task, stage, corpus)).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() as u32 >= limit_per_min {
            false
        } else {
            entry.push(now);
            true
        }
    }

    pub fn reset(&self, task: uuid::Uuid) {
        let mut timestamps = self.timestamps.lock().expect("rate tracker lock poisoned");
        timestamps.retain(|(t, _, _), _| *t != task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_increment_succeeds_up_to_max_then_fails() {
        let tracker = CallTracker::new();
        let task = uuid::Uuid::new_v4();
        assert_eq!(tracker.try_increment(task, Stage::Drafter, 1), Ok(1));
        assert_eq!(tracker.try_increment(task, Stage::Drafter, 1), Err(1));
        assert_eq!(tracker.count(task, Stage::Drafter), 1);
    }

    #[test]
    fn stages_and_tasks_are_independent() {
        let tracker = CallTracker::new();
        let task_a = uuid::Uuid::new_v4();
        let task_b = uuid::Uuid::new_v4();
        tracker.try_increment(task_a, Stage::Ideator, 2).unwrap();
        assert_eq!(tracker.count(task_a, Stage::Drafter), 0);
        assert_eq!(tracker.count(task_b, Stage::Ideator), 0);
    }

    #[test]
    fn reset_clears_all_stages_for_a_task() {
        let tracker = CallTracker::new();
        let task = uuid::Uuid::new_v4();
        tracker.try_increment(task, Stage::Ideator, 2).unwrap();
        tracker.reset(task);
        assert_eq!(tracker.count(task, Stage::Ideator), 0);
    }

    #[test]
    fn corpus_rate_tracker_allows_exactly_the_limit() {
        let tracker = CorpusRateTracker::new();
        let task = uuid::Uuid::new_v4();
        for _ in 0..10 {
            assert!(tracker.check_and_record(task, Stage::Ideator, Corpus::Personal, 10));
        }
        assert!(!tracker.check_and_record(task, Stage::Ideator, Corpus::Personal, 10));
    }

    #[test]
    fn corpus_rate_tracker_is_independent_per_corpus() {
        let tracker = CorpusRateTracker::new();
        let task = uuid::Uuid::new_v4();
        for _ in 0..10 {
            tracker.check_and_record(task, Stage::Ideator, Corpus::Personal, 10);
        }
        assert!(tracker.check_and_record(task, Stage::Ideator, Corpus::Social, 10));
    }
}
