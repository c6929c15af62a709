//! Pipeline stage statistics (C14).
//!
//! A live, process-wide gauge of per-stage success/failure counts, distinct
//! from the Audit Trail (C11): this is an aggregate snapshot for external
//! scraping, not a per-task durable record.

use crate::policy::Stage;
use std::collections::HashMap;
use std::sync::RwLock;

/// Outcome recorded for a single stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Fail,
}

/// Success/fail counters for one stage.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StageCounts {
    pub success: u64,
    pub fail: u64,
}

/// Lock-protected per-stage counters, pre-seeded with all five stages.
pub struct PipelineStats {
    counts: RwLock<HashMap<Stage, StageCounts>>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        let mut counts = HashMap::new();
        for stage in Stage::ALL {
            counts.insert(stage, StageCounts::default());
        }
        Self {
            counts: RwLock::new(counts),
        }
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one stage execution.
    pub fn inc(&self, stage: Stage, outcome: StageOutcome) {
        let mut counts = self.counts.write().expect("pipeline stats lock poisoned");
        let entry = counts.entry(stage).or_default();
        match outcome {
            StageOutcome::Success => entry.success += 1,
            StageOutcome::Fail => entry.fail += 1,
        }
    }

    /// A shallow copy of the current counters, safe to hand to an external
    /// scraper.
    pub fn snapshot(&self) -> HashMap<Stage, StageCounts> {
        self.counts.read().expect("pipeline stats lock poisoned").clone()
    }
}
