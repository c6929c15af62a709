//! Governance: Call Tracker (C2), Violation Log (C3), Policy Enforcer (C4),
//! and the per-task governance state they operate on.

pub mod enforcer;
pub mod state;
pub mod tracker;
pub mod violations;

pub use enforcer::{GovernanceEnforcer, GovernanceSummary, TransformerDecision, TransformerMethod};
pub use state::{PromptClass, TaskGovernanceState};
pub use tracker::{CallTracker, CorpusRateTracker};
pub use violations::{ViolationLog, ViolationRecord};
