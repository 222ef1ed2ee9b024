//! Lead distribution logic for LeadDesk.
//!
//! `distributor` holds the pure quota-aware round-robin computation,
//! `window` the daily quota window, and `run` the orchestration that reads
//! state from storage and commits assignments.

pub mod distributor;
pub mod run;
pub mod window;

pub use distributor::{compute_assignments, remaining_quota};
pub use run::{
    AssignmentStore, DistributeOptions, DistributionOutcome, DistributionReport,
    ProgressReporter, SilentProgress, distribute_all, distribute_group,
};
pub use window::{DayWindow, assignment_counts};
