// Background jobs
pub mod weight_refresh;

pub use weight_refresh::{load_initial_snapshot, spawn, JobError, RunOutcome, WeightRefreshJob};
