pub mod report;
pub mod scheduler;

pub use report::{ReportOutcome, ReportPipeline, clean_channel_name};
pub use scheduler::{SweepJob, SweepService, SweepStats, activity_digest, sweep_digest};
