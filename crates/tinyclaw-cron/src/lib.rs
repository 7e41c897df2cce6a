//! TinyClaw scheduler — time-triggered jobs re-entering the agent loop.
//!
//! - [`types`] — job, schedule, payload, state, and store types
//! - [`service::CronService`] — the 1 Hz scheduler daemon

pub mod service;
pub mod types;

pub use service::{CronService, OnJobFn};
pub use types::{
    compute_next_run, CronJob, CronJobState, CronPayload, CronSchedule, CronStore, JobStatus,
    SchedulerParseError,
};
