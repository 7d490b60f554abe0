// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`job`] defines job identity, details, the `RcJob` state machine and
//!   job outcomes.
//! - [`runner`] drives one job: grace period, exclusive-lock wait,
//!   fingerprint settling, builder dispatch and product placement.
//! - [`executor_loop`] runs jobs concurrently on a bounded worker pool and
//!   reports outcomes to the runtime.
//! - [`backend`] provides the `JobExecutor` trait and `RealJobExecutor`;
//!   tests replace it with a fake.

pub mod backend;
pub mod executor_loop;
pub mod job;
pub mod runner;

pub use backend::{JobExecutor, RealJobExecutor};
pub use executor_loop::{effective_concurrency, spawn_executor, ExecutorContext};
pub use job::{JobDetails, JobEntry, JobOutcome, JobState, PlacedProduct, RcJob};
pub use runner::{run_job, temp_root_for, RunnerSettings};
