//! Core data types for the lofi-scheduler.
//!
//! This module contains the job record and the request/response payloads
//! that flow through the scheduler.

pub mod job;
pub mod output;
pub mod params;

// Re-export all types at module level for convenience
pub use job::{JobError, JobId, JobRecord, JobSnapshot, JobStatus};
pub use output::{GenerationOutput, TrackMetas};
pub use params::{GenerationDefaults, GenerationParams, GenerationRequest};
