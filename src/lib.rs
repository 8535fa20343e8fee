//! lofi-scheduler: bounded job scheduling for music generation backends.
//!
//! Clients submit generation requests and poll for results. Jobs wait in a
//! fixed-capacity FIFO queue, run on a pool of worker threads, and are routed
//! to one of up to three registered models. Each query carries a wait
//! estimate based on recent job durations.
//!
//! # Modules
//!
//! - [`scheduler`]: Queue, worker pool, job index, ETA estimator
//! - [`models`]: Generator trait, model registry, built-in backends
//! - [`rpc`]: JSON-RPC 2.0 front end over stdio
//! - [`types`]: Job records, request parameters, generation output
//! - [`config`]: Runtime configuration (SchedulerConfig, ModelSlot)
//! - [`error`]: Error types and codes (DaemonError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lofi_scheduler::{
//!     config::SchedulerConfig,
//!     models::{ModelRegistry, PreviewGenerator},
//!     scheduler::Scheduler,
//!     types::GenerationRequest,
//! };
//!
//! let registry = ModelRegistry::from_slots(
//!     ("lofi-preview".to_string(), Arc::new(PreviewGenerator::new("/tmp/lofi"))),
//!     [],
//! )?;
//! let scheduler = Scheduler::new(SchedulerConfig::default(), registry)?;
//!
//! let receipt = scheduler.submit(GenerationRequest {
//!     caption: Some("lofi hip hop beats to relax to".to_string()),
//!     ..Default::default()
//! })?;
//! let status = scheduler.query(receipt.job_id)?;
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod rpc;
pub mod scheduler;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use config::SchedulerConfig;
pub use error::{DaemonError, ErrorCode, Result};
pub use scheduler::{QueryResult, Scheduler, SubmitReceipt};
pub use types::{GenerationOutput, GenerationRequest, JobId, JobStatus};
