//! JSON-RPC front end for the scheduler.
//!
//! Provides the JSON-RPC 2.0 server implementation for:
//! - `submit` (alias `release_task`): Queue a generation job
//! - `query` (alias `query_result`): Job status, result and ETA
//! - `list_models`: Registered models and the default
//! - `stats`: Queue metrics
//! - `ping`: Health check
//! - `shutdown`: Graceful shutdown

pub mod methods;
pub mod params;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use methods::handle_request;
pub use params::{parse_generation_request, parse_job_ids};
pub use server::{run_server, serve, ServerState};
pub use types::{
    rpc_code, JsonRpcError, JsonRpcErrorData, JsonRpcErrorResponse, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};
