//! JSON-RPC method handlers.
//!
//! Implements the handlers for all supported JSON-RPC methods.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::params::{parse_generation_request, parse_job_ids};
use super::server::ServerState;
use super::types::JsonRpcError;

/// Handles a JSON-RPC method call.
pub fn handle_request(
    method: &str,
    params: Value,
    state: &ServerState,
) -> Result<Value, JsonRpcError> {
    match method {
        "submit" | "release_task" => handle_submit(&params, state),
        "query" | "query_result" => handle_query(&params, state),
        "list_models" => handle_list_models(state),
        "stats" => to_value(state.scheduler().stats()),
        "ping" => handle_ping(),
        "shutdown" => handle_shutdown(state),
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Handles the ping method for health checks.
fn handle_ping() -> Result<Value, JsonRpcError> {
    Ok(serde_json::json!({ "status": "ok" }))
}

/// Handles the shutdown method.
fn handle_shutdown(state: &ServerState) -> Result<Value, JsonRpcError> {
    state.shutdown();
    Ok(serde_json::json!({ "status": "shutting_down" }))
}

/// Handles the submit method.
fn handle_submit(params: &Value, state: &ServerState) -> Result<Value, JsonRpcError> {
    let request = parse_generation_request(params)?;
    debug!(model = request.model.as_deref().unwrap_or(""), "Submit request");
    let receipt = state.scheduler().submit(request)?;
    to_value(receipt)
}

/// Handles the query method.
///
/// A single `job_id` returns one result or a `JOB_NOT_FOUND` error. A
/// `job_ids` list returns one entry per id, with an inline error for ids
/// that are unknown.
fn handle_query(params: &Value, state: &ServerState) -> Result<Value, JsonRpcError> {
    let (ids, many) = parse_job_ids(params)?;
    let scheduler = state.scheduler();

    if !many {
        let Some(id) = ids.first() else {
            return Err(JsonRpcError::internal_error("no job id parsed"));
        };
        return to_value(scheduler.query(*id)?);
    }

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let entry = match scheduler.query(id) {
            Ok(result) => to_value(result)?,
            Err(err) => serde_json::json!({
                "job_id": id,
                "status": "not_found",
                "error": { "code": err.code, "message": err.message },
            }),
        };
        results.push(entry);
    }
    Ok(Value::Array(results))
}

/// Handles the list_models method.
fn handle_list_models(state: &ServerState) -> Result<Value, JsonRpcError> {
    let models = state.scheduler().list_models();
    let default_model = models
        .iter()
        .find(|m| m.is_default)
        .map(|m| m.name.clone());
    Ok(serde_json::json!({
        "models": models,
        "default_model": default_model,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::models::{GenerationError, Generator, ModelRegistry};
    use crate::scheduler::Scheduler;
    use crate::types::{GenerationOutput, GenerationParams, JobId};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct Echo;

    impl Generator for Echo {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn generate(
            &self,
            params: &GenerationParams,
        ) -> std::result::Result<GenerationOutput, GenerationError> {
            Ok(GenerationOutput {
                audio_paths: vec![format!("/out/{}.wav", params.seed)],
                ..Default::default()
            })
        }
    }

    fn test_state() -> ServerState {
        let registry = ModelRegistry::from_slots(
            ("turbo".to_string(), Arc::new(Echo) as Arc<dyn Generator>),
            [("base".to_string(), Arc::new(Echo) as Arc<dyn Generator>)],
        )
        .unwrap();
        let scheduler = Scheduler::new(SchedulerConfig::default(), registry).unwrap();
        ServerState::new(Arc::new(scheduler))
    }

    fn wait_done(state: &ServerState, id: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let result = handle_request("query", json!({ "job_id": id }), state).unwrap();
            if result["status"] == "succeeded" || result["status"] == "failed" {
                return result;
            }
            assert!(Instant::now() < deadline, "job did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn ping_returns_ok() {
        let result = handle_ping().unwrap();
        assert_eq!(result["status"], "ok");
    }

    #[test]
    fn unknown_method() {
        let err = handle_request("generate", Value::Null, &test_state()).unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn submit_then_query() {
        let state = test_state();
        let receipt = handle_request(
            "release_task",
            json!({ "prompt": "lofi", "audioDuration": "10", "seed": 3 }),
            &state,
        )
        .unwrap();
        assert_eq!(receipt["status"], "queued");
        let id = receipt["job_id"].as_str().unwrap().to_string();

        let done = wait_done(&state, &id);
        assert_eq!(done["status"], "succeeded");
        assert_eq!(done["result"]["audio_paths"][0], "/out/3.wav");
        assert_eq!(done["result"]["model"], "turbo");
        assert_eq!(done["params"]["duration_sec"], 10.0);
        assert_eq!(done["eta_seconds"], 0.0);
        assert!(done["avg_job_seconds"].is_number());
    }

    #[test]
    fn submit_invalid_params() {
        let err = handle_request("submit", json!({ "caption": "" }), &test_state()).unwrap_err();
        assert_eq!(err.code, -32602);
        assert_eq!(err.data.unwrap().error_code, "INVALID_PARAMS");
    }

    #[test]
    fn query_unknown_job() {
        let err = handle_request(
            "query",
            json!({ "job_id": JobId::new().to_string() }),
            &test_state(),
        )
        .unwrap_err();
        assert_eq!(err.code, -32007);
    }

    #[test]
    fn batch_query_marks_missing_ids() {
        let state = test_state();
        let receipt = handle_request("submit", json!({ "caption": "a" }), &state).unwrap();
        let known = receipt["job_id"].as_str().unwrap().to_string();
        let unknown = JobId::new().to_string();

        let result = handle_request(
            "query_result",
            json!({ "task_id_list": [known.clone(), unknown.clone()] }),
            &state,
        )
        .unwrap();
        let items = result.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["job_id"], known);
        assert_eq!(items[1]["job_id"], unknown);
        assert_eq!(items[1]["status"], "not_found");
        assert_eq!(items[1]["error"]["code"], "JOB_NOT_FOUND");
    }

    #[test]
    fn list_models_marks_default() {
        let result = handle_request("list_models", Value::Null, &test_state()).unwrap();
        assert_eq!(result["default_model"], "turbo");
        let models = result["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["is_default"], true);
        assert_eq!(models[1]["name"], "base");
        assert_eq!(models[1]["is_default"], false);
    }

    #[test]
    fn stats_reports_capacity() {
        let result = handle_request("stats", Value::Null, &test_state()).unwrap();
        assert_eq!(result["capacity"], 200);
        assert_eq!(result["workers"], 1);
    }

    #[test]
    fn shutdown_sets_flag() {
        let state = test_state();
        handle_request("shutdown", Value::Null, &state).unwrap();
        assert!(state.is_shutdown());
    }
}
