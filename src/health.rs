use spin_sdk::http::Response;

use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::handlers::AppContext;
use crate::store::Store;

pub fn live() -> Result<Response, ApiError> {
    json_response(200, &serde_json::json!({ "status": "ok" }))
}

/// Ready once the store answers a read and a write that is rolled back.
pub fn ready<S: Store>(ctx: &AppContext<S>) -> Result<Response, ApiError> {
    let check = ctx.store.ping().and_then(|_| ctx.store.probe_write());

    match check {
        Ok(()) => json_response(200, &serde_json::json!({ "status": "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            json_response(503, &serde_json::json!({ "status": "unavailable" }))
        }
    }
}
