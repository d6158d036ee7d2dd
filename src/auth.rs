use spin_sdk::http::{Request, Response};

use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, read_json};
use crate::handlers::AppContext;
use crate::models::{Credentials, UserId};
use crate::security::credentials::{dummy_digest, verify};
use crate::security::tokens::bearer_token;
use crate::store::Store;

/// Resolves the caller from `Authorization: Bearer <token>`.
pub fn authenticate<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<UserId, ApiError> {
    let header = req.header("Authorization").and_then(|h| h.as_str());
    let token = bearer_token(header)?;
    Ok(ctx.tokens.validate(token)?)
}

pub fn login_user<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let creds: Credentials = read_json(req)?;
    let email = creds.email.trim();

    if email.is_empty() || creds.pass.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".to_string()));
    }

    let identity = match ctx.store.credential_by_email(email)? {
        Some(stored) if verify(&stored.digest, &creds.pass) => stored.id,
        Some(stored) => {
            tracing::info!(user_id = stored.id, "login rejected");
            return Err(ApiError::Unauthorized);
        }
        None => {
            // Same amount of work as a wrong password.
            if let Some(digest) = dummy_digest() {
                let _ = verify(digest, &creds.pass);
            }
            tracing::info!("login rejected");
            return Err(ApiError::Unauthorized);
        }
    };

    let token = ctx.tokens.issue(identity)?;
    tracing::info!(user_id = identity, "login succeeded");

    json_response(200, &serde_json::json!({
        "token": token,
        "user_id": identity,
    }))
}
