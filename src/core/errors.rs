use spin_sdk::http::Response;
use thiserror::Error;

use crate::security::{CredentialError, Denied, TokenError};
use crate::store::StoreError;

/// Everything a handler can fail with, already sorted into the status the
/// client will see. `Unauthorized` and `Forbidden` carry no detail on
/// purpose: the body never says which check failed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalError(_) => 500,
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => {
                msg.clone()
            }
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Forbidden => "Forbidden".to_string(),
            // Internal details go to the log, not to the client.
            ApiError::InternalError(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        let body = serde_json::json!({ "error": err.client_message() });
        Response::builder()
            .status(err.status())
            .header("Content-Type", "application/json")
            .body(body.to_string().into_bytes())
            .build()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing => ApiError::InternalError(err.to_string()),
            TokenError::Invalid | TokenError::Expired | TokenError::Missing => {
                tracing::debug!(reason = %err, "rejected bearer token");
                ApiError::Unauthorized
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::SecretTooLong => {
                ApiError::BadRequest("Password must be at most 72 bytes".to_string())
            }
            CredentialError::Hashing(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<Denied> for ApiError {
    fn from(err: Denied) -> Self {
        tracing::debug!(reason = %err, "request denied by policy");
        match err {
            Denied::Forbidden => ApiError::Forbidden,
            Denied::BadCredentials => ApiError::Unauthorized,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StoreError::AlreadyLiked => ApiError::Conflict(err.to_string()),
            StoreError::Duplicate(what) => ApiError::Conflict(format!("{} already in use", what)),
            StoreError::SelfFollow => ApiError::Forbidden,
            StoreError::Storage(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_indistinguishable_to_clients() {
        for err in [TokenError::Invalid, TokenError::Expired, TokenError::Missing] {
            let api: ApiError = err.into();
            assert_eq!(api.status(), 401);
            assert_eq!(api.client_message(), "Unauthorized");
        }
    }

    #[test]
    fn policy_denials_carry_no_detail() {
        let forbidden: ApiError = Denied::Forbidden.into();
        assert_eq!(forbidden.status(), 403);
        assert_eq!(forbidden.client_message(), "Forbidden");

        let bad_pass: ApiError = Denied::BadCredentials.into();
        assert_eq!(bad_pass.status(), 401);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(ApiError::from(StoreError::AlreadyLiked).status(), 409);
        assert_eq!(ApiError::from(StoreError::Duplicate("nick")).status(), 409);
        assert_eq!(ApiError::from(StoreError::NotFound("user")).status(), 404);
        assert_eq!(ApiError::from(StoreError::SelfFollow).status(), 403);
        assert_eq!(ApiError::from(StoreError::Storage("disk".into())).status(), 500);
    }

    #[test]
    fn internal_details_are_not_sent() {
        let err = ApiError::from(StoreError::Storage("table users is locked".into()));
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn secret_too_long_is_a_validation_error() {
        assert_eq!(ApiError::from(CredentialError::SecretTooLong).status(), 400);
    }
}
