//! Error taxonomy for the API and its HTTP rendering.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{
    auth::{jwt::TokenError, repo::StoreError},
    blood::repo_types::RequestStatus,
};

/// Field name -> message, for input validation failures.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input")]
    Validation(FieldErrors),

    #[error("email or username already registered")]
    IdentityTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("session token expired")]
    TokenExpired,

    #[error("session token malformed")]
    TokenMalformed,

    #[error("role not permitted")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("blood request cannot move from {from} to {to}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },

    #[error("credential store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateIdentity => ApiError::IdentityTaken,
            // A missing record behind a valid token means the session is stale.
            StoreError::NotFound => ApiError::Unauthenticated,
            StoreError::Unavailable(inner) => ApiError::StoreUnavailable(inner),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Malformed => ApiError::TokenMalformed,
            TokenError::Signing(inner) => ApiError::Internal(anyhow::Error::new(inner)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonDataError(_) => rejection.body_text(),
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON".to_string(),
            JsonRejection::MissingJsonContentType(_) => {
                "Content-Type must be application/json".to_string()
            }
            _ => "Request body could not be read".to_string(),
        };
        let mut fields = FieldErrors::new();
        fields.insert("body", message);
        ApiError::Validation(fields)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::IdentityTaken => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::Unauthenticated
            | ApiError::TokenExpired
            | ApiError::TokenMalformed => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Token failures all read the same.
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "Invalid input",
            ApiError::IdentityTaken => "Email or username already registered",
            ApiError::InvalidCredentials => "Invalid credentials",
            ApiError::Unauthenticated | ApiError::TokenExpired | ApiError::TokenMalformed => {
                "Not authenticated"
            }
            ApiError::Forbidden => "Not permitted for this role",
            ApiError::NotFound => "Not found",
            ApiError::InvalidTransition { .. } => "Status change not allowed",
            ApiError::StoreUnavailable(_) => "Service temporarily unavailable, please retry",
            ApiError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::StoreUnavailable(e) => tracing::error!(error = %e, "credential store error"),
            ApiError::Internal(e) => tracing::error!(error = %e, "internal error"),
            _ => {}
        }

        let status = self.status();
        let mut body = json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        });
        if let ApiError::Validation(fields) = &self {
            body["fields"] = json!(fields);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_indistinguishable() {
        let expired = ApiError::from(TokenError::Expired);
        let malformed = ApiError::from(TokenError::Malformed);
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.status(), malformed.status());
        assert_eq!(expired.public_message(), malformed.public_message());
        assert_eq!(expired.public_message(), ApiError::Unauthenticated.public_message());
    }

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert!(matches!(
            ApiError::from(StoreError::DuplicateIdentity),
            ApiError::IdentityTaken
        ));
        let e = ApiError::from(StoreError::Unavailable(anyhow::anyhow!("pool timed out")));
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!e.public_message().contains("pool"));
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::IdentityTaken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Validation(FieldErrors::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        let e = ApiError::InvalidTransition {
            from: RequestStatus::Fulfilled,
            to: RequestStatus::Pending,
        };
        assert_eq!(e.status(), StatusCode::CONFLICT);
        assert_eq!(e.to_string(), "blood request cannot move from fulfilled to pending");
    }
}
