//! Role gate for protected views.
//!
//! A guard starts `Unresolved`, becomes `Authenticated` or `Unauthenticated`
//! once the session token has been checked, and [`authorize`] turns that state
//! plus the view's required role into a render/redirect decision.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::auth::{
    claims::{Claims, Role},
    jwt::JwtKeys,
};

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GuardState {
    /// Token check still in flight.
    #[default]
    Unresolved,
    Authenticated(Claims),
    Unauthenticated,
}

impl GuardState {
    /// Check the stored token. Any failure, including a missing token, resolves to `Unauthenticated`.
    pub fn resolve(token: Option<&str>, keys: &JwtKeys) -> Self {
        match token.map(|t| keys.verify(t)) {
            Some(Ok(claims)) => GuardState::Authenticated(claims),
            Some(Err(e)) => {
                debug!(error = %e, "guard: stored token rejected");
                GuardState::Unauthenticated
            }
            None => GuardState::Unauthenticated,
        }
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<&Claims> {
        match self {
            GuardState::Authenticated(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Resolution incomplete; show nothing protected.
    Pending,
    Render(Claims),
    Redirect(String),
}

/// Decide what a view requiring `required` shows to a visitor in `state`.
///
/// `origin` is the requested path, preserved on the login redirect.
pub fn authorize(state: &GuardState, required: Option<Role>, origin: &str) -> Access {
    match state {
        GuardState::Unresolved => Access::Pending,
        GuardState::Unauthenticated => Access::Redirect(login_redirect(origin)),
        GuardState::Authenticated(claims) => match required {
            Some(role) if claims.role != role => {
                Access::Redirect(claims.role.landing_path().to_string())
            }
            _ => Access::Render(claims.clone()),
        },
    }
}

fn login_redirect(origin: &str) -> String {
    if origin.is_empty() || origin == "/" {
        LOGIN_PATH.to_string()
    } else {
        format!("{LOGIN_PATH}?from={origin}")
    }
}

/// Rendered body for a permitted view.
pub struct View {
    pub name: String,
    pub access: Access,
}

impl IntoResponse for View {
    fn into_response(self) -> Response {
        match self.access {
            Access::Pending => (StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response(),
            Access::Redirect(to) => Redirect::to(&to).into_response(),
            Access::Render(claims) => Json(json!({
                "view": self.name,
                "user": {
                    "id": claims.sub,
                    "email": claims.email,
                    "name": claims.name,
                    "role": claims.role,
                },
            }))
            .into_response(),
        }
    }
}
