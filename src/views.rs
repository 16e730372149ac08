use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, instrument};

use crate::{
    auth::{claims::Role, extractors::session_token, jwt::JwtKeys},
    guard::{authorize, GuardState, View},
    state::AppState,
};

const DONOR_VIEWS: &[&str] = &["dashboard", "alert-settings"];
const HOSPITAL_VIEWS: &[&str] = &["dashboard", "emergency-request"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donor/:view", get(donor_view))
        .route("/hospital/:view", get(hospital_view))
}

#[instrument(skip(keys, headers))]
async fn donor_view(
    State(keys): State<JwtKeys>,
    Path(view): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    guarded(&keys, Role::Donor, DONOR_VIEWS, &view, &uri, &headers)
}

#[instrument(skip(keys, headers))]
async fn hospital_view(
    State(keys): State<JwtKeys>,
    Path(view): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    guarded(&keys, Role::Hospital, HOSPITAL_VIEWS, &view, &uri, &headers)
}

fn guarded(
    keys: &JwtKeys,
    role: Role,
    known: &[&str],
    view: &str,
    uri: &Uri,
    headers: &HeaderMap,
) -> Response {
    if !known.contains(&view) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let state = GuardState::resolve(session_token(headers), keys);
    debug!(user_id = ?state.session().map(|c| c.sub), required = %role, "guard resolved");
    View {
        name: format!("{role}/{view}"),
        access: authorize(&state, Some(role), uri.path()),
    }
    .into_response()
}
