use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, extractors::AuthUser},
    blood::{
        dto::{
            CreateBloodRequest, InventoryResponse, InventoryUpdateRequest, ListQuery,
            StatusUpdateRequest,
        },
        repo_types::BloodRequest,
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn blood_routes() -> Router<AppState> {
    Router::new()
        .route("/blood-requests", get(list_requests).post(create_request))
        .route("/blood-requests/:id", get(get_request))
        .route("/blood-requests/:id/status", put(update_status))
        .route(
            "/hospitals/:id/blood-inventory",
            get(get_inventory).put(set_inventory),
        )
        .route("/donors/bloodgroup/:group", get(donors_by_blood_group))
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn create_request(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<CreateBloodRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<BloodRequest>), ApiError> {
    let Json(payload) = payload?;
    let created = services::create_request(&state, &claims, payload).await?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/api/blood-requests/{}", created.id))
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("bad location header: {e}")))?;
    headers.insert(LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(created)))
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn list_requests(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<BloodRequest>>, ApiError> {
    let items =
        services::list_requests(&state, &claims, q.blood_group.as_deref(), q.limit, q.offset)
            .await?;
    Ok(Json(items))
}

#[instrument(skip_all, fields(user_id = %claims.sub, request_id = %id))]
pub async fn get_request(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BloodRequest>, ApiError> {
    Ok(Json(services::get_request(&state, &claims, id).await?))
}

#[instrument(skip_all, fields(user_id = %claims.sub, request_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<BloodRequest>, ApiError> {
    let Json(payload) = payload?;
    Ok(Json(services::update_status(&state, &claims, id, payload).await?))
}

#[instrument(skip_all, fields(user_id = %claims.sub, hospital_id = %hospital_id))]
pub async fn get_inventory(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(hospital_id): Path<Uuid>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let stock = services::get_inventory(&state, hospital_id).await?;
    Ok(Json(InventoryResponse::new(hospital_id, &stock)))
}

#[instrument(skip_all, fields(user_id = %claims.sub, hospital_id = %hospital_id))]
pub async fn set_inventory(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(hospital_id): Path<Uuid>,
    payload: Result<Json<InventoryUpdateRequest>, JsonRejection>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let Json(payload) = payload?;
    let stock = services::set_inventory(&state, &claims, hospital_id, payload).await?;
    Ok(Json(InventoryResponse::new(hospital_id, &stock)))
}

#[instrument(skip_all, fields(user_id = %claims.sub, blood_group = %group))]
pub async fn donors_by_blood_group(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(group): Path<String>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    Ok(Json(services::donors_by_blood_group(&state, &claims, &group).await?))
}
