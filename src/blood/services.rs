use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::{Claims, Role},
        dto::PublicUser,
    },
    blood::{
        dto::{CreateBloodRequest, InventoryUpdateRequest, StatusUpdateRequest},
        repo_types::{
            BloodGroup, BloodRequest, Inventory, NewBloodRequest, RequestFilter, RequestStatus,
            Urgency,
        },
    },
    error::{ApiError, FieldErrors},
    state::AppState,
};

pub const MAX_REQUEST_UNITS: i32 = 50;
pub const MAX_STOCK_UNITS: i32 = 10_000;
pub const MAX_PAGE: i64 = 100;

pub fn require_role(claims: &Claims, role: Role) -> Result<(), ApiError> {
    if claims.role == role {
        Ok(())
    } else {
        warn!(user_id = %claims.sub, role = %claims.role, required = %role, "role check failed");
        Err(ApiError::Forbidden)
    }
}

fn parse_group(raw: Option<&str>, errors: &mut FieldErrors) -> Option<BloodGroup> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            errors.insert("bloodGroup", "Blood group is required".into());
            None
        }
        Some(raw) => match raw.parse() {
            Ok(group) => Some(group),
            Err(_) => {
                errors.insert("bloodGroup", "Unknown blood group".into());
                None
            }
        },
    }
}

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub fn validate_create(
    claims: &Claims,
    req: CreateBloodRequest,
) -> Result<NewBloodRequest, ApiError> {
    let mut errors = FieldErrors::new();

    let patient_name = req.patient_name.trim().to_string();
    if patient_name.is_empty() {
        errors.insert("patientName", "Patient name is required".into());
    }

    let blood_group = parse_group(req.blood_group.as_deref(), &mut errors);

    match req.required_units {
        None => {
            errors.insert("requiredUnits", "Required units is required".into());
        }
        Some(n) if !(1..=MAX_REQUEST_UNITS).contains(&n) => {
            errors.insert(
                "requiredUnits",
                format!("Required units must be between 1 and {MAX_REQUEST_UNITS}"),
            );
        }
        Some(_) => {}
    }

    let urgency = req.urgency.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let urgency: Option<Urgency> = match urgency {
        None => Some(Urgency::default()),
        Some(raw) => match raw.parse() {
            Ok(u) => Some(u),
            Err(_) => {
                errors.insert("urgency", "Urgency must be low, medium or high".into());
                None
            }
        },
    };

    match (blood_group, req.required_units, urgency) {
        (Some(blood_group), Some(required_units), Some(urgency)) if errors.is_empty() => {
            Ok(NewBloodRequest {
                hospital_id: claims.sub,
                hospital_name: claims.name.clone(),
                patient_name,
                blood_group,
                required_units,
                urgency,
                notes: clean_notes(req.notes),
            })
        }
        _ => Err(ApiError::Validation(errors)),
    }
}

/// Raise a new request on behalf of the calling hospital. It starts `pending`.
pub async fn create_request(
    st: &AppState,
    claims: &Claims,
    req: CreateBloodRequest,
) -> Result<BloodRequest, ApiError> {
    require_role(claims, Role::Hospital)?;
    let new = validate_create(claims, req)?;
    let created = st.blood.insert_request(new).await?;
    info!(
        request_id = %created.id,
        hospital_id = %created.hospital_id,
        blood_group = %created.blood_group,
        units = created.required_units,
        "blood request created"
    );
    Ok(created)
}

/// Hospitals see their own requests; donors see open ones, optionally for one group.
pub async fn list_requests(
    st: &AppState,
    claims: &Claims,
    blood_group: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<BloodRequest>, ApiError> {
    let filter = match claims.role {
        Role::Hospital => RequestFilter::Hospital(claims.sub),
        Role::Donor => {
            let group = match blood_group.map(str::trim).filter(|s| !s.is_empty()) {
                None => None,
                Some(raw) => {
                    let mut errors = FieldErrors::new();
                    let group = parse_group(Some(raw), &mut errors);
                    if group.is_none() {
                        return Err(ApiError::Validation(errors));
                    }
                    group
                }
            };
            RequestFilter::Open(group)
        }
    };
    let requests = st
        .blood
        .list_requests(filter, limit.clamp(1, MAX_PAGE), offset.max(0))
        .await?;
    Ok(requests)
}

/// A hospital may read its own requests; a donor may read any open one.
pub async fn get_request(
    st: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<BloodRequest, ApiError> {
    let req = st.blood.find_request(id).await?.ok_or(ApiError::NotFound)?;
    let visible = match claims.role {
        Role::Hospital => req.hospital_id == claims.sub,
        Role::Donor => req.status.is_open(),
    };
    if visible {
        Ok(req)
    } else {
        Err(ApiError::NotFound)
    }
}

/// Move one of the caller's requests along its lifecycle.
///
/// Requests owned by another hospital answer 404. A change that the lifecycle
/// forbids, or that loses a race with another update, answers 409.
pub async fn update_status(
    st: &AppState,
    claims: &Claims,
    id: Uuid,
    req: StatusUpdateRequest,
) -> Result<BloodRequest, ApiError> {
    require_role(claims, Role::Hospital)?;

    let next = match req.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Err("Status is required"),
        Some(raw) => raw
            .parse::<RequestStatus>()
            .map_err(|_| "Status must be pending, approved, rejected or fulfilled"),
    };
    let next = next.map_err(|msg| {
        let mut errors = FieldErrors::new();
        errors.insert("status", msg.into());
        ApiError::Validation(errors)
    })?;

    let current = st
        .blood
        .find_request(id)
        .await?
        .filter(|r| r.hospital_id == claims.sub)
        .ok_or(ApiError::NotFound)?;

    if !current.status.can_move_to(next) {
        return Err(ApiError::InvalidTransition {
            from: current.status,
            to: next,
        });
    }

    let updated = st
        .blood
        .transition(id, current.status, next, clean_notes(req.notes))
        .await?;
    match updated {
        Some(updated) => {
            info!(request_id = %id, from = %current.status, to = %next, "request status changed");
            Ok(updated)
        }
        None => {
            warn!(request_id = %id, "blood request changed concurrently");
            Err(ApiError::InvalidTransition {
                from: current.status,
                to: next,
            })
        }
    }
}

/// Inventory of a hospital account. Unknown ids and donor ids answer 404.
pub async fn get_inventory(st: &AppState, hospital_id: Uuid) -> Result<Inventory, ApiError> {
    let is_hospital = st
        .store
        .find_by_id(hospital_id)
        .await?
        .is_some_and(|u| u.role == Role::Hospital);
    if !is_hospital {
        return Err(ApiError::NotFound);
    }
    Ok(st.blood.inventory(hospital_id).await?)
}

/// Set the units on hand for one group. Only the hospital itself may do so.
pub async fn set_inventory(
    st: &AppState,
    claims: &Claims,
    hospital_id: Uuid,
    req: InventoryUpdateRequest,
) -> Result<Inventory, ApiError> {
    require_role(claims, Role::Hospital)?;
    if claims.sub != hospital_id {
        warn!(user_id = %claims.sub, %hospital_id, "inventory update for another hospital");
        return Err(ApiError::Forbidden);
    }

    let mut errors = FieldErrors::new();
    let group = parse_group(req.blood_group.as_deref(), &mut errors);
    match req.units {
        None => {
            errors.insert("units", "Units is required".into());
        }
        Some(n) if !(0..=MAX_STOCK_UNITS).contains(&n) => {
            errors.insert("units", format!("Units must be between 0 and {MAX_STOCK_UNITS}"));
        }
        Some(_) => {}
    }
    let (Some(group), Some(units), true) = (group, req.units, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };

    let inventory = st.blood.set_units(hospital_id, group, units).await?;
    info!(%hospital_id, blood_group = %group, units, "inventory updated");
    Ok(inventory)
}

/// Available donors with a given blood group, for hospitals.
pub async fn donors_by_blood_group(
    st: &AppState,
    claims: &Claims,
    blood_group: &str,
) -> Result<Vec<PublicUser>, ApiError> {
    require_role(claims, Role::Hospital)?;
    let mut errors = FieldErrors::new();
    let Some(group) = parse_group(Some(blood_group), &mut errors) else {
        return Err(ApiError::Validation(errors));
    };
    let donors = st.store.list_donors_by_blood_group(group).await?;
    Ok(donors.into_iter().map(PublicUser::from).collect())
}
