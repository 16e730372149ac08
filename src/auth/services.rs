use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::Role,
        dto::{LoginRequest, ProfileUpdateRequest, PublicUser, RegisterRequest},
        password,
        repo_types::{NewUser, UserPatch},
    },
    blood::repo_types::BloodGroup,
    error::{ApiError, FieldErrors},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_USERNAME_LEN: usize = 3;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the identifier matches no user, so both failure paths cost a hash.
    static ref DUMMY_HASH: Option<String> =
        match password::hash_password("raktsetu-dummy-password") {
            Ok(hash) => Some(hash),
            Err(e) => {
                error!(error = %e, "dummy password hash unavailable");
                None
            }
        };
}

/// Compute the dummy hash now rather than on the first unknown-user login.
/// Returns whether it is available.
pub fn warm_up() -> bool {
    lazy_static::initialize(&DUMMY_HASH);
    DUMMY_HASH.is_some()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A freshly authenticated user with their session token.
#[derive(Debug)]
pub struct AuthOutcome {
    pub user: PublicUser,
    pub token: String,
}

/// Check every registration field and return the parsed role.
pub fn validate_registration(req: &RegisterRequest) -> Result<Role, ApiError> {
    let mut errors = FieldErrors::new();

    let role = match req.role.as_deref().map(str::trim) {
        None | Some("") => {
            errors.insert("role", "Role is required".into());
            None
        }
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.insert("role", "Role must be donor or hospital".into());
                None
            }
        },
    };

    if req.name.trim().is_empty() {
        errors.insert("name", "Name is required".into());
    }

    let username = req.username.trim();
    if username.is_empty() {
        errors.insert("username", "Username is required".into());
    } else if username.chars().count() < MIN_USERNAME_LEN {
        errors.insert(
            "username",
            format!("Username must be at least {MIN_USERNAME_LEN} characters"),
        );
    } else if username.contains('@') {
        errors.insert("username", "Username must not contain '@'".into());
    }

    let email = normalize_email(&req.email);
    if email.is_empty() {
        errors.insert("email", "Email is required".into());
    } else if !is_valid_email(&email) {
        errors.insert("email", "Email is invalid".into());
    }

    if req.password.is_empty() {
        errors.insert("password", "Password is required".into());
    } else if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }

    if let Some(confirm) = &req.confirm_password {
        if confirm != &req.password {
            errors.insert("confirmPassword", "Passwords do not match".into());
        }
    }

    match role {
        Some(role) if errors.is_empty() => Ok(role),
        _ => Err(ApiError::Validation(errors)),
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if req.identifier().is_empty() {
        errors.insert("identifier", "Email or username is required".into());
    }
    if req.password.is_empty() {
        errors.insert("password", "Password is required".into());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Validate a profile update and turn it into a store patch.
///
/// `bloodGroup` is rewritten to its canonical spelling so donor lookups can
/// match it exactly; `isAvailable` must be a boolean.
pub fn validate_profile_update(req: ProfileUpdateRequest) -> Result<UserPatch, ApiError> {
    let mut errors = FieldErrors::new();

    let name = req.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        errors.insert("name", "Name must not be blank".into());
    }

    let mut profile = req.profile;
    if let Some(profile) = profile.as_mut() {
        if let Some(value) = profile.get_mut("bloodGroup") {
            match value.as_str().map(str::parse::<BloodGroup>) {
                Some(Ok(group)) => *value = Value::from(group.as_str()),
                _ => {
                    errors.insert("profile.bloodGroup", "Unknown blood group".into());
                }
            }
        }
        if let Some(value) = profile.get("isAvailable") {
            if !value.is_boolean() {
                errors.insert("profile.isAvailable", "Must be true or false".into());
            }
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(UserPatch {
        name,
        profile,
        is_verified: None,
    })
}

/// Create the account and sign the user in. Uniqueness is left to the store's insert.
pub async fn register(st: &AppState, req: RegisterRequest) -> Result<AuthOutcome, ApiError> {
    let role = validate_registration(&req)?;

    let password_hash = password::hash_password_blocking(req.password).await?;
    let user = st
        .store
        .insert(NewUser {
            email: normalize_email(&req.email),
            username: req.username.trim().to_string(),
            password_hash,
            name: req.name.trim().to_string(),
            role,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "registration rejected by store");
            ApiError::from(e)
        })?;

    let token = st.keys.issue_for(&user)?;
    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(AuthOutcome {
        user: user.into(),
        token,
    })
}

/// Resolve the identifier as an email or a username, then check the password.
///
/// Every failure that is the caller's fault is reported as [`ApiError::InvalidCredentials`].
pub async fn login(st: &AppState, req: LoginRequest) -> Result<AuthOutcome, ApiError> {
    validate_login(&req)?;

    let identifier = req.identifier();
    let found = if identifier.contains('@') {
        st.store.find_by_email(&normalize_email(identifier)).await?
    } else {
        st.store.find_by_username(identifier).await?
    };

    let user = match found {
        Some(u) => u,
        None => {
            if let Some(dummy) = DUMMY_HASH.as_ref() {
                password::verify_password_blocking(req.password, dummy.clone()).await;
            }
            warn!("login for unknown identifier");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !password::verify_password_blocking(req.password, user.password_hash.clone()).await {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = st.keys.issue_for(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(AuthOutcome {
        user: user.into(),
        token,
    })
}

/// Load the current record for an authenticated subject.
pub async fn current_user(st: &AppState, user_id: Uuid) -> Result<PublicUser, ApiError> {
    let user = st
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(user.into())
}

/// Merge the supplied fields into the stored record and reissue the session token.
pub async fn update_profile(
    st: &AppState,
    user_id: Uuid,
    req: ProfileUpdateRequest,
) -> Result<AuthOutcome, ApiError> {
    let patch = validate_profile_update(req)?;
    let user = if patch.is_empty() {
        st.store
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::Unauthenticated)?
    } else {
        st.store.update(user_id, patch).await?
    };

    let token = st.keys.issue_for(&user)?;
    info!(user_id = %user.id, "profile updated");
    Ok(AuthOutcome {
        user: user.into(),
        token,
    })
}
