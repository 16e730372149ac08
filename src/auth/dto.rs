use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    claims::Role,
    repo_types::{Profile, User},
};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Parsed during validation so an unknown role is reported as a field error.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub username: String,
}

/// Request body for login.
///
/// Clients send one of `identifier`, `email` or `username`; the first non-blank
/// one wins. It is treated as an email when it contains `@`, else a username.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    pub fn identifier(&self) -> &str {
        [&self.identifier, &self.email, &self.username]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

/// Request body for a profile update. Verification status is not client-settable;
/// unknown keys such as `isVerified` are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub profile: Option<Profile>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub profile: Profile,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            name: u.name,
            role: u.role,
            profile: u.profile,
            is_verified: u.is_verified,
            created_at: u.created_at,
        }
    }
}

/// Response returned after register, login or profile update.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub is_authenticated: bool,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
