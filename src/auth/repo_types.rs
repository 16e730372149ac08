use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::Role;

/// Open attribute mapping attached to a user (blood group, location, phone...).
pub type Profile = serde_json::Map<String, serde_json::Value>;

/// User record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,                     // immutable, assigned on insert
    pub email: String,                // unique, lower-cased
    pub username: String,             // unique
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, never exposed in JSON
    pub name: String,
    pub role: Role,
    pub profile: Profile,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,   // immutable
}

/// Fields supplied at registration; the store assigns `id`, `created_at` and `is_verified`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

/// Partial update. `None` leaves a field alone; `profile` merges key-wise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub profile: Option<Profile>,
    pub is_verified: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.profile.is_none() && self.is_verified.is_none()
    }

    /// Apply the patch to an in-memory record.
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(profile) = &self.profile {
            for (k, v) in profile {
                user.profile.insert(k.clone(), v.clone());
            }
        }
        if let Some(v) = self.is_verified {
            user.is_verified = v;
        }
    }
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub profile: Json<Profile>,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse()?,
            profile: row.profile.0,
            is_verified: row.is_verified,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
impl User {
    pub(crate) fn sample(username: &str, email: &str, role: Role) -> Self {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            username: username.into(),
            password_hash: String::new(),
            name: username.into(),
            role,
            profile: Profile::new(),
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
