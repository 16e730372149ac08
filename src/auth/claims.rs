use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::User;

/// Fixed session lifetime. Not configurable per call.
pub const SESSION_TTL: Duration = Duration::days(7);

/// Account role; decides which dashboard a user lands on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Donor")]
    Donor,
    #[serde(alias = "Hospital")]
    Hospital,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::Hospital => "hospital",
        }
    }

    /// Landing view for this role.
    pub fn landing_path(self) -> &'static str {
        match self {
            Role::Donor => "/donor/dashboard",
            Role::Hospital => "/hospital/dashboard",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "donor" => Ok(Role::Donor),
            "hospital" => Ok(Role::Hospital),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,      // user ID
    pub email: String,
    pub role: Role,
    pub name: String,
    pub iat: i64,       // issued at (unix timestamp)
    pub exp: i64,       // expires at, always iat + SESSION_TTL
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn for_user(user: &User, issued_at: OffsetDateTime, issuer: &str, audience: &str) -> Self {
        let exp = issued_at + SESSION_TTL;
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            name: user.name.clone(),
            iat: issued_at.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.exp
    }
}
