use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User, UserPatch, UserRow},
    blood::repo_types::BloodGroup,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email or username already registered")]
    DuplicateIdentity,
    #[error("user not found")]
    NotFound,
    #[error("credential store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Persistence for user records.
///
/// `insert` must enforce email/username uniqueness atomically; callers never
/// check for existence first.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError>;
    /// Donors whose profile lists `group`, skipping those marked `isAvailable: false`.
    /// Ordered by name.
    async fn list_donors_by_blood_group(&self, group: BloodGroup) -> Result<Vec<User>, StoreError>;
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, name, role, profile, is_verified, created_at";

/// Postgres-backed store. Uniqueness comes from the table's UNIQUE constraints.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)?;
        row.map(User::try_from).transpose().map_err(StoreError::Unavailable)
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(anyhow::Error::new(e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)?;
        row.map(User::try_from).transpose().map_err(StoreError::Unavailable)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, username, password_hash, name, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    debug!(email = %user.email, username = %user.username, "unique violation on insert");
                    StoreError::DuplicateIdentity
                } else {
                    unavailable(e)
                }
            })?;
        User::try_from(row)
            .context("decode inserted user")
            .map_err(StoreError::Unavailable)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET name        = COALESCE($2, name),
                   profile     = profile || COALESCE($3, '{{}}'::jsonb),
                   is_verified = COALESCE($4, is_verified)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(patch.name)
            .bind(patch.profile.map(Json))
            .bind(patch.is_verified)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound)?;
        User::try_from(row).map_err(StoreError::Unavailable)
    }

    async fn list_donors_by_blood_group(&self, group: BloodGroup) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE role = 'donor'
              AND profile->>'bloodGroup' = $1
              AND profile->'isAvailable' IS DISTINCT FROM 'false'::jsonb
            ORDER BY name, id
            "#
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(group.as_str())
            .fetch_all(&self.db)
            .await
            .map_err(unavailable)?;
        rows.into_iter()
            .map(|row| User::try_from(row).map_err(StoreError::Unavailable))
            .collect()
    }
}
