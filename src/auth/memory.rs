use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        claims::Role,
        repo::{StoreError, UserStore},
        repo_types::{NewUser, Profile, User, UserPatch},
    },
    blood::repo_types::BloodGroup,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
    by_username: HashMap<String, Uuid>,
}

/// Process-local store for development and tests.
///
/// Uniqueness is checked and the record inserted under a single write lock.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_username
            .get(username)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(&user.email) || inner.by_username.contains_key(&user.username)
        {
            return Err(StoreError::DuplicateIdentity);
        }
        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            profile: Profile::new(),
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.by_email.insert(record.email.clone(), record.id);
        inner.by_username.insert(record.username.clone(), record.id);
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        patch.apply(user);
        Ok(user.clone())
    }

    async fn list_donors_by_blood_group(&self, group: BloodGroup) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        let mut donors: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.role == Role::Donor)
            .filter(|u| {
                u.profile.get("bloodGroup").and_then(|v| v.as_str()) == Some(group.as_str())
            })
            .filter(|u| u.profile.get("isAvailable").and_then(|v| v.as_bool()) != Some(false))
            .cloned()
            .collect();
        donors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(donors)
    }
}
