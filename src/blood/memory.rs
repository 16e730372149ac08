use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::repo::StoreError,
    blood::{
        repo::BloodStore,
        repo_types::{
            BloodGroup, BloodRequest, Inventory, NewBloodRequest, RequestFilter, RequestStatus,
        },
    },
};

#[derive(Default)]
struct Inner {
    requests: HashMap<Uuid, BloodRequest>,
    inventories: HashMap<Uuid, Inventory>,
}

/// Process-local blood store. Status changes compare and set under the write lock.
#[derive(Default)]
pub struct MemoryBloodStore {
    inner: RwLock<Inner>,
}

impl MemoryBloodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BloodStore for MemoryBloodStore {
    async fn insert_request(&self, req: NewBloodRequest) -> Result<BloodRequest, StoreError> {
        let now = OffsetDateTime::now_utc();
        let record = BloodRequest {
            id: Uuid::new_v4(),
            hospital_id: req.hospital_id,
            hospital_name: req.hospital_name,
            patient_name: req.patient_name,
            blood_group: req.blood_group,
            required_units: req.required_units,
            urgency: req.urgency,
            status: RequestStatus::Pending,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .requests
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError> {
        Ok(self.inner.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: RequestFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BloodRequest>, StoreError> {
        let inner = self.inner.read().await;
        let mut found: Vec<BloodRequest> = inner
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(found
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        notes: Option<String>,
    ) -> Result<Option<BloodRequest>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(req) = inner.requests.get_mut(&id) else {
            return Ok(None);
        };
        if req.status != from {
            return Ok(None);
        }
        req.status = to;
        if notes.is_some() {
            req.notes = notes;
        }
        req.updated_at = OffsetDateTime::now_utc();
        Ok(Some(req.clone()))
    }

    async fn inventory(&self, hospital_id: Uuid) -> Result<Inventory, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .inventories
            .get(&hospital_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_units(
        &self,
        hospital_id: Uuid,
        group: BloodGroup,
        units: i32,
    ) -> Result<Inventory, StoreError> {
        let mut inner = self.inner.write().await;
        let inventory = inner.inventories.entry(hospital_id).or_default();
        inventory.insert(group, units);
        Ok(inventory.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blood::repo_types::Urgency;

    fn new_request(hospital_id: Uuid, group: BloodGroup) -> NewBloodRequest {
        NewBloodRequest {
            hospital_id,
            hospital_name: "City Hospital".into(),
            patient_name: "R. Sharma".into(),
            blood_group: group,
            required_units: 3,
            urgency: Urgency::High,
            notes: None,
        }
    }

    #[tokio::test]
    async fn insert_starts_pending_and_lists_by_filter() {
        let store = MemoryBloodStore::new();
        let city = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = store.insert_request(new_request(city, BloodGroup::ONeg)).await.unwrap();
        store.insert_request(new_request(other, BloodGroup::APos)).await.unwrap();

        assert_eq!(a.status, RequestStatus::Pending);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(store.find_request(a.id).await.unwrap(), Some(a.clone()));

        let mine = store.list_requests(RequestFilter::Hospital(city), 20, 0).await.unwrap();
        assert_eq!(mine, vec![a]);
        let open = store.list_requests(RequestFilter::Open(None), 20, 0).await.unwrap();
        assert_eq!(open.len(), 2);
        let o_neg = store
            .list_requests(RequestFilter::Open(Some(BloodGroup::ONeg)), 20, 0)
            .await
            .unwrap();
        assert_eq!(o_neg.len(), 1);
        let paged = store.list_requests(RequestFilter::Open(None), 1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
    }

    #[tokio::test]
    async fn transition_compares_before_setting() {
        let store = MemoryBloodStore::new();
        let req = store
            .insert_request(new_request(Uuid::new_v4(), BloodGroup::BPos))
            .await
            .unwrap();

        let approved = store
            .transition(req.id, RequestStatus::Pending, RequestStatus::Approved, Some("ok".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.notes.as_deref(), Some("ok"));
        assert!(approved.updated_at >= approved.created_at);

        let stale = store
            .transition(req.id, RequestStatus::Pending, RequestStatus::Rejected, None)
            .await
            .unwrap();
        assert!(stale.is_none());

        let fulfilled = store
            .transition(req.id, RequestStatus::Approved, RequestStatus::Fulfilled, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fulfilled.notes.as_deref(), Some("ok"));
        assert!(store
            .transition(Uuid::new_v4(), RequestStatus::Pending, RequestStatus::Approved, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn racing_transitions_apply_once() {
        let store = Arc::new(MemoryBloodStore::new());
        let req = store
            .insert_request(new_request(Uuid::new_v4(), BloodGroup::AbNeg))
            .await
            .unwrap();
        let id = req.id;
        let handles: Vec<_> = [RequestStatus::Approved, RequestStatus::Rejected]
            .into_iter()
            .cycle()
            .take(6)
            .map(|to| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .transition(id, RequestStatus::Pending, to, None)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn inventory_is_per_hospital() {
        let store = MemoryBloodStore::new();
        let city = Uuid::new_v4();
        assert!(store.inventory(city).await.unwrap().is_empty());

        store.set_units(city, BloodGroup::OPos, 12).await.unwrap();
        let inv = store.set_units(city, BloodGroup::OPos, 9).await.unwrap();
        assert_eq!(inv.get(&BloodGroup::OPos), Some(&9));
        assert_eq!(inv.len(), 1);
        assert!(store.inventory(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
