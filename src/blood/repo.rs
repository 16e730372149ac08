use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo::StoreError,
    blood::repo_types::{
        BloodGroup, BloodRequest, BloodRequestRow, Inventory, NewBloodRequest, RequestFilter,
        RequestStatus,
    },
};

/// Persistence for blood requests and hospital inventories.
#[async_trait]
pub trait BloodStore: Send + Sync {
    async fn insert_request(&self, req: NewBloodRequest) -> Result<BloodRequest, StoreError>;
    async fn find_request(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError>;
    /// Newest first.
    async fn list_requests(
        &self,
        filter: RequestFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BloodRequest>, StoreError>;
    /// Move a request from `from` to `to` only if it is still in `from`.
    /// `None` means the request is missing or its status changed meanwhile.
    /// `notes: None` keeps the current notes.
    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        notes: Option<String>,
    ) -> Result<Option<BloodRequest>, StoreError>;
    async fn inventory(&self, hospital_id: Uuid) -> Result<Inventory, StoreError>;
    /// Set the units on hand for one group and return the whole inventory.
    async fn set_units(
        &self,
        hospital_id: Uuid,
        group: BloodGroup,
        units: i32,
    ) -> Result<Inventory, StoreError>;
}

const REQUEST_COLUMNS: &str = "id, hospital_id, hospital_name, patient_name, blood_group, \
     required_units, urgency, status, notes, created_at, updated_at";

#[derive(Clone)]
pub struct PgBloodStore {
    db: PgPool,
}

impl PgBloodStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(anyhow::Error::new(e))
}

fn decode(row: BloodRequestRow) -> Result<BloodRequest, StoreError> {
    BloodRequest::try_from(row).map_err(StoreError::Unavailable)
}

#[async_trait]
impl BloodStore for PgBloodStore {
    async fn insert_request(&self, req: NewBloodRequest) -> Result<BloodRequest, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO blood_requests
                (id, hospital_id, hospital_name, patient_name, blood_group,
                 required_units, urgency, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, BloodRequestRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.hospital_id)
            .bind(&req.hospital_name)
            .bind(&req.patient_name)
            .bind(req.blood_group.as_str())
            .bind(req.required_units)
            .bind(req.urgency.as_str())
            .bind(&req.notes)
            .fetch_one(&self.db)
            .await
            .map_err(unavailable)?;
        decode(row)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM blood_requests WHERE id = $1");
        sqlx::query_as::<_, BloodRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)?
            .map(decode)
            .transpose()
    }

    async fn list_requests(
        &self,
        filter: RequestFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BloodRequest>, StoreError> {
        let rows = match filter {
            RequestFilter::Hospital(hospital_id) => {
                let sql = format!(
                    r#"
                    SELECT {REQUEST_COLUMNS}
                    FROM blood_requests
                    WHERE hospital_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#
                );
                sqlx::query_as::<_, BloodRequestRow>(&sql)
                    .bind(hospital_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.db)
                    .await
            }
            RequestFilter::Open(group) => {
                let sql = format!(
                    r#"
                    SELECT {REQUEST_COLUMNS}
                    FROM blood_requests
                    WHERE status IN ('pending', 'approved')
                      AND ($1::text IS NULL OR blood_group = $1)
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#
                );
                sqlx::query_as::<_, BloodRequestRow>(&sql)
                    .bind(group.map(BloodGroup::as_str))
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.db)
                    .await
            }
        }
        .map_err(unavailable)?;
        rows.into_iter().map(decode).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        notes: Option<String>,
    ) -> Result<Option<BloodRequest>, StoreError> {
        let sql = format!(
            r#"
            UPDATE blood_requests
               SET status     = $3,
                   notes      = COALESCE($4, notes),
                   updated_at = now()
             WHERE id = $1 AND status = $2
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, BloodRequestRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(notes)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)?
            .map(decode)
            .transpose()
    }

    async fn inventory(&self, hospital_id: Uuid) -> Result<Inventory, StoreError> {
        let rows: Vec<(String, i32)> = sqlx::query_as(
            r#"
            SELECT blood_group, units
            FROM blood_inventory
            WHERE hospital_id = $1
            "#,
        )
        .bind(hospital_id)
        .fetch_all(&self.db)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|(group, units)| Ok((group.parse::<BloodGroup>()?, units)))
            .collect::<anyhow::Result<Inventory>>()
            .map_err(StoreError::Unavailable)
    }

    async fn set_units(
        &self,
        hospital_id: Uuid,
        group: BloodGroup,
        units: i32,
    ) -> Result<Inventory, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blood_inventory (hospital_id, blood_group, units)
            VALUES ($1, $2, $3)
            ON CONFLICT (hospital_id, blood_group)
            DO UPDATE SET units = EXCLUDED.units, updated_at = now()
            "#,
        )
        .bind(hospital_id)
        .bind(group.as_str())
        .bind(units)
        .execute(&self.db)
        .await
        .map_err(unavailable)?;
        self.inventory(hospital_id).await
    }
}
