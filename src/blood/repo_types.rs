use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ABO/Rh blood group. Declaration order is the display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APos,
        BloodGroup::ANeg,
        BloodGroup::BPos,
        BloodGroup::BNeg,
        BloodGroup::AbPos,
        BloodGroup::AbNeg,
        BloodGroup::OPos,
        BloodGroup::ONeg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BloodGroup::APos => "A+",
            BloodGroup::ANeg => "A-",
            BloodGroup::BPos => "B+",
            BloodGroup::BNeg => "B-",
            BloodGroup::AbPos => "AB+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::OPos => "O+",
            BloodGroup::ONeg => "O-",
        }
    }
}

impl std::fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BloodGroup {
    type Err = anyhow::Error;

    /// Case-insensitive; `+`/`-` may also be spelled `pos`/`neg` (`"O neg"`, `"ABpos"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase().replace("POS", "+").replace("NEG", "-");
        let compact: String = upper.chars().filter(|c| !c.is_whitespace() && *c != '_').collect();
        BloodGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == compact)
            .ok_or_else(|| anyhow::anyhow!("unknown blood group {s:?}"))
    }
}

/// Lifecycle of a blood request.
///
/// `pending -> approved | rejected`, `approved -> fulfilled | rejected`.
/// `rejected` and `fulfilled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }

    pub fn can_move_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Fulfilled) | (Approved, Rejected)
        )
    }

    /// Still looking for donors.
    pub fn is_open(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            other => anyhow::bail!("unknown request status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            other => anyhow::bail!("unknown urgency {other:?}"),
        }
    }
}

/// A hospital's request for units of one blood group.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub hospital_name: String,
    pub patient_name: String,
    pub blood_group: BloodGroup,
    pub required_units: i32,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated fields for a new request; the store assigns id, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewBloodRequest {
    pub hospital_id: Uuid,
    pub hospital_name: String,
    pub patient_name: String,
    pub blood_group: BloodGroup,
    pub required_units: i32,
    pub urgency: Urgency,
    pub notes: Option<String>,
}

/// Which requests a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFilter {
    /// Every request raised by one hospital.
    Hospital(Uuid),
    /// Pending or approved requests, optionally for one blood group.
    Open(Option<BloodGroup>),
}

impl RequestFilter {
    pub fn matches(&self, req: &BloodRequest) -> bool {
        match *self {
            RequestFilter::Hospital(id) => req.hospital_id == id,
            RequestFilter::Open(group) => {
                req.status.is_open() && group.map_or(true, |g| g == req.blood_group)
            }
        }
    }
}

/// Units on hand per blood group. Groups never stocked are absent.
pub type Inventory = BTreeMap<BloodGroup, i32>;

/// Row shape of the `blood_requests` table.
#[derive(Debug, FromRow)]
pub(crate) struct BloodRequestRow {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub hospital_name: String,
    pub patient_name: String,
    pub blood_group: String,
    pub required_units: i32,
    pub urgency: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<BloodRequestRow> for BloodRequest {
    type Error = anyhow::Error;

    fn try_from(row: BloodRequestRow) -> Result<Self, Self::Error> {
        Ok(BloodRequest {
            id: row.id,
            hospital_id: row.hospital_id,
            hospital_name: row.hospital_name,
            patient_name: row.patient_name,
            blood_group: row.blood_group.parse()?,
            required_units: row.required_units,
            urgency: row.urgency.parse()?,
            status: row.status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_group_spellings() {
        assert_eq!("O-".parse::<BloodGroup>().unwrap(), BloodGroup::ONeg);
        assert_eq!("ab+".parse::<BloodGroup>().unwrap(), BloodGroup::AbPos);
        assert_eq!(" a pos ".parse::<BloodGroup>().unwrap(), BloodGroup::APos);
        assert_eq!("O_neg".parse::<BloodGroup>().unwrap(), BloodGroup::ONeg);
        assert!("C+".parse::<BloodGroup>().is_err());
        assert!("A".parse::<BloodGroup>().is_err());
        assert_eq!(serde_json::to_string(&BloodGroup::AbNeg).unwrap(), "\"AB-\"");
    }

    #[test]
    fn every_group_round_trips_its_label() {
        for group in BloodGroup::ALL {
            assert_eq!(group.as_str().parse::<BloodGroup>().unwrap(), group);
        }
    }

    #[test]
    fn status_lifecycle() {
        use RequestStatus::*;
        assert!(Pending.can_move_to(Approved));
        assert!(Pending.can_move_to(Rejected));
        assert!(Approved.can_move_to(Fulfilled));
        assert!(!Pending.can_move_to(Fulfilled));
        assert!(!Pending.can_move_to(Pending));
        for next in [Pending, Approved, Rejected, Fulfilled] {
            assert!(!Fulfilled.can_move_to(next));
            assert!(!Rejected.can_move_to(next));
        }
    }

    #[test]
    fn open_filter_skips_closed_requests() {
        let now = OffsetDateTime::now_utc();
        let mut req = BloodRequest {
            id: Uuid::new_v4(),
            hospital_id: Uuid::new_v4(),
            hospital_name: "City".into(),
            patient_name: "P".into(),
            blood_group: BloodGroup::BPos,
            required_units: 2,
            urgency: Urgency::High,
            status: RequestStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(RequestFilter::Open(None).matches(&req));
        assert!(RequestFilter::Open(Some(BloodGroup::BPos)).matches(&req));
        assert!(!RequestFilter::Open(Some(BloodGroup::BNeg)).matches(&req));
        req.status = RequestStatus::Fulfilled;
        assert!(!RequestFilter::Open(None).matches(&req));
        assert!(RequestFilter::Hospital(req.hospital_id).matches(&req));
    }
}
