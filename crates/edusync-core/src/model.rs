// ── Domain entities ──
//
// Typed mirrors of the server-owned records, deserialized at the transport
// boundary. Wire names are camelCase; identifiers are opaque server-owned
// strings. Downstream code never handles raw JSON payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use edusync_api::UserRole;

/// A record that can live in an [`EntityCollection`](crate::EntityCollection).
///
/// The identifier is expected to be unique within a collection; the store
/// does not enforce this (see `EntityCollection::add`).
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier, unique within a collection (server-owned).
    fn id(&self) -> &str;
}

// ── Accounts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Schools ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    pub code: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub website: Option<String>,
    pub status: SchoolStatus,
}

impl Entity for School {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Students ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub user_id: String,
    pub school_id: String,
    pub roll_number: String,
    /// Class label, e.g. `"10"`. Named `class` on the wire.
    #[serde(rename = "class")]
    pub class_name: String,
    pub section: String,
    pub admission_date: NaiveDate,
    pub status: StudentStatus,
}

impl Entity for Student {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Teachers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub user_id: String,
    pub school_id: String,
    pub employee_number: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub status: StaffStatus,
}

impl Entity for Teacher {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Courses ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub credits: u32,
}

impl Entity for Course {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Tests ────────────────────────────────────────────────────────────
