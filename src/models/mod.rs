// Portfolio content models - flat document records stored one table per collection

pub mod portfolio;

pub use portfolio::*;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A portfolio collection stored as JSON documents
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Backing table name
    const TABLE: &'static str;
    /// Human-readable name used in responses, e.g. "Education"
    const LABEL: &'static str;

    /// Payload accepted on create
    type Create: DeserializeOwned + Send + Into<Self>;
    /// Partial update; `None` fields are left untouched
    type Patch: Serialize + DeserializeOwned + Send + Sync;
}

/// Stored record: generated id and timestamps around the resource fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every collection table, created on start-up
pub const TABLES: &[&str] = &[
    PersonalInfo::TABLE,
    Education::TABLE,
    SkillCategory::TABLE,
    Project::TABLE,
    Experience::TABLE,
    Certification::TABLE,
    Testimonial::TABLE,
    ContactMessage::TABLE,
    Procedure::TABLE,
    VeilleContent::TABLE,
];
