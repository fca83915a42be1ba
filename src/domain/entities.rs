//! Domain Entities - Core business objects
//!
//! These entities represent the rental domain: customers, DVDs and the
//! rental records linking them. They share a common base carrying identity
//! and soft-delete timestamps. Timestamps are stamped by the repository,
//! never by callers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields shared by every persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBase {
    /// Globally unique identifier, generated at creation and never reused
    pub id: String,
    /// Set by the repository on insert
    pub created_at: DateTime<Utc>,
    /// Set by the repository on every write
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; a row with this set is absent from all reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EntityBase {
    /// Create a base with a fresh UUID v4 identity.
    pub fn generate() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create a base with a caller-chosen identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            deleted_at: None,
        }
    }

    /// Whether the entity has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stamp creation timestamps ahead of an insert.
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
        self.deleted_at = None;
    }

    /// Stamp the update timestamp ahead of an update.
    pub fn stamp_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// A persisted entity addressable by id and stored under a cache collection.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Default cache collection key for this entity type.
    const COLLECTION: &'static str;

    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    fn id(&self) -> &str {
        &self.base().id
    }
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(flatten)]
    pub base: EntityBase,
    pub name: String,
    pub address: String,
}

impl Customer {
    /// Create a new customer with a generated id.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            base: EntityBase::generate(),
            name: name.into(),
            address: address.into(),
        }
    }
}

impl Entity for Customer {
    const COLLECTION: &'static str = "customers";

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

/// Availability of a DVD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DvdStatus {
    Available,
    NotAvailable,
}

impl DvdStatus {
    /// Integer code used by the durable store.
    pub fn code(&self) -> i64 {
        match self {
            DvdStatus::Available => 1,
            DvdStatus::NotAvailable => 2,
        }
    }

    /// Parse a durable-store code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(DvdStatus::Available),
            2 => Some(DvdStatus::NotAvailable),
            _ => None,
        }
    }
}

impl fmt::Display for DvdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DvdStatus::Available => write!(f, "Available"),
            DvdStatus::NotAvailable => write!(f, "NotAvailable"),
        }
    }
}

/// A DVD in the rental catalogue.
///
/// `status` only changes through the repository's update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dvd {
    #[serde(flatten)]
    pub base: EntityBase,
    pub name: String,
    pub status: DvdStatus,
}

impl Dvd {
    /// Create a new, available DVD with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: EntityBase::generate(),
            name: name.into(),
            status: DvdStatus::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == DvdStatus::Available
    }
}

impl Entity for Dvd {
    const COLLECTION: &'static str = "dvds";

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

/// Record of a customer renting a DVD.
///
/// Kept by the customer service; soft-deleted when the DVD is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    #[serde(flatten)]
    pub base: EntityBase,
    pub customer_id: String,
    pub dvd_id: String,
}

impl Rental {
    pub fn new(customer_id: impl Into<String>, dvd_id: impl Into<String>) -> Self {
        Self {
            base: EntityBase::generate(),
            customer_id: customer_id.into(),
            dvd_id: dvd_id.into(),
        }
    }
}

impl Entity for Rental {
    const COLLECTION: &'static str = "rentals";

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}
