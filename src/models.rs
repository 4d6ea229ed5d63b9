use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version of the persisted envelope. Bump when the record shape
/// changes incompatibly; `LocalStore::read` rewrites older envelopes.
pub const ENVELOPE_VERSION: &str = "1.0";

/// One bookmarked listing. `id` and `saved_at` are the contract; the display
/// fields are denormalized snapshots for rendering without a re-fetch and may
/// go stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProperty {
    pub id: String,
    pub saved_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl SavedProperty {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            saved_at: Utc::now().to_rfc3339(),
            title: None,
            price: None,
            location: None,
            image_url: None,
        }
    }

    pub fn with_saved_at(mut self, saved_at: impl Into<String>) -> Self {
        self.saved_at = saved_at.into();
        self
    }

    pub fn with_details(mut self, details: PropertyDetails) -> Self {
        self.title = details.title;
        self.price = details.price;
        self.location = details.location;
        self.image_url = details.image_url;
        self
    }

    /// Minimal shape contract for persistence: non-empty id, non-empty
    /// timestamp.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.saved_at.trim().is_empty()
    }

    /// Same listing with the same display snapshot, timestamps aside.
    pub fn same_snapshot(&self, other: &SavedProperty) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.price == other.price
            && self.location == other.location
            && self.image_url == other.image_url
    }
}

/// Optional display fields a caller can attach when saving a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDetails {
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

/// Envelope as written to disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEnvelope {
    pub saved_properties: Vec<SavedProperty>,
    pub version: String,
    pub last_updated: DateTime<Utc>,
}

/// Read-side form of the envelope. Records stay untyped here so one damaged
/// entry can be dropped without rejecting the whole file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    #[serde(default)]
    pub saved_properties: Vec<serde_json::Value>,
    pub version: Option<String>,
}

/// Listing ids are non-empty trimmed strings everywhere in this subsystem;
/// callers holding numeric ids stringify before the boundary.
pub fn normalize_id(id: &str) -> Option<String> {
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
