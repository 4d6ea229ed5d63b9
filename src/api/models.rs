use serde::{Deserialize, Serialize};

use crate::models::SavedProperty;

/// `GET /saved-properties` response.
#[derive(Debug, Deserialize)]
pub struct SavedPropertiesResponse {
    #[serde(default)]
    pub saved_properties: Vec<SavedPropertyItem>,
}

/// One server-side favorite, with an optional denormalized listing summary.
#[derive(Debug, Deserialize)]
pub struct SavedPropertyItem {
    pub property_id: String,
    pub saved_at: String,
    pub property: Option<PropertySummary>,
}

#[derive(Debug, Deserialize)]
pub struct PropertySummary {
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl SavedPropertyItem {
    pub fn into_record(self) -> SavedProperty {
        let (title, price, location, image_url) = match self.property {
            Some(summary) => (
                summary.title,
                summary.price,
                summary.location,
                summary.images.into_iter().next(),
            ),
            None => (None, None, None, None),
        };

        SavedProperty {
            id: self.property_id,
            saved_at: self.saved_at,
            title,
            price,
            location,
            image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveRequest {
    pub property_id: String,
    pub saved_at: String,
}

impl SaveRequest {
    pub fn from_record(record: &SavedProperty) -> Self {
        Self {
            property_id: record.id.clone(),
            saved_at: record.saved_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemoveRequest {
    pub property_id: String,
}

#[derive(Debug, Serialize)]
pub struct MigrateRequest {
    pub properties: Vec<SaveRequest>,
}
