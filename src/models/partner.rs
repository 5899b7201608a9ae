use mongodb::bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::{hex_id, listing_update, rfc3339, take, Listing};
use crate::db::PARTNERS;
use crate::utils::{not_blank, ApiError};

/// Recycling partner that receives collected waste.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Partner {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub category: String,
    pub location: String,
    pub contact: String,
    /// Kilograms processed so far.
    pub processed_waste: f64,
    pub rating: f64, // 0-5
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreatePartnerDto {
    #[validate(required, custom = "not_blank")]
    pub name: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub category: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub location: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub contact: Option<String>,
    #[validate(range(min = 0.0))]
    pub processed_waste: Option<f64>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f64>,
}

impl CreatePartnerDto {
    pub fn into_partner(self) -> Result<Partner, ApiError> {
        self.validate()?;

        let now = DateTime::now();
        Ok(Partner {
            id: None,
            name: take(self.name),
            category: take(self.category),
            location: take(self.location),
            contact: take(self.contact),
            processed_waste: self.processed_waste.unwrap_or(0.0),
            rating: self.rating.unwrap_or(0.0),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdatePartnerDto {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    #[validate(custom = "not_blank")]
    pub category: Option<String>,
    #[validate(custom = "not_blank")]
    pub location: Option<String>,
    #[validate(custom = "not_blank")]
    pub contact: Option<String>,
    #[validate(range(min = 0.0))]
    pub processed_waste: Option<f64>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f64>,
}

impl UpdatePartnerDto {
    /// `$set` body for the fields present in the request.
    pub fn to_update(&self) -> Result<Document, ApiError> {
        self.validate()?;

        Ok(listing_update(
            [
                ("name", &self.name),
                ("category", &self.category),
                ("location", &self.location),
                ("contact", &self.contact),
            ],
            self.processed_waste,
            self.rating,
        ))
    }
}

impl Listing for Partner {
    const COLLECTION: &'static str = PARTNERS;
    const LABEL: &'static str = "Partner";
    type Response = PartnerResponse;

    fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(FromForm, Deserialize, JsonSchema)]
pub struct PartnerListQuery {
    pub category: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PartnerResponse {
    pub id: String,
    pub name: String,
    pub category: String,
    pub location: String,
    pub contact: String,
    pub processed_waste: f64,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Partner> for PartnerResponse {
    fn from(partner: Partner) -> Self {
        PartnerResponse {
            id: hex_id(partner.id),
            name: partner.name,
            category: partner.category,
            location: partner.location,
            contact: partner.contact,
            processed_waste: partner.processed_waste,
            rating: partner.rating,
            created_at: rfc3339(partner.created_at),
            updated_at: rfc3339(partner.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto() -> CreatePartnerDto {
        serde_json::from_value(serde_json::json!({
            "name": "  Eco Recyclers ",
            "category": "plastic",
            "location": "Nairobi",
            "contact": "+254 712 345 678"
        }))
        .unwrap()
    }

    #[test]
    fn create_applies_defaults_and_trims() {
        let partner = dto().into_partner().unwrap();
        assert_eq!(partner.name, "Eco Recyclers");
        assert_eq!(partner.rating, 0.0);
        assert_eq!(partner.processed_waste, 0.0);
        assert!(partner.id.is_none());
    }

    #[test]
    fn create_rejects_missing_fields() {
        let mut missing = dto();
        missing.location = None;
        missing.contact = Some("  ".into());

        let err = missing.into_partner().unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(err.message, "Missing or invalid fields: contact, location");
    }

    #[test]
    fn rating_must_stay_within_zero_and_five() {
        let mut high = dto();
        high.rating = Some(5.5);
        assert!(high.into_partner().is_err());

        let mut top = dto();
        top.rating = Some(5.0);
        assert_eq!(top.into_partner().unwrap().rating, 5.0);
    }

    #[test]
    fn update_only_sets_present_fields() {
        let update: UpdatePartnerDto =
            serde_json::from_value(serde_json::json!({ "rating": 4.5, "location": " Mombasa " }))
                .unwrap();
        let set = update.to_update().unwrap();

        assert_eq!(set.get_f64("rating").unwrap(), 4.5);
        assert_eq!(set.get_str("location").unwrap(), "Mombasa");
        assert!(set.get("name").is_none());
        assert!(set.get("updated_at").is_some());
    }
}
