use mongodb::bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::{hex_id, listing_update, rfc3339, take, Listing};
use crate::db::COMPANIES;
use crate::utils::{not_blank, ApiError};

/// Organisation registered to hand over or process waste in bulk.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Company {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub company_type: String,
    pub location: String,
    pub contact: String,
    /// Kilograms processed so far.
    pub processed_waste: f64,
    pub rating: f64, // 0-5
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateCompanyDto {
    #[validate(required, custom = "not_blank")]
    pub name: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub company_type: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub location: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub contact: Option<String>,
    #[validate(range(min = 0.0))]
    pub processed_waste: Option<f64>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f64>,
}

impl CreateCompanyDto {
    pub fn into_company(self) -> Result<Company, ApiError> {
        self.validate()?;

        let now = DateTime::now();
        Ok(Company {
            id: None,
            name: take(self.name),
            company_type: take(self.company_type),
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
pub struct UpdateCompanyDto {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    #[validate(custom = "not_blank")]
    pub company_type: Option<String>,
    #[validate(custom = "not_blank")]
    pub location: Option<String>,
    #[validate(custom = "not_blank")]
    pub contact: Option<String>,
    #[validate(range(min = 0.0))]
    pub processed_waste: Option<f64>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f64>,
}

impl UpdateCompanyDto {
    /// `$set` body for the fields present in the request.
    pub fn to_update(&self) -> Result<Document, ApiError> {
        self.validate()?;

        Ok(listing_update(
            [
                ("name", &self.name),
                ("company_type", &self.company_type),
                ("location", &self.location),
                ("contact", &self.contact),
            ],
            self.processed_waste,
            self.rating,
        ))
    }
}

impl Listing for Company {
    const COLLECTION: &'static str = COMPANIES;
    const LABEL: &'static str = "Company";
    type Response = CompanyResponse;

    fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(FromForm, Deserialize, JsonSchema)]
pub struct CompanyListQuery {
    pub company_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompanyResponse {
    pub id: String,
    pub name: String,
    pub company_type: String,
    pub location: String,
    pub contact: String,
    pub processed_waste: f64,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        CompanyResponse {
            id: hex_id(company.id),
            name: company.name,
            company_type: company.company_type,
            location: company.location,
            contact: company.contact,
            processed_waste: company.processed_waste,
            rating: company.rating,
            created_at: rfc3339(company.created_at),
            updated_at: rfc3339(company.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_company_type() {
        let dto: CreateCompanyDto = serde_json::from_value(serde_json::json!({
            "name": "Green Textiles Ltd",
            "location": "Kampala",
            "contact": "info@greentextiles.example"
        }))
        .unwrap();

        let err = dto.into_company().unwrap_err();
        assert_eq!(err.message, "Missing or invalid fields: company_type");
    }

    #[test]
    fn negative_processed_waste_is_rejected() {
        let update: UpdateCompanyDto =
            serde_json::from_value(serde_json::json!({ "processed_waste": -12.0 })).unwrap();
        assert!(update.to_update().is_err());
    }

    #[test]
    fn response_exposes_hex_id() {
        let id = ObjectId::new();
        let dto: CreateCompanyDto = serde_json::from_value(serde_json::json!({
            "name": "Green Textiles Ltd",
            "company_type": "manufacturing",
            "location": "Kampala",
            "contact": "0414 123 456",
            "processed_waste": 320.5
        }))
        .unwrap();
        let mut company = dto.into_company().unwrap();
        company.id = Some(id);

        let response = CompanyResponse::from(company);
        assert_eq!(response.id, id.to_hex());
        assert_eq!(response.processed_waste, 320.5);
        assert_eq!(response.company_type, "manufacturing");
    }
}
