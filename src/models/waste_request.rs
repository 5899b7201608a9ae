use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::{hex_id, rfc3339, take, UserRole};
use crate::utils::{date_rule, not_blank, phone_rule, time_rule, ApiError};

/// Collector's answer to a pickup request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum CollectorStatus {
    #[field(value = "pending")]
    Pending,
    #[field(value = "accepted")]
    Accepted,
    #[field(value = "rejected")]
    Rejected,
}

impl CollectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorStatus::Pending => "pending",
            CollectorStatus::Accepted => "accepted",
            CollectorStatus::Rejected => "rejected",
        }
    }
}

/// Physical progress of the pickup.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    #[field(value = "not_collected")]
    NotCollected,
    #[field(value = "in_progress")]
    InProgress,
    #[field(value = "completed")]
    Completed,
    #[field(value = "cancelled")]
    Cancelled,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::NotCollected => "not_collected",
            CollectionStatus::InProgress => "in_progress",
            CollectionStatus::Completed => "completed",
            CollectionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, CollectionStatus::Completed | CollectionStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WasteRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub pickup_date: String, // YYYY-MM-DD
    pub pickup_time: String, // HH:MM
    pub waste_type: String,
    pub estimated_weight: f64,
    pub address: String,
    pub contact_number: String,
    pub instructions: Option<String>,
    pub collector_status: CollectorStatus,
    pub collection_status: CollectionStatus,
    pub assigned_collector: Option<ObjectId>,
    pub actual_weight: Option<f64>,
    #[serde(default)]
    pub coins_awarded: i64,
    /// True once `coins_awarded` has reached the owner's balance.
    #[serde(default)]
    pub coins_credited: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl WasteRequest {
    pub fn is_assigned_to(&self, collector: &ObjectId) -> bool {
        self.assigned_collector.as_ref() == Some(collector)
    }

    /// Owner, assigned collector and admins always see a request; other
    /// collectors only while it is still open for acceptance.
    pub fn is_visible_to(&self, user_id: &ObjectId, role: UserRole) -> bool {
        match role {
            UserRole::Admin => true,
            UserRole::Collector => {
                self.user_id == *user_id
                    || self.is_assigned_to(user_id)
                    || self.collector_status == CollectorStatus::Pending
            }
            UserRole::Household | UserRole::Organisation => self.user_id == *user_id,
        }
    }

    /// Checks whether `collector` may move this request to `next`.
    pub fn check_collection_update(
        &self,
        collector: &ObjectId,
        next: CollectionStatus,
    ) -> Result<(), ApiError> {
        if !self.is_assigned_to(collector) {
            return Err(ApiError::forbidden("Request is not assigned to you"));
        }
        if self.collector_status != CollectorStatus::Accepted {
            return Err(ApiError::conflict("Request has not been accepted"));
        }
        if self.collection_status.is_final() {
            return Err(ApiError::conflict(format!(
                "Request is already {}",
                self.collection_status.as_str()
            )));
        }
        if next == CollectionStatus::NotCollected {
            return Err(ApiError::bad_request("Cannot move a request back to not_collected"));
        }
        Ok(())
    }

    /// Completed, but the owner's coins have not been posted yet.
    pub fn has_pending_credit(&self) -> bool {
        self.collection_status == CollectionStatus::Completed
            && self.coins_awarded > 0
            && !self.coins_credited
    }

    /// Weight that counts towards rewards.
    pub fn credited_weight(&self) -> f64 {
        self.actual_weight.unwrap_or(self.estimated_weight)
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateWasteRequestDto {
    #[validate(required, custom = "date_rule")]
    pub pickup_date: Option<String>,
    #[validate(required, custom = "time_rule")]
    pub pickup_time: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub waste_type: Option<String>,
    #[validate(required, range(min = 0.0, max = 1000.0))]
    pub estimated_weight: Option<f64>,
    #[validate(required, custom = "not_blank")]
    pub address: Option<String>,
    #[validate(required, custom = "phone_rule")]
    pub contact_number: Option<String>,
    #[validate(length(max = 1000))]
    pub instructions: Option<String>,
}

impl CreateWasteRequestDto {
    pub fn into_request(self, user_id: ObjectId) -> Result<WasteRequest, ApiError> {
        self.validate()?;

        let now = DateTime::now();
        Ok(WasteRequest {
            id: None,
            user_id,
            pickup_date: take(self.pickup_date),
            pickup_time: take(self.pickup_time),
            waste_type: take(self.waste_type).to_lowercase(),
            estimated_weight: self.estimated_weight.unwrap_or(0.0),
            address: take(self.address),
            contact_number: take(self.contact_number),
            instructions: self
                .instructions
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty()),
            collector_status: CollectorStatus::Pending,
            collection_status: CollectionStatus::NotCollected,
            assigned_collector: None,
            actual_weight: None,
            coins_awarded: 0,
            coins_credited: false,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdateCollectionStatusDto {
    pub collection_status: CollectionStatus,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub actual_weight: Option<f64>,
}

#[derive(FromForm, Deserialize, JsonSchema)]
pub struct WasteRequestListQuery {
    pub collection_status: Option<CollectionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WasteRequestResponse {
    pub id: String,
    pub user_id: String,
    pub pickup_date: String,
    pub pickup_time: String,
    pub waste_type: String,
    pub estimated_weight: f64,
    pub address: String,
    pub contact_number: String,
    pub instructions: Option<String>,
    pub collector_status: CollectorStatus,
    pub collection_status: CollectionStatus,
    pub assigned_collector: Option<String>,
    pub actual_weight: Option<f64>,
    pub coins_awarded: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WasteRequest> for WasteRequestResponse {
    fn from(request: WasteRequest) -> Self {
        WasteRequestResponse {
            id: hex_id(request.id),
            user_id: request.user_id.to_hex(),
            pickup_date: request.pickup_date,
            pickup_time: request.pickup_time,
            waste_type: request.waste_type,
            estimated_weight: request.estimated_weight,
            address: request.address,
            contact_number: request.contact_number,
            instructions: request.instructions,
            collector_status: request.collector_status,
            collection_status: request.collection_status,
            assigned_collector: request.assigned_collector.map(|id| id.to_hex()),
            actual_weight: request.actual_weight,
            coins_awarded: request.coins_awarded,
            created_at: rfc3339(request.created_at),
            updated_at: rfc3339(request.updated_at),
        }
    }
}
