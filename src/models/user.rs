use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::{hex_id, rfc3339};
use crate::utils::{not_blank, phone_rule};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Household,
    Organisation,
    Collector,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Household => "household",
            UserRole::Organisation => "organisation",
            UserRole::Collector => "collector",
            UserRole::Admin => "admin",
        }
    }

    /// Roles a user may pick at sign-up.
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, UserRole::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: UserRole,
    pub coins: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RegisterDto {
    #[validate(required, custom = "not_blank")]
    pub name: Option<String>,
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required, length(min = 8, max = 72))]
    pub password: Option<String>,
    #[validate(required)]
    pub role: Option<UserRole>,
    #[validate(custom = "phone_rule")]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct LoginDto {
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdateProfileDto {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    #[validate(custom = "phone_rule")]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: UserRole,
    pub coins: i64,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: hex_id(user.id),
            name: user.name,
            email: user.email,
            phone: user.phone,
            address: user.address,
            role: user.role,
            coins: user.coins,
            created_at: rfc3339(user.created_at),
        }
    }
}
