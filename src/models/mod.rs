pub mod company;
pub mod listing;
pub mod partner;
pub mod reward;
pub mod user;
pub mod waste_request;

pub use company::*;
pub use listing::*;
pub use partner::*;
pub use reward::*;
pub use user::*;
pub use waste_request::*;

use mongodb::bson::{oid::ObjectId, DateTime};

pub(crate) fn hex_id(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

pub(crate) fn rfc3339(dt: DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}

/// Trimmed copy of a field that has already passed `required`.
pub(crate) fn take(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}
