use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{de::DeserializeOwned, Serialize};

/// Directory records (partners, companies) sharing one CRUD surface.
pub trait Listing: Serialize + DeserializeOwned + Send + Sync + Unpin + Sized {
    const COLLECTION: &'static str;
    /// Singular name used in messages, e.g. `Partner`.
    const LABEL: &'static str;
    type Response: From<Self>;

    fn set_id(&mut self, id: Option<ObjectId>);
    fn name(&self) -> &str;
}

/// `$set` body for a partial update: present text fields trimmed, absent
/// ones left alone.
pub(crate) fn listing_update(
    text: [(&str, &Option<String>); 4],
    processed_waste: Option<f64>,
    rating: Option<f64>,
) -> Document {
    let mut update = doc! { "updated_at": DateTime::now() };
    for (key, value) in text {
        if let Some(value) = value {
            update.insert(key, value.trim());
        }
    }
    if let Some(processed_waste) = processed_waste {
        update.insert("processed_waste", processed_waste);
    }
    if let Some(rating) = rating {
        update.insert("rating", rating);
    }
    update
}
