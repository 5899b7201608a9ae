use rocket::futures::TryStreamExt;
use log::info;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use crate::db::DbConn;
use crate::models::Listing;
use crate::utils::{parse_object_id, ApiError, Pagination};

fn not_found<T: Listing>() -> ApiError {
    ApiError::not_found(format!("{} not found", T::LABEL))
}

fn parse_id<T: Listing>(id: &str) -> Result<mongodb::bson::oid::ObjectId, ApiError> {
    parse_object_id(id, &T::LABEL.to_lowercase())
}

/// Exact-match filter on `field`, ignored when blank.
pub(crate) fn text_filter(field: &str, value: Option<&str>) -> Document {
    let mut filter = doc! {};
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        filter.insert(field, value);
    }
    filter
}

pub(crate) async fn insert<T: Listing>(db: &DbConn, mut item: T) -> Result<T::Response, ApiError> {
    let result = db
        .collection::<T>(T::COLLECTION)
        .insert_one(&item, None)
        .await
        .map_err(ApiError::database)?;

    item.set_id(result.inserted_id.as_object_id());
    info!("{} '{}' created", T::LABEL, item.name());
    Ok(<T::Response>::from(item))
}

/// One page, newest first, plus the total matching `filter`.
pub(crate) async fn page<T: Listing>(
    db: &DbConn,
    filter: Document,
    pagination: &Pagination,
) -> Result<(Vec<T::Response>, u64), ApiError> {
    let collection = db.collection::<T>(T::COLLECTION);

    let items = collection
        .find(filter.clone(), pagination.find_options(doc! { "created_at": -1 }))
        .await
        .map_err(ApiError::database)?
        .try_collect::<Vec<T>>()
        .await
        .map_err(ApiError::database)?
        .into_iter()
        .map(<T::Response>::from)
        .collect();

    let total = collection
        .count_documents(filter, None)
        .await
        .map_err(ApiError::database)?;

    Ok((items, total))
}

pub(crate) async fn get<T: Listing>(db: &DbConn, id: &str) -> Result<T::Response, ApiError> {
    let object_id = parse_id::<T>(id)?;

    db.collection::<T>(T::COLLECTION)
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?
        .map(<T::Response>::from)
        .ok_or_else(not_found::<T>)
}

pub(crate) async fn update<T: Listing>(
    db: &DbConn,
    id: &str,
    set: Document,
) -> Result<T::Response, ApiError> {
    let object_id = parse_id::<T>(id)?;

    db.collection::<T>(T::COLLECTION)
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": set },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(ApiError::database)?
        .map(<T::Response>::from)
        .ok_or_else(not_found::<T>)
}

pub(crate) async fn delete<T: Listing>(db: &DbConn, id: &str) -> Result<(), ApiError> {
    let object_id = parse_id::<T>(id)?;

    let result = db
        .collection::<T>(T::COLLECTION)
        .delete_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?;

    if result.deleted_count == 0 {
        return Err(not_found::<T>());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Company, Partner};

    #[test]
    fn blank_filters_match_everything() {
        assert!(text_filter("category", None).is_empty());
        assert!(text_filter("category", Some("   ")).is_empty());
        assert_eq!(
            text_filter("category", Some(" plastic ")).get_str("category").unwrap(),
            "plastic"
        );
    }

    #[test]
    fn ids_and_messages_use_the_record_name() {
        assert_eq!(parse_id::<Partner>("nope").unwrap_err().message, "Invalid partner ID");
        assert_eq!(not_found::<Company>().message, "Company not found");
    }
}
