use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use log::info;
use mongodb::bson::{doc, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use crate::db::{DbConn, WASTE_REQUESTS};
use crate::guards::AuthGuard;
use crate::models::{
    CollectionStatus, CreateWasteRequestDto, WasteRequest, WasteRequestListQuery,
    WasteRequestResponse,
};
use crate::utils::{parse_object_id, ApiError, ApiResponse, Created, Pagination};

#[openapi(tag = "Waste Request")]
#[post("/waste-requests", data = "<dto>")]
pub async fn create_waste_request(
    auth: AuthGuard,
    db: &State<DbConn>,
    dto: Json<CreateWasteRequestDto>,
) -> Result<Created<WasteRequestResponse>, ApiError> {
    let mut request = dto.into_inner().into_request(auth.user_id)?;

    let result = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .insert_one(&request, None)
        .await
        .map_err(ApiError::database)?;
    request.id = result.inserted_id.as_object_id();

    info!(
        "Pickup of {}kg {} scheduled for {} {}",
        request.estimated_weight, request.waste_type, request.pickup_date, request.pickup_time
    );

    Ok(Created(ApiResponse::success_with_message(
        "Pickup request created successfully",
        request.into(),
    )))
}

#[openapi(tag = "Waste Request")]
#[get("/waste-requests/mine?<query..>")]
pub async fn get_my_waste_requests(
    auth: AuthGuard,
    db: &State<DbConn>,
    query: WasteRequestListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);

    let mut filter = doc! { "user_id": auth.user_id };
    if let Some(status) = query.collection_status {
        filter.insert("collection_status", status.as_str());
    }

    let collection = db.collection::<WasteRequest>(WASTE_REQUESTS);
    let requests: Vec<WasteRequestResponse> = collection
        .find(filter.clone(), pagination.find_options(doc! { "created_at": -1 }))
        .await
        .map_err(ApiError::database)?
        .try_collect::<Vec<WasteRequest>>()
        .await
        .map_err(ApiError::database)?
        .into_iter()
        .map(WasteRequestResponse::from)
        .collect();

    let total = collection
        .count_documents(filter, None)
        .await
        .map_err(ApiError::database)?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "requests": requests,
        "pagination": pagination.summary(total),
    }))))
}

#[openapi(tag = "Waste Request")]
#[get("/waste-requests/<id>")]
pub async fn get_waste_request(
    auth: AuthGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<WasteRequestResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "request")?;

    let request = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Pickup request not found"))?;

    if !request.is_visible_to(&auth.user_id, auth.role) {
        return Err(ApiError::forbidden("Not authorized to view this request"));
    }

    Ok(Json(ApiResponse::success(request.into())))
}

/// Owner cancellation, only before a collector has started the pickup.
#[openapi(tag = "Waste Request")]
#[post("/waste-requests/<id>/cancel")]
pub async fn cancel_waste_request(
    auth: AuthGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<WasteRequestResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "request")?;
    let collection = db.collection::<WasteRequest>(WASTE_REQUESTS);

    let cancelled = collection
        .find_one_and_update(
            doc! {
                "_id": object_id,
                "user_id": auth.user_id,
                "collection_status": CollectionStatus::NotCollected.as_str(),
            },
            doc! {
                "$set": {
                    "collection_status": CollectionStatus::Cancelled.as_str(),
                    "updated_at": DateTime::now(),
                }
            },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(ApiError::database)?;

    if let Some(request) = cancelled {
        return Ok(Json(ApiResponse::success_with_message(
            "Pickup request cancelled",
            request.into(),
        )));
    }

    // Work out why nothing matched.
    let request = collection
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Pickup request not found"))?;

    if request.user_id != auth.user_id {
        return Err(ApiError::forbidden("Not authorized to cancel this request"));
    }
    Err(ApiError::conflict(format!(
        "Request is already {}",
        request.collection_status.as_str()
    )))
}
