use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use log::{error, info};
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use validator::Validate;
use crate::config::Config;
use crate::db::{DbConn, WASTE_REQUESTS};
use crate::guards::CollectorGuard;
use crate::models::{
    CoinTransaction, CoinTransactionKind, CollectionStatus, CollectorStatus,
    UpdateCollectionStatusDto, WasteRequest, WasteRequestResponse,
};
use crate::services::{CoinLedger, Posting, RewardService};
use crate::utils::{parse_object_id, ApiError, ApiResponse};

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

async fn list(
    db: &DbConn,
    filter: mongodb::bson::Document,
    sort: mongodb::bson::Document,
) -> Result<Vec<WasteRequestResponse>, ApiError> {
    let requests = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .find(filter, FindOptions::builder().sort(sort).build())
        .await
        .map_err(ApiError::database)?
        .try_collect::<Vec<WasteRequest>>()
        .await
        .map_err(ApiError::database)?;

    Ok(requests.into_iter().map(WasteRequestResponse::from).collect())
}

async fn load(db: &DbConn, id: ObjectId) -> Result<WasteRequest, ApiError> {
    db.collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one(doc! { "_id": id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Pickup request not found"))
}

/// Requests still waiting for a collector, earliest pickup first.
#[openapi(tag = "Collector")]
#[get("/collector/requests/open")]
pub async fn get_open_requests(
    _collector: CollectorGuard,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<Vec<WasteRequestResponse>>>, ApiError> {
    let requests = list(
        db,
        doc! {
            "collector_status": CollectorStatus::Pending.as_str(),
            "collection_status": CollectionStatus::NotCollected.as_str(),
        },
        doc! { "pickup_date": 1, "pickup_time": 1 },
    )
    .await?;

    Ok(Json(ApiResponse::success(requests)))
}

#[openapi(tag = "Collector")]
#[get("/collector/requests/assigned")]
pub async fn get_assigned_requests(
    collector: CollectorGuard,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<Vec<WasteRequestResponse>>>, ApiError> {
    let requests = list(
        db,
        doc! { "assigned_collector": collector.auth.user_id },
        doc! { "pickup_date": 1, "pickup_time": 1 },
    )
    .await?;

    Ok(Json(ApiResponse::success(requests)))
}

/// Claims a pending request. Only one collector can win a race.
#[openapi(tag = "Collector")]
#[post("/collector/requests/<id>/accept")]
pub async fn accept_request(
    collector: CollectorGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<WasteRequestResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "request")?;

    let accepted = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one_and_update(
            doc! {
                "_id": object_id,
                "user_id": { "$ne": collector.auth.user_id },
                "collector_status": CollectorStatus::Pending.as_str(),
                "collection_status": CollectionStatus::NotCollected.as_str(),
            },
            doc! {
                "$set": {
                    "collector_status": CollectorStatus::Accepted.as_str(),
                    "assigned_collector": collector.auth.user_id,
                    "updated_at": DateTime::now(),
                }
            },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?;

    match accepted {
        Some(request) => {
            info!("Collector {} accepted request {}", collector.auth.user_id, object_id);
            Ok(Json(ApiResponse::success_with_message(
                "Pickup request accepted",
                request.into(),
            )))
        }
        None => {
            let request = load(db, object_id).await?;
            if request.user_id == collector.auth.user_id {
                return Err(ApiError::forbidden("You cannot collect your own request"));
            }
            Err(ApiError::conflict(format!(
                "Request is no longer open ({} / {})",
                request.collector_status.as_str(),
                request.collection_status.as_str()
            )))
        }
    }
}

#[openapi(tag = "Collector")]
#[post("/collector/requests/<id>/reject")]
pub async fn reject_request(
    collector: CollectorGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<WasteRequestResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "request")?;

    let rejected = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one_and_update(
            doc! {
                "_id": object_id,
                "collector_status": CollectorStatus::Pending.as_str(),
            },
            doc! {
                "$set": {
                    "collector_status": CollectorStatus::Rejected.as_str(),
                    "updated_at": DateTime::now(),
                }
            },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?;

    match rejected {
        Some(request) => {
            info!("Collector {} rejected request {}", collector.auth.user_id, object_id);
            Ok(Json(ApiResponse::success_with_message(
                "Pickup request rejected",
                request.into(),
            )))
        }
        None => {
            let request = load(db, object_id).await?;
            Err(ApiError::conflict(format!(
                "Request is already {}",
                request.collector_status.as_str()
            )))
        }
    }
}

/// Moves an accepted request along. Completing it awards the owner coins;
/// repeating a completion whose credit did not go through settles it.
#[openapi(tag = "Collector")]
#[put("/collector/requests/<id>/status", data = "<dto>")]
pub async fn update_collection_status(
    collector: CollectorGuard,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateCollectionStatusDto>,
) -> Result<Json<ApiResponse<WasteRequestResponse>>, ApiError> {
    dto.validate()?;
    let object_id = parse_object_id(&id, "request")?;
    let collector_id = collector.auth.user_id;
    let next = dto.collection_status;

    let current = load(db, object_id).await?;
    if next == CollectionStatus::Completed
        && current.is_assigned_to(&collector_id)
        && current.has_pending_credit()
    {
        let settled = settle_credit(db, current).await?;
        return Ok(Json(ApiResponse::success_with_message(
            "Pending coin credit settled",
            settled.into(),
        )));
    }
    current.check_collection_update(&collector_id, next)?;

    let mut set = doc! {
        "collection_status": next.as_str(),
        "updated_at": DateTime::now(),
    };
    if let Some(actual_weight) = dto.actual_weight {
        set.insert("actual_weight", actual_weight);
    }
    if next == CollectionStatus::Completed {
        let weight = dto.actual_weight.unwrap_or_else(|| current.credited_weight());
        let coins = RewardService::coins_for_weight(weight, Config::coins_per_kg());
        set.insert("coins_awarded", coins);
        set.insert("coins_credited", coins == 0);
    }

    // Guarding on the status read makes the completion happen once.
    let updated = db
        .collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one_and_update(
            doc! {
                "_id": object_id,
                "assigned_collector": collector_id,
                "collector_status": CollectorStatus::Accepted.as_str(),
                "collection_status": current.collection_status.as_str(),
            },
            doc! { "$set": set },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::conflict("Request was updated by someone else, reload and retry"))?;

    let updated = settle_credit(db, updated).await?;

    Ok(Json(ApiResponse::success_with_message(
        format!("Collection status set to {}", next.as_str()),
        updated.into(),
    )))
}

/// Posts `coins_awarded` to the owner and flags the request once the
/// ledger has it. Nothing to do unless a credit is pending.
async fn settle_credit(db: &DbConn, request: WasteRequest) -> Result<WasteRequest, ApiError> {
    if !request.has_pending_credit() {
        return Ok(request);
    }
    let request_id = request
        .id
        .ok_or_else(|| ApiError::internal_error("Pickup request has no id"))?;

    let entry = CoinTransaction::new(
        request.user_id,
        CoinTransactionKind::Earned,
        request.coins_awarded,
        request_id.to_hex(),
        format!("{} pickup of {}kg", request.waste_type, request.credited_weight()),
    );
    if CoinLedger::post(db, entry).await? == Posting::NoAccount {
        error!("Owner {} of request {} no longer exists", request.user_id, request_id);
    }

    db.collection::<WasteRequest>(WASTE_REQUESTS)
        .find_one_and_update(
            doc! { "_id": request_id },
            doc! { "$set": { "coins_credited": true } },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Pickup request not found"))
}
