use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use log::{info, warn};
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use crate::db::{DbConn, PRODUCTS, REDEMPTIONS, WASTE_REQUESTS};
use crate::guards::AdminGuard;
use crate::models::{
    CoinTransaction, CoinTransactionKind, CollectionStatus, CollectorStatus, CreateProductDto,
    Product, ProductResponse, Redemption, RedemptionResponse, RedemptionStatus,
    UpdateProductDto, UpdateRedemptionStatusDto, WasteRequest, WasteRequestResponse,
};
use crate::services::{inc_once, release_marker, CoinLedger, IncOutcome, Posting};
use crate::utils::{parse_object_id, ApiError, ApiResponse, Created, Pagination};

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

// ==================== PRODUCT ADMIN ROUTES ====================

#[openapi(tag = "Admin - Products")]
#[post("/admin/products", data = "<dto>")]
pub async fn create_product(
    admin: AdminGuard,
    db: &State<DbConn>,
    dto: Json<CreateProductDto>,
) -> Result<Created<ProductResponse>, ApiError> {
    let mut product = dto.into_inner().into_product()?;

    let result = db
        .collection::<Product>(PRODUCTS)
        .insert_one(&product, None)
        .await
        .map_err(ApiError::database)?;
    product.id = result.inserted_id.as_object_id();

    info!("Admin {} added product '{}'", admin.auth.email, product.name);

    Ok(Created(ApiResponse::success_with_message(
        "Product created successfully",
        product.into(),
    )))
}

#[openapi(tag = "Admin - Products")]
#[put("/admin/products/<id>", data = "<dto>")]
pub async fn update_product(
    _admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateProductDto>,
) -> Result<Json<ApiResponse<ProductResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "product")?;
    let update = dto.to_update()?;

    let product = db
        .collection::<Product>(PRODUCTS)
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": update },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Product updated successfully",
        product.into(),
    )))
}

// ==================== WASTE REQUEST ADMIN ROUTES ====================

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AdminWasteRequestQuery {
    pub collector_status: Option<CollectorStatus>,
    pub collection_status: Option<CollectionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Admin - Waste Requests")]
#[get("/admin/waste-requests?<query..>")]
pub async fn get_all_waste_requests(
    _admin: AdminGuard,
    db: &State<DbConn>,
    query: AdminWasteRequestQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);

    let mut filter = doc! {};
    if let Some(status) = query.collector_status {
        filter.insert("collector_status", status.as_str());
    }
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

// ==================== REDEMPTION ADMIN ROUTES ====================

/// Field on `products` listing orders whose stock is already back.
const RESTOCKED_ORDERS: &str = "restocked_orders";

/// Moves an order along placed -> shipped -> delivered. Cancelling
/// refunds the coins and returns the stock; repeating a cancel whose
/// refund did not finish completes it.
#[openapi(tag = "Admin - Redemptions")]
#[put("/admin/redemptions/<id>/status", data = "<dto>")]
pub async fn update_redemption_status(
    admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateRedemptionStatusDto>,
) -> Result<Json<ApiResponse<RedemptionResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "order")?;
    let next = dto.status;
    let orders = db.collection::<Redemption>(REDEMPTIONS);

    let current = orders
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if next == RedemptionStatus::Cancelled && current.has_pending_refund() {
        let settled = settle_refund(db, current).await?;
        return Ok(Json(ApiResponse::success_with_message(
            "Pending refund settled",
            settled.into(),
        )));
    }

    if !current.status.can_move_to(next) {
        return Err(ApiError::conflict(format!(
            "Cannot move an order from {} to {}",
            current.status.as_str(),
            next.as_str()
        )));
    }

    let cancelling = next == RedemptionStatus::Cancelled;
    let updated = orders
        .find_one_and_update(
            doc! { "_id": object_id, "status": current.status.as_str() },
            doc! {
                "$set": {
                    "status": next.as_str(),
                    "refund_pending": cancelling,
                    "updated_at": DateTime::now(),
                }
            },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::conflict("Order was updated by someone else, reload and retry"))?;

    let updated = settle_refund(db, updated).await?;
    if cancelling {
        info!(
            "Order {} cancelled by {}, refunded {} coins",
            updated.order_number, admin.auth.email, updated.total_cost
        );
    }

    Ok(Json(ApiResponse::success_with_message(
        format!("Order marked {}", next.as_str()),
        updated.into(),
    )))
}

/// Gives a cancelled order's coins and stock back, then clears
/// `refund_pending`. Both halves are safe to repeat.
async fn settle_refund(db: &DbConn, order: Redemption) -> Result<Redemption, ApiError> {
    if !order.has_pending_refund() {
        return Ok(order);
    }
    let order_id = order
        .id
        .ok_or_else(|| ApiError::internal_error("Order has no id"))?;

    let refund = CoinTransaction::new(
        order.user_id,
        CoinTransactionKind::Refunded,
        order.total_cost,
        order.order_number.clone(),
        format!("Refund for cancelled order {}", order.order_number),
    );
    if CoinLedger::post(db, refund).await? == Posting::NoAccount {
        warn!("Owner {} of order {} no longer exists", order.user_id, order.order_number);
    }

    let products = db.collection::<Document>(PRODUCTS);
    let marker = Bson::String(order.order_number.clone());
    let restocked = inc_once(
        &products,
        order.product_id,
        RESTOCKED_ORDERS,
        marker.clone(),
        doc! {},
        doc! { "stock": order.quantity },
    )
    .await
    .map_err(ApiError::database)?;
    if restocked == IncOutcome::Missing {
        warn!("Product {} of order {} no longer exists", order.product_id, order.order_number);
    }

    let settled = db
        .collection::<Redemption>(REDEMPTIONS)
        .find_one_and_update(
            doc! { "_id": order_id },
            doc! { "$set": { "refund_pending": false } },
            after_update(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    release_marker(&products, order.product_id, RESTOCKED_ORDERS, marker).await;

    Ok(settled)
}
