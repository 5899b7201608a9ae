use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use log::{error, info, warn};
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use validator::Validate;
use crate::db::{DbConn, PRODUCTS, REDEMPTIONS};
use crate::guards::AuthGuard;
use crate::models::{
    CoinTransaction, CoinTransactionKind, Product, ProductResponse, RedeemDto, Redemption,
    RedemptionResponse, RedemptionStatus,
};
use crate::services::{CoinLedger, Posting, RewardService};
use crate::utils::{parse_object_id, ApiError, ApiResponse, Created, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct RedemptionListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Rewards")]
#[get("/rewards/products")]
pub async fn get_products(
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ApiError> {
    let products = db
        .collection::<Product>(PRODUCTS)
        .find(
            doc! { "is_active": true },
            FindOptions::builder().sort(doc! { "cost": 1 }).build(),
        )
        .await
        .map_err(ApiError::database)?
        .try_collect::<Vec<Product>>()
        .await
        .map_err(ApiError::database)?;

    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductResponse::from).collect(),
    )))
}

#[openapi(tag = "Rewards")]
#[get("/rewards/products/<id>")]
pub async fn get_product(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ProductResponse>>, ApiError> {
    let object_id = parse_object_id(&id, "product")?;

    let product = db
        .collection::<Product>(PRODUCTS)
        .find_one(doc! { "_id": object_id, "is_active": true }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(Json(ApiResponse::success(product.into())))
}

/// Puts `quantity` units back after a failed checkout.
async fn release_stock(db: &DbConn, product_id: ObjectId, quantity: i64) {
    if let Err(e) = db
        .collection::<Product>(PRODUCTS)
        .update_one(
            doc! { "_id": product_id },
            doc! { "$inc": { "stock": quantity } },
            None,
        )
        .await
    {
        error!("Failed to release {} units of {}: {}", quantity, product_id, e);
    }
}

/// Checkout: reserve stock, debit coins through the ledger, record the
/// order. Each later failure gives back what the earlier steps took.
#[openapi(tag = "Rewards")]
#[post("/rewards/redeem", data = "<dto>")]
pub async fn redeem(
    auth: AuthGuard,
    db: &State<DbConn>,
    dto: Json<RedeemDto>,
) -> Result<Created<RedemptionResponse>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();
    let product_id = parse_object_id(dto.product_id.as_deref().unwrap_or_default(), "product")?;
    let quantity = dto.quantity();

    let products = db.collection::<Product>(PRODUCTS);
    let product = products
        .find_one(doc! { "_id": product_id, "is_active": true }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let total_cost = RewardService::order_cost(product.cost, quantity)
        .ok_or_else(|| ApiError::bad_request("Order total is too large"))?;

    let reserved = products
        .update_one(
            doc! { "_id": product_id, "is_active": true, "stock": { "$gte": quantity } },
            doc! { "$inc": { "stock": -quantity } },
            None,
        )
        .await
        .map_err(ApiError::database)?;
    if reserved.modified_count == 0 {
        return Err(ApiError::conflict("Out of stock"));
    }

    let order_number = RewardService::order_number();
    let debit = CoinTransaction::new(
        auth.user_id,
        CoinTransactionKind::Redeemed,
        total_cost,
        order_number.clone(),
        format!("{} x {}", quantity, product.name),
    );

    match CoinLedger::post(db, debit.clone()).await {
        Ok(Posting::Posted) => {}
        Ok(Posting::Insufficient) => {
            release_stock(db, product_id, quantity).await;
            return Err(ApiError::bad_request("Insufficient coins"));
        }
        Ok(Posting::NoAccount) => {
            release_stock(db, product_id, quantity).await;
            return Err(ApiError::not_found("User not found"));
        }
        Err(e) => {
            if let Err(revert_err) = CoinLedger::revert(db, &debit).await {
                error!("Could not revert debit for {}: {}", order_number, revert_err.message);
            }
            release_stock(db, product_id, quantity).await;
            return Err(e);
        }
    }

    let now = DateTime::now();
    let mut redemption = Redemption {
        id: None,
        order_number: order_number.clone(),
        user_id: auth.user_id,
        product_id,
        product_name: product.name.clone(),
        quantity,
        total_cost,
        shipping: dto.shipping,
        status: RedemptionStatus::Placed,
        refund_pending: false,
        created_at: now,
        updated_at: now,
    };

    let inserted = db
        .collection::<Redemption>(REDEMPTIONS)
        .insert_one(&redemption, None)
        .await;
    match inserted {
        Ok(result) => redemption.id = result.inserted_id.as_object_id(),
        Err(e) => {
            warn!("Order insert failed, refunding {} coins to {}", total_cost, auth.user_id);
            let refund = CoinTransaction::new(
                auth.user_id,
                CoinTransactionKind::Refunded,
                total_cost,
                order_number.clone(),
                format!("Refund for failed order {}", order_number),
            );
            if let Err(refund_err) = CoinLedger::post(db, refund).await {
                error!("Refund for {} failed: {}", order_number, refund_err.message);
            }
            release_stock(db, product_id, quantity).await;
            return Err(ApiError::database(e));
        }
    }

    info!(
        "Order {} placed by {} for {} coins",
        redemption.order_number, auth.user_id, total_cost
    );

    Ok(Created(ApiResponse::success_with_message(
        "Order placed successfully",
        redemption.into(),
    )))
}

#[openapi(tag = "Rewards")]
#[get("/rewards/redemptions?<query..>")]
pub async fn get_my_redemptions(
    auth: AuthGuard,
    db: &State<DbConn>,
    query: RedemptionListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);
    let filter = doc! { "user_id": auth.user_id };
    let collection = db.collection::<Redemption>(REDEMPTIONS);

    let orders: Vec<RedemptionResponse> = collection
        .find(filter.clone(), pagination.find_options(doc! { "created_at": -1 }))
        .await
        .map_err(ApiError::database)?
        .try_collect::<Vec<Redemption>>()
        .await
        .map_err(ApiError::database)?
        .into_iter()
        .map(RedemptionResponse::from)
        .collect();

    let total = collection
        .count_documents(filter, None)
        .await
        .map_err(ApiError::database)?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "orders": orders,
        "pagination": pagination.summary(total),
    }))))
}
