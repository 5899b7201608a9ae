use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use validator::Validate;
use crate::db::{DbConn, COIN_TRANSACTIONS, USERS};
use crate::guards::AuthGuard;
use crate::models::{CoinTransaction, CoinTransactionResponse, UpdateProfileDto, User, UserResponse};
use crate::utils::{ApiError, ApiResponse, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct CoinHistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "User")]
#[get("/user/profile")]
pub async fn get_profile(
    auth: AuthGuard,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(user.into())))
}

#[openapi(tag = "User")]
#[put("/user/profile", data = "<dto>")]
pub async fn update_profile(
    auth: AuthGuard,
    db: &State<DbConn>,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    dto.validate()?;

    let mut update_doc = doc! {
        "updated_at": mongodb::bson::DateTime::now()
    };
    if let Some(ref name) = dto.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(ref phone) = dto.phone {
        update_doc.insert("phone", phone.trim());
    }
    if let Some(ref address) = dto.address {
        update_doc.insert("address", address.trim());
    }

    let user = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! { "_id": auth.user_id },
            doc! { "$set": update_doc },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        user.into(),
    )))
}

/// Coin balance plus the ledger, newest entries first.
#[openapi(tag = "User")]
#[get("/user/coins?<query..>")]
pub async fn get_coins(
    auth: AuthGuard,
    db: &State<DbConn>,
    query: CoinHistoryQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);
    let filter = doc! { "user_id": auth.user_id, "applied": true };
    let ledger = db.collection::<CoinTransaction>(COIN_TRANSACTIONS);

    let (user, transactions, total) = tokio::try_join!(
        async {
            db.collection::<User>(USERS)
                .find_one(doc! { "_id": auth.user_id }, None)
                .await
        },
        async {
            let cursor = ledger
                .find(filter.clone(), pagination.find_options(doc! { "created_at": -1 }))
                .await?;
            let entries: Vec<CoinTransaction> = cursor.try_collect().await?;
            Ok::<_, mongodb::error::Error>(entries)
        },
        ledger.count_documents(filter.clone(), None),
    )
    .map_err(ApiError::database)?;

    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;
    let transactions: Vec<CoinTransactionResponse> =
        transactions.into_iter().map(CoinTransactionResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "balance": user.coins,
        "transactions": transactions,
        "pagination": pagination.summary(total),
    }))))
}
