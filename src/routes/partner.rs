use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{Partner, PartnerListQuery, PartnerResponse, CreatePartnerDto, UpdatePartnerDto};
use crate::utils::{ApiError, ApiResponse, Created, Pagination};
use super::listing;

#[openapi(tag = "Partner")]
#[post("/partners", data = "<dto>")]
pub async fn create_partner(
    db: &State<DbConn>,
    dto: Json<CreatePartnerDto>,
) -> Result<Created<PartnerResponse>, ApiError> {
    let partner = dto.into_inner().into_partner()?;
    let created = listing::insert(db, partner).await?;

    Ok(Created(ApiResponse::success_with_message(
        "Partner created successfully",
        created,
    )))
}

#[openapi(tag = "Partner")]
#[get("/partners?<query..>")]
pub async fn get_partners(
    db: &State<DbConn>,
    query: PartnerListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);
    let filter = listing::text_filter("category", query.category.as_deref());
    let (partners, total) = listing::page::<Partner>(db, filter, &pagination).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "partners": partners,
        "pagination": pagination.summary(total),
    }))))
}

#[openapi(tag = "Partner")]
#[get("/partners/<id>")]
pub async fn get_partner_by_id(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<PartnerResponse>>, ApiError> {
    let partner = listing::get::<Partner>(db, &id).await?;
    Ok(Json(ApiResponse::success(partner)))
}

#[openapi(tag = "Partner")]
#[put("/partners/<id>", data = "<dto>")]
pub async fn update_partner(
    _admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdatePartnerDto>,
) -> Result<Json<ApiResponse<PartnerResponse>>, ApiError> {
    let update = dto.to_update()?;
    let partner = listing::update::<Partner>(db, &id, update).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Partner updated successfully",
        partner,
    )))
}

#[openapi(tag = "Partner")]
#[delete("/partners/<id>")]
pub async fn delete_partner(
    _admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    listing::delete::<Partner>(db, &id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Partner deleted successfully"
    }))))
}
