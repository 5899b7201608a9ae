use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{Company, CompanyListQuery, CompanyResponse, CreateCompanyDto, UpdateCompanyDto};
use crate::utils::{ApiError, ApiResponse, Created, Pagination};
use super::listing;

#[openapi(tag = "Company")]
#[post("/companies", data = "<dto>")]
pub async fn create_company(
    db: &State<DbConn>,
    dto: Json<CreateCompanyDto>,
) -> Result<Created<CompanyResponse>, ApiError> {
    let company = dto.into_inner().into_company()?;
    let created = listing::insert(db, company).await?;

    Ok(Created(ApiResponse::success_with_message(
        "Company created successfully",
        created,
    )))
}

#[openapi(tag = "Company")]
#[get("/companies?<query..>")]
pub async fn get_companies(
    db: &State<DbConn>,
    query: CompanyListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let pagination = Pagination::new(query.page, query.limit);
    let filter = listing::text_filter("company_type", query.company_type.as_deref());
    let (companies, total) = listing::page::<Company>(db, filter, &pagination).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "companies": companies,
        "pagination": pagination.summary(total),
    }))))
}

#[openapi(tag = "Company")]
#[get("/companies/<id>")]
pub async fn get_company_by_id(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<CompanyResponse>>, ApiError> {
    let company = listing::get::<Company>(db, &id).await?;
    Ok(Json(ApiResponse::success(company)))
}

#[openapi(tag = "Company")]
#[put("/companies/<id>", data = "<dto>")]
pub async fn update_company(
    _admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateCompanyDto>,
) -> Result<Json<ApiResponse<CompanyResponse>>, ApiError> {
    let update = dto.to_update()?;
    let company = listing::update::<Company>(db, &id, update).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Company updated successfully",
        company,
    )))
}

#[openapi(tag = "Company")]
#[delete("/companies/<id>")]
pub async fn delete_company(
    _admin: AdminGuard,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    listing::delete::<Company>(db, &id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Company deleted successfully"
    }))))
}
