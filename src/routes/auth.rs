use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use log::info;
use mongodb::bson::{doc, DateTime};
use validator::Validate;
use crate::db::{is_duplicate_key, DbConn, USERS};
use crate::models::{LoginDto, RefreshTokenDto, RegisterDto, User, UserResponse};
use crate::services::{JwtService, PasswordService};
use crate::utils::{ApiError, ApiResponse, Created};

fn issue_tokens(user: &User) -> Result<serde_json::Value, ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;

    let access_token = JwtService::generate_access_token(&user_id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    let refresh_token = JwtService::generate_refresh_token(&user_id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(serde_json::json!({
        "user": UserResponse::from(user.clone()),
        "accessToken": access_token,
        "refreshToken": refresh_token,
    }))
}

/// --------------------
/// Register
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Created<serde_json::Value>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();

    let role = dto.role.ok_or_else(|| ApiError::bad_request("Role is required"))?;
    if !role.is_self_assignable() {
        return Err(ApiError::forbidden("This role cannot be chosen at sign-up"));
    }

    let email = dto.email.unwrap_or_default().trim().to_lowercase();
    let users = db.collection::<User>(USERS);

    if users
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(ApiError::database)?
        .is_some()
    {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password = dto.password.unwrap_or_default();
    let password_hash = tokio::task::spawn_blocking(move || PasswordService::hash(&password))
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))?;

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.unwrap_or_default().trim().to_string(),
        email,
        password_hash,
        phone: dto.phone,
        address: dto.address,
        role,
        coins: 0,
        created_at: now,
        updated_at: now,
    };

    let result = users.insert_one(&user, None).await.map_err(|e| {
        if is_duplicate_key(&e) {
            ApiError::conflict("An account with this email already exists")
        } else {
            ApiError::database(e)
        }
    })?;
    user.id = result.inserted_id.as_object_id();
    info!("Registered {} as {}", user.email, role.as_str());

    Ok(Created(ApiResponse::success_with_message(
        "Registration successful",
        issue_tokens(&user)?,
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();
    let email = dto.email.unwrap_or_default().trim().to_lowercase();

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let password = dto.password.unwrap_or_default();
    let password_hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || {
        PasswordService::verify(&password, &password_hash)
    })
    .await
    .map_err(|e| ApiError::internal_error(e.to_string()))?;

    if !matches {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        issue_tokens(&user)?,
    )))
}

/// --------------------
/// Silent Refresh Token
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<dto>")]
pub async fn refresh_token(
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user_id = mongodb::bson::oid::ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid user id in token"))?;

    let access = JwtService::generate_access_token(&user_id, &claims.email, claims.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "accessToken": access
    }))))
}
