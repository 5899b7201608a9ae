use rocket::request::{self, Request, FromRequest, Outcome};
use rocket::http::Status;
use rocket::State;
use log::warn;
use mongodb::bson::doc;
use rocket_okapi::request::OpenApiFromRequest;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::RequestHeaderInput;

use crate::db::{DbConn, USERS};
use crate::guards::AuthGuard;
use crate::models::{User, UserRole};

/// Re-reads the caller's role from the store so a demoted account loses
/// access before its token expires.
async fn require_role<'r>(
    req: &'r Request<'_>,
    allowed: &[UserRole],
) -> request::Outcome<AuthGuard, ()> {
    let auth = match req.guard::<AuthGuard>().await {
        Outcome::Success(auth) => auth,
        Outcome::Error(e) => return Outcome::Error(e),
        Outcome::Forward(f) => return Outcome::Forward(f),
    };

    let db = match req.guard::<&State<DbConn>>().await {
        Outcome::Success(db) => db,
        _ => return Outcome::Error((Status::InternalServerError, ())),
    };

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": auth.user_id }, None)
        .await;

    match user {
        Ok(Some(user)) if allowed.contains(&user.role) => Outcome::Success(AuthGuard {
            role: user.role,
            ..auth
        }),
        Ok(Some(user)) => {
            warn!("Role guard rejected {} with role {}", auth.user_id, user.role.as_str());
            Outcome::Error((Status::Forbidden, ()))
        }
        Ok(None) => Outcome::Error((Status::Unauthorized, ())),
        Err(e) => {
            warn!("Role guard lookup failed: {}", e);
            Outcome::Error((Status::InternalServerError, ()))
        }
    }
}

pub struct CollectorGuard {
    pub auth: AuthGuard,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CollectorGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        require_role(req, &[UserRole::Collector])
            .await
            .map(|auth| CollectorGuard { auth })
    }
}

pub struct AdminGuard {
    pub auth: AuthGuard,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        require_role(req, &[UserRole::Admin])
            .await
            .map(|auth| AdminGuard { auth })
    }
}

impl<'a> OpenApiFromRequest<'a> for CollectorGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
