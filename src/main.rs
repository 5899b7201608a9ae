#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::serde::json::{json, Value};
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> Value {
    json!({
        "success": false,
        "message": message
    })
}

#[catch(400)]
fn bad_request() -> Value {
    error_body("Bad request")
}

#[catch(401)]
fn unauthorized() -> Value {
    error_body("Missing or invalid access token")
}

#[catch(403)]
fn forbidden() -> Value {
    error_body("You do not have access to this resource")
}

#[catch(404)]
fn not_found() -> Value {
    error_body("Resource not found (check /api/v1 prefix)")
}

/// Malformed JSON bodies surface as plain bad requests.
#[catch(422)]
fn unprocessable() -> (Status, Value) {
    (Status::BadRequest, error_body("Malformed request body"))
}

#[catch(500)]
fn internal_error() -> Value {
    error_body("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- BUILD ----------------------------- */

/// Routes, catchers and fairings. The database handle is managed by
/// `db::init()` at launch.
pub fn app() -> Rocket<Build> {
    rocket::build()
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::register,
                routes::auth::login,
                routes::auth::refresh_token,
                // User
                routes::user::get_profile,
                routes::user::update_profile,
                routes::user::get_coins,
                // Partners
                routes::partner::create_partner,
                routes::partner::get_partners,
                routes::partner::get_partner_by_id,
                routes::partner::update_partner,
                routes::partner::delete_partner,
                // Companies
                routes::company::create_company,
                routes::company::get_companies,
                routes::company::get_company_by_id,
                routes::company::update_company,
                routes::company::delete_company,
                // Waste requests
                routes::waste_request::create_waste_request,
                routes::waste_request::get_my_waste_requests,
                routes::waste_request::get_waste_request,
                routes::waste_request::cancel_waste_request,
                // Collector
                routes::collector::get_open_requests,
                routes::collector::get_assigned_requests,
                routes::collector::accept_request,
                routes::collector::reject_request,
                routes::collector::update_collection_status,
                // Rewards
                routes::reward::get_products,
                routes::reward::get_product,
                routes::reward::redeem,
                routes::reward::get_my_redemptions,
                // Admin
                routes::admin::create_product,
                routes::admin::update_product,
                routes::admin::get_all_waste_requests,
                routes::admin::update_redemption_status,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error
            ],
        )
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    log::info!("GreenCollect API starting, Swagger UI at /api/docs");

    app().attach(db::init())
}

#[cfg(test)]
mod tests {
    use super::app;
    use crate::models::UserRole;
    use crate::services::JwtService;
    use mongodb::bson::oid::ObjectId;
    use rocket::fairing::AdHoc;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::blocking::Client;
    use serde_json::{json, Value};

    /// App with a handle to a server that is never there. Handlers that get
    /// past validation fail with 500; everything before that is testable.
    fn client() -> Client {
        let rocket = app().attach(AdHoc::on_ignite("Offline MongoDB", |rocket| async {
            match crate::db::handle("mongodb://127.0.0.1:1", "greencollect_offline").await {
                Ok(database) => rocket.manage(database),
                Err(e) => panic!("offline handle: {}", e),
            }
        }));
        Client::tracked(rocket).expect("valid rocket instance")
    }

    fn bearer_for(user: ObjectId, role: UserRole) -> Header<'static> {
        let token = JwtService::generate_access_token(&user, "tester@example.com", role).unwrap();
        Header::new("Authorization", format!("Bearer {}", token))
    }

    fn bearer(role: UserRole) -> Header<'static> {
        bearer_for(ObjectId::new(), role)
    }

    #[test]
    fn unknown_route_returns_json_404() {
        let client = client();
        let response = client.get("/api/v1/nowhere").dispatch();

        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.content_type(), Some(ContentType::JSON));
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["success"], false);
    }

    #[test]
    fn preflight_gets_cors_headers() {
        let client = client();
        let response = client
            .options("/api/v1/partners")
            .header(Header::new("Origin", "http://localhost:3000"))
            .dispatch();

        assert_eq!(response.status(), Status::Ok);
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Origin"),
            Some("http://localhost:3000")
        );
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Headers"),
            Some("Content-Type, Authorization")
        );
    }

    #[test]
    fn protected_routes_reject_missing_tokens() {
        let client = client();
        for uri in ["/api/v1/user/profile", "/api/v1/waste-requests/mine"] {
            let response = client.get(uri).dispatch();
            assert_eq!(response.status(), Status::Unauthorized, "{}", uri);
        }
    }

    #[test]
    fn protected_routes_reject_garbage_tokens() {
        let client = client();
        let response = client
            .get("/api/v1/user/profile")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch();
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client
            .get("/api/v1/user/profile")
            .header(Header::new("Authorization", "Basic dXNlcjpwYXNz"))
            .dispatch();
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[test]
    fn mistyped_body_is_a_bad_request() {
        let client = client();
        let response = client
            .post("/api/v1/auth/refresh")
            .header(ContentType::JSON)
            .body(r#"{"refresh_token": 5}"#)
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], "Malformed request body");
    }

    #[test]
    fn refresh_rejects_unknown_tokens() {
        let client = client();
        let response = client
            .post("/api/v1/auth/refresh")
            .header(ContentType::JSON)
            .body(r#"{"refresh_token": "forged"}"#)
            .dispatch();

        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], "Invalid refresh token");
    }

    #[test]
    fn partner_without_required_fields_is_a_bad_request() {
        let client = client();
        let response = client
            .post("/api/v1/partners")
            .header(ContentType::JSON)
            .body(json!({ "name": "Eco Recyclers", "category": "plastic" }).to_string())
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing or invalid fields: contact, location");
    }

    #[test]
    fn partner_rating_above_five_is_a_bad_request() {
        let client = client();
        let response = client
            .post("/api/v1/partners")
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Eco Recyclers",
                    "category": "plastic",
                    "location": "Nairobi",
                    "contact": "0712345678",
                    "rating": 7
                })
                .to_string(),
            )
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], "Missing or invalid fields: rating");
    }

    #[test]
    fn malformed_partner_id_is_a_bad_request() {
        let client = client();
        let response = client.get("/api/v1/partners/not-an-id").dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], "Invalid partner ID");
    }

    #[test]
    fn pickup_with_negative_weight_is_a_bad_request() {
        let client = client();
        let response = client
            .post("/api/v1/waste-requests")
            .header(ContentType::JSON)
            .header(bearer(UserRole::Household))
            .body(
                json!({
                    "pickup_date": "2024-06-01",
                    "pickup_time": "09:30",
                    "waste_type": "plastic",
                    "estimated_weight": -4.0,
                    "address": "12 Market Road",
                    "contact_number": "0712345678"
                })
                .to_string(),
            )
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], "Missing or invalid fields: estimated_weight");
    }

    #[test]
    fn unreachable_store_answers_500() {
        let client = client();
        let response = client
            .get(format!("/api/v1/partners/{}", ObjectId::new().to_hex()))
            .dispatch();

        assert_eq!(response.status(), Status::InternalServerError);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["success"], false);
    }

    #[test]
    fn openapi_document_lists_partner_routes() {
        let client = client();
        let response = client.get("/api/v1/openapi.json").dispatch();

        assert_eq!(response.status(), Status::Ok);
        let document: Value = response.into_json().unwrap();
        let paths = document["paths"].as_object().unwrap();
        assert!(paths.keys().any(|p| p.ends_with("/partners")));
        assert!(paths.keys().any(|p| p.ends_with("/requests/{id}/accept")));
    }

    /// Runs against a real server named by `MONGODB_URI`, each test in a
    /// throwaway database: `MONGODB_URI=mongodb://localhost:27017 cargo test -- --ignored`
    mod store {
        use super::bearer_for;
        use crate::app;
        use crate::config::Config;
        use crate::db::{COIN_TRANSACTIONS, USERS, WASTE_REQUESTS};
        use crate::models::{
            CoinTransaction, CoinTransactionKind, CollectionStatus, CollectorStatus, User,
            UserRole, WasteRequest,
        };
        use crate::services::{CoinLedger, Posting, RewardService};
        use mongodb::bson::{doc, oid::ObjectId, DateTime};
        use mongodb::Database;
        use rocket::http::{ContentType, Status};
        use rocket::local::asynchronous::Client;
        use serde_json::{json, Value};

        async fn database() -> Database {
            let uri = std::env::var("MONGODB_URI").expect("MONGODB_URI must be set");
            let name = format!("greencollect_test_{}", ObjectId::new().to_hex());
            crate::db::handle(&uri, &name).await.expect("valid MONGODB_URI")
        }

        async fn client(database: &Database) -> Client {
            Client::tracked(app().manage(database.clone()))
                .await
                .expect("valid rocket instance")
        }

        async fn add_user(db: &Database, role: UserRole, coins: i64) -> ObjectId {
            let user = User {
                id: None,
                name: format!("{} user", role.as_str()),
                email: format!("{}@example.com", ObjectId::new().to_hex()),
                password_hash: "unused".to_string(),
                phone: None,
                address: None,
                role,
                coins,
                created_at: DateTime::now(),
                updated_at: DateTime::now(),
            };
            db.collection::<User>(USERS)
                .insert_one(&user, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
        }

        async fn coins(db: &Database, user: ObjectId) -> i64 {
            db.collection::<User>(USERS)
                .find_one(doc! { "_id": user }, None)
                .await
                .unwrap()
                .unwrap()
                .coins
        }

        async fn add_request(db: &Database, owner: ObjectId) -> ObjectId {
            let request = WasteRequest {
                id: None,
                user_id: owner,
                pickup_date: "2024-06-01".to_string(),
                pickup_time: "09:30".to_string(),
                waste_type: "plastic".to_string(),
                estimated_weight: 12.5,
                address: "12 Market Road".to_string(),
                contact_number: "0712345678".to_string(),
                instructions: None,
                collector_status: CollectorStatus::Pending,
                collection_status: CollectionStatus::NotCollected,
                assigned_collector: None,
                actual_weight: None,
                coins_awarded: 0,
                coins_credited: false,
                created_at: DateTime::now(),
                updated_at: DateTime::now(),
            };
            db.collection::<WasteRequest>(WASTE_REQUESTS)
                .insert_one(&request, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn partner_create_then_fetch() {
            let db = database().await;
            let client = client(&db).await;

            let response = client
                .post("/api/v1/partners")
                .header(ContentType::JSON)
                .body(
                    json!({
                        "name": "Eco Recyclers",
                        "category": "plastic",
                        "location": "Nairobi",
                        "contact": "0712345678"
                    })
                    .to_string(),
                )
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Created);
            let body: Value = response.into_json().await.unwrap();
            let id = body["data"]["id"].as_str().unwrap().to_string();
            assert!(ObjectId::parse_str(&id).is_ok());
            assert_eq!(body["data"]["rating"], 0.0);

            let response = client.get(format!("/api/v1/partners/{}", id)).dispatch().await;
            assert_eq!(response.status(), Status::Ok);
            let body: Value = response.into_json().await.unwrap();
            assert_eq!(body["data"]["name"], "Eco Recyclers");

            let missing = ObjectId::new().to_hex();
            let response = client.get(format!("/api/v1/partners/{}", missing)).dispatch().await;
            assert_eq!(response.status(), Status::NotFound);

            db.drop(None).await.unwrap();
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn concurrent_accepts_have_one_winner() {
            let db = database().await;
            let client = client(&db).await;
            let owner = add_user(&db, UserRole::Household, 0).await;
            let first = add_user(&db, UserRole::Collector, 0).await;
            let second = add_user(&db, UserRole::Collector, 0).await;
            let request = add_request(&db, owner).await;

            let uri = format!("/api/v1/collector/requests/{}/accept", request.to_hex());
            let (a, b) = tokio::join!(
                client.post(uri.clone()).header(bearer_for(first, UserRole::Collector)).dispatch(),
                client.post(uri.clone()).header(bearer_for(second, UserRole::Collector)).dispatch(),
            );
            let mut statuses = [a.status().code, b.status().code];
            statuses.sort_unstable();
            assert_eq!(statuses, [200, 409]);

            let stored = db
                .collection::<WasteRequest>(WASTE_REQUESTS)
                .find_one(doc! { "_id": request }, None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.collector_status, CollectorStatus::Accepted);
            assert!(stored.assigned_collector == Some(first) || stored.assigned_collector == Some(second));

            db.drop(None).await.unwrap();
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn collectors_cannot_accept_their_own_requests() {
            let db = database().await;
            let client = client(&db).await;
            let collector = add_user(&db, UserRole::Collector, 0).await;
            let request = add_request(&db, collector).await;

            let response = client
                .post(format!("/api/v1/collector/requests/{}/accept", request.to_hex()))
                .header(bearer_for(collector, UserRole::Collector))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Forbidden);

            db.drop(None).await.unwrap();
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn completion_credits_coins_once() {
            let db = database().await;
            let client = client(&db).await;
            let owner = add_user(&db, UserRole::Household, 0).await;
            let collector = add_user(&db, UserRole::Collector, 0).await;
            let request = add_request(&db, owner).await;
            let auth = || bearer_for(collector, UserRole::Collector);

            let response = client
                .post(format!("/api/v1/collector/requests/{}/accept", request.to_hex()))
                .header(auth())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);

            let status_uri = format!("/api/v1/collector/requests/{}/status", request.to_hex());
            let complete = json!({ "collection_status": "completed", "actual_weight": 8.0 }).to_string();
            let response = client
                .put(status_uri.clone())
                .header(ContentType::JSON)
                .header(auth())
                .body(complete.clone())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);

            let expected = RewardService::coins_for_weight(8.0, Config::coins_per_kg());
            assert_eq!(coins(&db, owner).await, expected);

            let response = client
                .put(status_uri)
                .header(ContentType::JSON)
                .header(auth())
                .body(complete)
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Conflict);
            assert_eq!(coins(&db, owner).await, expected);

            let entries = db
                .collection::<CoinTransaction>(COIN_TRANSACTIONS)
                .count_documents(doc! { "user_id": owner, "kind": "earned", "applied": true }, None)
                .await
                .unwrap();
            assert_eq!(entries, 1);

            db.drop(None).await.unwrap();
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn interrupted_credit_is_settled_by_a_repeat_completion() {
            let db = database().await;
            let client = client(&db).await;
            let owner = add_user(&db, UserRole::Household, 0).await;
            let collector = add_user(&db, UserRole::Collector, 0).await;
            let request = add_request(&db, owner).await;

            // State left behind when the status write landed but the credit did not.
            db.collection::<WasteRequest>(WASTE_REQUESTS)
                .update_one(
                    doc! { "_id": request },
                    doc! { "$set": {
                        "collector_status": "accepted",
                        "assigned_collector": collector,
                        "collection_status": "completed",
                        "coins_awarded": 40_i64,
                        "coins_credited": false,
                    } },
                    None,
                )
                .await
                .unwrap();

            let status_uri = format!("/api/v1/collector/requests/{}/status", request.to_hex());
            let response = client
                .put(status_uri.clone())
                .header(ContentType::JSON)
                .header(bearer_for(collector, UserRole::Collector))
                .body(json!({ "collection_status": "completed" }).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            assert_eq!(coins(&db, owner).await, 40);

            let response = client
                .put(status_uri)
                .header(ContentType::JSON)
                .header(bearer_for(collector, UserRole::Collector))
                .body(json!({ "collection_status": "completed" }).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Conflict);
            assert_eq!(coins(&db, owner).await, 40);

            db.drop(None).await.unwrap();
        }

        #[rocket::async_test]
        #[ignore = "needs MONGODB_URI"]
        async fn ledger_postings_are_idempotent_and_floored() {
            let db = database().await;
            let user = add_user(&db, UserRole::Household, 100).await;

            let earned = CoinTransaction::new(user, CoinTransactionKind::Earned, 50, "req-1", "pickup");
            assert_eq!(CoinLedger::post(&db, earned.clone()).await.unwrap(), Posting::Posted);
            assert_eq!(CoinLedger::post(&db, earned).await.unwrap(), Posting::Posted);
            assert_eq!(coins(&db, user).await, 150);

            let debit = CoinTransaction::new(user, CoinTransactionKind::Redeemed, 500, "GC-00000001", "too much");
            assert_eq!(CoinLedger::post(&db, debit).await.unwrap(), Posting::Insufficient);
            assert_eq!(coins(&db, user).await, 150);

            let entries = db
                .collection::<CoinTransaction>(COIN_TRANSACTIONS)
                .count_documents(doc! { "user_id": user }, None)
                .await
                .unwrap();
            assert_eq!(entries, 1);

            db.drop(None).await.unwrap();
        }
    }
}
