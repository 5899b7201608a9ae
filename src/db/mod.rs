use log::{error, info, warn};
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;
use std::time::Duration;

use crate::config::Config;

pub const USERS: &str = "users";
pub const PARTNERS: &str = "partners";
pub const COMPANIES: &str = "companies";
pub const WASTE_REQUESTS: &str = "waste_requests";
pub const PRODUCTS: &str = "products";
pub const REDEMPTIONS: &str = "redemptions";
pub const COIN_TRANSACTIONS: &str = "coin_transactions";

const SERVER_SELECTION_SECS: u64 = 5;

/// Manages a `Database` handle. A malformed URI aborts launch; an
/// unreachable server is only logged, requests then fail with 500.
pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("MongoDB", |rocket| async {
        let uri = Config::mongodb_uri();
        let database = match handle(&uri, &Config::database_name()).await {
            Ok(database) => database,
            Err(e) => {
                error!("Invalid MongoDB configuration: {}", e);
                return Err(rocket);
            }
        };

        match ping(&database).await {
            Ok(()) => {
                info!("MongoDB connected to database '{}'", database.name());
                if let Err(e) = ensure_indexes(&database).await {
                    warn!("Failed to create indexes: {}", e);
                }
            }
            Err(e) => error!("MongoDB is unreachable, starting anyway: {}", e),
        }

        Ok(rocket.manage(database))
    })
}

/// Builds a handle without talking to the server; the driver connects on
/// first use.
pub async fn handle(uri: &str, name: &str) -> Result<Database, mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some("greencollect-server".to_string());
    options.server_selection_timeout = Some(Duration::from_secs(SERVER_SELECTION_SECS));

    Ok(Client::with_options(options)?.database(name))
}

async fn ping(db: &Database) -> Result<(), mongodb::error::Error> {
    db.run_command(doc! {"ping": 1}, None).await?;
    Ok(())
}

async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let unique = IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>(USERS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique)
                .build(),
            None,
        )
        .await?;

    db.collection::<mongodb::bson::Document>(WASTE_REQUESTS)
        .create_indexes(
            vec![
                IndexModel::builder().keys(doc! { "user_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "assigned_collector": 1 }).build(),
            ],
            None,
        )
        .await?;

    // One ledger entry per (user, kind, reference) keeps postings idempotent.
    db.collection::<mongodb::bson::Document>(COIN_TRANSACTIONS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "kind": 1, "reference": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await?;

    Ok(())
}

/// True when an insert hit a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == 11000
    )
}

pub type DbConn = Database;
