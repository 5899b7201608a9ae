use log::{info, warn};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Collection;

use crate::db::{DbConn, COIN_TRANSACTIONS, USERS};
use crate::models::{CoinTransaction, CoinTransactionKind};
use crate::utils::ApiError;

/// Field on `users` holding ledger entries whose `$inc` has landed but
/// which are not yet marked applied.
const PENDING_LEDGER: &str = "pending_ledger";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncOutcome {
    /// Applied by this call or an earlier one.
    Applied,
    /// The document exists but the guard filter did not match.
    Refused,
    Missing,
}

/// `$inc`s document `id` at most once per `marker`. The marker stays in
/// `field` until [`release_marker`], so repeating the call is a no-op.
pub async fn inc_once(
    collection: &Collection<Document>,
    id: ObjectId,
    field: &str,
    marker: Bson,
    guard: Document,
    inc: Document,
) -> Result<IncOutcome, mongodb::error::Error> {
    let mut not_marked = Document::new();
    not_marked.insert("$ne", marker.clone());
    let mut filter = doc! { "_id": id };
    filter.insert(field, not_marked);
    for (key, value) in guard {
        filter.insert(key, value);
    }

    let mut push = Document::new();
    push.insert(field, marker.clone());
    let result = collection
        .update_one(
            filter,
            doc! {
                "$inc": inc,
                "$push": push,
                "$set": { "updated_at": DateTime::now() },
            },
            None,
        )
        .await?;
    if result.matched_count == 1 {
        return Ok(IncOutcome::Applied);
    }

    let mut marked = doc! { "_id": id };
    marked.insert(field, marker);
    if collection.count_documents(marked, None).await? > 0 {
        Ok(IncOutcome::Applied)
    } else if collection.count_documents(doc! { "_id": id }, None).await? == 0 {
        Ok(IncOutcome::Missing)
    } else {
        Ok(IncOutcome::Refused)
    }
}

/// Drops a marker left by [`inc_once`] once the caller has recorded the
/// operation as done. A leftover marker only blocks a repeat of that same
/// operation, so failures are logged.
pub async fn release_marker(collection: &Collection<Document>, id: ObjectId, field: &str, marker: Bson) {
    let mut pull = Document::new();
    pull.insert(field, marker.clone());
    if let Err(e) = collection
        .update_one(doc! { "_id": id }, doc! { "$pull": pull }, None)
        .await
    {
        warn!("Marker {} left on {}.{}: {}", marker, id, field, e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posting {
    Posted,
    /// A debit larger than the balance.
    Insufficient,
    /// The user no longer exists.
    NoAccount,
}

/// Coin balance changes, each backed by exactly one ledger entry.
///
/// An entry is keyed by `(user_id, kind, reference)`. Posting the same key
/// again resumes an interrupted posting instead of moving the balance twice.
pub struct CoinLedger;

impl CoinLedger {
    pub async fn post(db: &DbConn, entry: CoinTransaction) -> Result<Posting, ApiError> {
        let stored = Self::record(db, &entry).await?;
        if stored.applied {
            return Ok(Posting::Posted);
        }
        let entry_id = stored
            .id
            .ok_or_else(|| ApiError::internal_error("Ledger entry has no id"))?;

        let guard = match entry.kind {
            CoinTransactionKind::Redeemed => doc! { "coins": { "$gte": entry.amount } },
            CoinTransactionKind::Earned | CoinTransactionKind::Refunded => doc! {},
        };
        let users = db.collection::<Document>(USERS);
        let outcome = inc_once(
            &users,
            entry.user_id,
            PENDING_LEDGER,
            Bson::ObjectId(entry_id),
            guard,
            doc! { "coins": entry.delta() },
        )
        .await
        .map_err(ApiError::database)?;

        match outcome {
            IncOutcome::Applied => {}
            IncOutcome::Refused => {
                Self::discard(db, entry_id).await?;
                return Ok(Posting::Insufficient);
            }
            IncOutcome::Missing => {
                Self::discard(db, entry_id).await?;
                return Ok(Posting::NoAccount);
            }
        }

        db.collection::<CoinTransaction>(COIN_TRANSACTIONS)
            .update_one(
                doc! { "_id": entry_id },
                doc! { "$set": { "applied": true } },
                None,
            )
            .await
            .map_err(ApiError::database)?;
        release_marker(&users, entry.user_id, PENDING_LEDGER, Bson::ObjectId(entry_id)).await;

        info!(
            "Posted {} {} coins for {} ({})",
            entry.kind.as_str(),
            entry.amount,
            entry.user_id,
            entry.reference
        );
        Ok(Posting::Posted)
    }

    /// Undoes a posting that returned an error. A balance change that did
    /// land is reversed together with its marker; an entry that turns out
    /// to be fully applied gets a compensating refund.
    pub async fn revert(db: &DbConn, entry: &CoinTransaction) -> Result<(), ApiError> {
        let stored = db
            .collection::<CoinTransaction>(COIN_TRANSACTIONS)
            .find_one(Self::key(entry), None)
            .await
            .map_err(ApiError::database)?;
        let Some(stored) = stored else {
            return Ok(());
        };
        let entry_id = stored
            .id
            .ok_or_else(|| ApiError::internal_error("Ledger entry has no id"))?;

        if stored.applied {
            let refund = CoinTransaction::new(
                entry.user_id,
                CoinTransactionKind::Refunded,
                entry.amount,
                entry.reference.clone(),
                format!("Reversal of {}", entry.reference),
            );
            Self::post(db, refund).await?;
            return Ok(());
        }

        db.collection::<Document>(USERS)
            .update_one(
                doc! { "_id": entry.user_id, "pending_ledger": entry_id },
                doc! {
                    "$inc": { "coins": -entry.delta() },
                    "$pull": { "pending_ledger": entry_id },
                },
                None,
            )
            .await
            .map_err(ApiError::database)?;
        Self::discard(db, entry_id).await
    }

    fn key(entry: &CoinTransaction) -> Document {
        doc! {
            "user_id": entry.user_id,
            "kind": entry.kind.as_str(),
            "reference": entry.reference.as_str(),
        }
    }

    /// Inserts the entry unless one with the same key exists, returning the
    /// stored version either way.
    async fn record(db: &DbConn, entry: &CoinTransaction) -> Result<CoinTransaction, ApiError> {
        let key = Self::key(entry);
        let mut fields = bson::to_document(entry)
            .map_err(|e| ApiError::internal_error(format!("Ledger entry not serialisable: {}", e)))?;
        for field in key.keys() {
            fields.remove(field);
        }

        db.collection::<CoinTransaction>(COIN_TRANSACTIONS)
            .find_one_and_update(
                key,
                doc! { "$setOnInsert": fields },
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(ApiError::database)?
            .ok_or_else(|| ApiError::internal_error("Ledger entry was not stored"))
    }

    async fn discard(db: &DbConn, entry_id: ObjectId) -> Result<(), ApiError> {
        db.collection::<CoinTransaction>(COIN_TRANSACTIONS)
            .delete_one(doc! { "_id": entry_id, "applied": false }, None)
            .await
            .map_err(ApiError::database)?;
        Ok(())
    }
}
