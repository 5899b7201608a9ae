use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::{hex_id, rfc3339, take};
use crate::utils::{not_blank, phone_rule, ApiError};

/// Catalogue item that can be bought with coins.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub cost: i64,
    pub stock: i64,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateProductDto {
    #[validate(required, custom = "not_blank")]
    pub name: Option<String>,
    #[validate(required)]
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(required, range(min = 1))]
    pub cost: Option<i64>,
    #[validate(range(min = 0))]
    pub stock: Option<i64>,
    pub is_active: Option<bool>,
}

impl CreateProductDto {
    pub fn into_product(self) -> Result<Product, ApiError> {
        self.validate()?;

        let now = DateTime::now();
        Ok(Product {
            id: None,
            name: take(self.name),
            description: take(self.description),
            image_url: self.image_url,
            cost: self.cost.unwrap_or(1),
            stock: self.stock.unwrap_or(0),
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdateProductDto {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(range(min = 1))]
    pub cost: Option<i64>,
    #[validate(range(min = 0))]
    pub stock: Option<i64>,
    pub is_active: Option<bool>,
}

impl UpdateProductDto {
    pub fn to_update(&self) -> Result<Document, ApiError> {
        self.validate()?;

        let mut update = doc! { "updated_at": DateTime::now() };
        if let Some(ref name) = self.name {
            update.insert("name", name.trim());
        }
        if let Some(ref description) = self.description {
            update.insert("description", description.trim());
        }
        if let Some(ref image_url) = self.image_url {
            update.insert("image_url", image_url);
        }
        if let Some(cost) = self.cost {
            update.insert("cost", cost);
        }
        if let Some(stock) = self.stock {
            update.insert("stock", stock);
        }
        if let Some(is_active) = self.is_active {
            update.insert("is_active", is_active);
        }
        Ok(update)
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub cost: i64,
    pub stock: i64,
    pub is_active: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        ProductResponse {
            id: hex_id(product.id),
            name: product.name,
            description: product.description,
            image_url: product.image_url,
            cost: product.cost,
            stock: product.stock,
            is_active: product.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Placed,
    Shipped,
    Delivered,
    Cancelled,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Placed => "placed",
            RedemptionStatus::Shipped => "shipped",
            RedemptionStatus::Delivered => "delivered",
            RedemptionStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses an order in `self` may move to.
    pub fn can_move_to(&self, next: RedemptionStatus) -> bool {
        use RedemptionStatus::*;
        matches!(
            (self, next),
            (Placed, Shipped) | (Placed, Cancelled) | (Shipped, Delivered) | (Shipped, Cancelled)
        )
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateRedemptionStatusDto {
    pub status: RedemptionStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct ShippingAddress {
    #[validate(required, custom = "not_blank")]
    pub full_name: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub address: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub city: Option<String>,
    #[validate(required, custom = "not_blank")]
    pub postal_code: Option<String>,
    #[validate(required, custom = "phone_rule")]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Redemption {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_number: String,
    pub user_id: ObjectId,
    pub product_id: ObjectId,
    pub product_name: String,
    pub quantity: i64,
    pub total_cost: i64,
    pub shipping: ShippingAddress,
    pub status: RedemptionStatus,
    /// Set when the order is cancelled, cleared once coins and stock are back.
    #[serde(default)]
    pub refund_pending: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Redemption {
    pub fn has_pending_refund(&self) -> bool {
        self.status == RedemptionStatus::Cancelled && self.refund_pending
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RedeemDto {
    #[validate(required)]
    pub product_id: Option<String>,
    #[validate(range(min = 1, max = 10))]
    pub quantity: Option<i64>,
    #[validate]
    pub shipping: ShippingAddress,
}

impl RedeemDto {
    pub fn quantity(&self) -> i64 {
        self.quantity.unwrap_or(1)
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RedemptionResponse {
    pub id: String,
    pub order_number: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub total_cost: i64,
    pub shipping: ShippingAddress,
    pub status: RedemptionStatus,
    pub created_at: String,
}

impl From<Redemption> for RedemptionResponse {
    fn from(redemption: Redemption) -> Self {
        RedemptionResponse {
            id: hex_id(redemption.id),
            order_number: redemption.order_number,
            product_id: redemption.product_id.to_hex(),
            product_name: redemption.product_name,
            quantity: redemption.quantity,
            total_cost: redemption.total_cost,
            shipping: redemption.shipping,
            status: redemption.status,
            created_at: rfc3339(redemption.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CoinTransactionKind {
    Earned,
    Redeemed,
    Refunded,
}

impl CoinTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinTransactionKind::Earned => "earned",
            CoinTransactionKind::Redeemed => "redeemed",
            CoinTransactionKind::Refunded => "refunded",
        }
    }
}

/// One entry in a user's coin ledger. `amount` is always positive.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoinTransaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub kind: CoinTransactionKind,
    pub amount: i64,
    pub reference: String,
    pub description: String,
    /// False until the balance has moved.
    #[serde(default)]
    pub applied: bool,
    pub created_at: DateTime,
}

impl CoinTransaction {
    pub fn new(
        user_id: ObjectId,
        kind: CoinTransactionKind,
        amount: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        CoinTransaction {
            id: None,
            user_id,
            kind,
            amount,
            reference: reference.into(),
            description: description.into(),
            applied: false,
            created_at: DateTime::now(),
        }
    }

    /// Signed change to the balance.
    pub fn delta(&self) -> i64 {
        match self.kind {
            CoinTransactionKind::Redeemed => -self.amount,
            CoinTransactionKind::Earned | CoinTransactionKind::Refunded => self.amount,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CoinTransactionResponse {
    pub id: String,
    pub kind: CoinTransactionKind,
    pub amount: i64,
    pub reference: String,
    pub description: String,
    pub created_at: String,
}

impl From<CoinTransaction> for CoinTransactionResponse {
    fn from(tx: CoinTransaction) -> Self {
        CoinTransactionResponse {
            id: hex_id(tx.id),
            kind: tx.kind,
            amount: tx.amount,
            reference: tx.reference,
            description: tx.description,
            created_at: rfc3339(tx.created_at),
        }
    }
}
