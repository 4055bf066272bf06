use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Product, WishlistEntry};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistAdded {
    pub entry: WishlistEntry,
    pub already_present: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistItem {
    pub id: Uuid,
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistList {
    pub items: Vec<WishlistItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistCount {
    pub count: i64,
}
