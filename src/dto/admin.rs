use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entity::sea_orm_active_enums::UserRole,
    models::{Product, User},
    routes::params::Pagination,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LowStockQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct BulkInventoryItem {
    pub product_id: Uuid,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub stock_quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BulkInventoryRequest {
    #[validate(length(min = 1, max = 500), nested)]
    pub items: Vec<BulkInventoryItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkInventoryResult {
    pub updated: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LowStockList {
    pub threshold: i32,
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserWithStats {
    #[serde(flatten)]
    pub user: User,
    pub order_count: i64,
    pub total_spent: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<UserWithStats>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesStats {
    pub total_orders: i64,
    pub total_revenue: i64,
    pub average_order_value: i64,
    pub revenue_last_30_days: i64,
    pub orders_by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub total: i64,
    pub customers: i64,
    pub admins: i64,
    pub new_last_30_days: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub out_of_stock: i64,
    pub low_stock: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub sales: SalesStats,
    pub users: UserStats,
    pub products: ProductStats,
    pub reviews: ReviewStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(stock_quantity: i32) -> BulkInventoryItem {
        BulkInventoryItem {
            product_id: Uuid::new_v4(),
            stock_quantity,
        }
    }

    #[test]
    fn bulk_request_bounds_and_items_are_checked() {
        let empty = BulkInventoryRequest { items: Vec::new() };
        assert!(empty.validate().unwrap_err().errors().contains_key("items"));

        let negative = BulkInventoryRequest {
            items: vec![item(5), item(-1)],
        };
        assert!(negative.validate().is_err());

        let ok = BulkInventoryRequest {
            items: vec![item(0), item(12)],
        };
        assert!(ok.validate().is_ok());
    }
}
