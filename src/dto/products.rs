use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "must be greater than 0"))]
    pub price: i64,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub stock_quantity: i32,
    pub category_id: Uuid,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "must be greater than 0"))]
    pub price: Option<i64>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub stock_quantity: Option<i32>,
    pub category_id: Option<Uuid>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub in_stock: bool,
    /// Mean rating over approved reviews, absent when there are none.
    pub average_rating: Option<f64>,
    pub review_count: i64,
}
