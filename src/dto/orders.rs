use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::sea_orm_active_enums::{OrderStatus, PaymentMethod},
    models::{Order, OrderItem, Payment},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// Defaults to the caller's cart.
    pub cart_id: Option<Uuid>,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkShippedRequest {
    pub shipped_at: Option<DateTime<Utc>>,
}
