use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entity::sea_orm_active_enums::{PaymentMethod, PaymentStatus},
    models::{Order, Payment},
};

/// Settlement notice posted by the payment provider.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct PaymentCallback {
    #[validate(length(min = 1, max = 100))]
    pub tx_ref: String,
    pub status: PaymentStatus,
    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentSettlement {
    pub order: Order,
    pub payment: Payment,
}

/// Starts another payment for an unpaid order. Without a method the
/// previous attempt's method is reused.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentAttempt {
    pub order: Order,
    pub payment: Payment,
}
