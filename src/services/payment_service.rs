use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, LockType},
};
use sha2::Sha256;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::payments::{CreatePaymentRequest, PaymentAttempt, PaymentCallback, PaymentSettlement},
    entity::{
        Orders, Payments,
        orders::{self, Column as OrderCol},
        payments::{self, Column as PaymentCol},
        sea_orm_active_enums::{OrderStatus, PaymentMethod, PaymentStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Payment,
    response::{ApiResponse, Meta},
    services::order_service::apply_status_transition,
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of the provider's signature over the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> AppResult<()> {
    let provided = hex::decode(signature.trim())
        .map_err(|_| AppError::Unauthenticated("Invalid webhook signature".into()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| AppError::Unauthenticated("Invalid webhook signature".into()))
}

/// Settles the pending payment referenced by `tx_ref`.
///
/// Success marks the payment and the order's payment status as succeeded
/// and moves a pending order to `paid`. Failure marks both as failed and
/// leaves the order pending. A payment settles once.
pub async fn handle_callback(
    state: &AppState,
    callback: PaymentCallback,
) -> AppResult<ApiResponse<PaymentSettlement>> {
    callback.validate()?;
    if callback.status == PaymentStatus::Pending {
        return Err(AppError::field("status", "must be success or failed"));
    }

    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(OrderCol::TxRef.eq(callback.tx_ref.as_str()))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let pending = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::Status.eq(PaymentStatus::Pending))
        .order_by_desc(PaymentCol::CreatedAt)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let payment = match pending {
        Some(payment) => payment,
        None => Payments::find()
            .filter(PaymentCol::OrderId.eq(order.id))
            .order_by_desc(PaymentCol::CreatedAt)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?,
    };

    if !payment.status.can_transition_to(callback.status) {
        return Err(AppError::InvalidStateTransition {
            from: payment.status.as_str().into(),
            to: callback.status.as_str().into(),
        });
    }

    let now = Utc::now();
    let mut active: payments::ActiveModel = payment.into();
    active.status = Set(callback.status);
    if let Some(transaction_id) = callback.transaction_id.clone() {
        active.transaction_id = Set(Some(transaction_id));
    }
    if callback.status == PaymentStatus::Success {
        active.paid_at = Set(Some(now.into()));
    }
    let payment = active.update(&txn).await?;

    let order_status = order.status;
    let mut order_active: orders::ActiveModel = order.into();
    order_active.payment_status = Set(callback.status);
    order_active.updated_at = Set(now.into());
    let mut order = order_active.update(&txn).await?;

    if callback.status == PaymentStatus::Success && order_status == OrderStatus::Pending {
        order = apply_status_transition(&txn, order, OrderStatus::Paid, None).await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        tx_ref = %order.tx_ref,
        status = callback.status.as_str(),
        "payment settled"
    );
    audit::record(
        &state.orm,
        None,
        "payment_settle",
        "payments",
        serde_json::json!({
            "order_id": order.id,
            "payment_id": payment.id,
            "status": callback.status.as_str(),
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment recorded",
        PaymentSettlement {
            order: order.into(),
            payment: payment.into(),
        },
        Some(Meta::empty()),
    ))
}

/// Opens a new pending payment for one of the caller's unpaid orders.
///
/// A still-pending earlier attempt is failed first, so the order has a single
/// payment the provider can settle. Paid and cancelled orders are refused.
pub async fn create_payment_attempt(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<PaymentAttempt>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_status == PaymentStatus::Success {
        return Err(AppError::InvalidStateTransition {
            from: order.payment_status.as_str().into(),
            to: PaymentStatus::Pending.as_str().into(),
        });
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::InvalidStateTransition {
            from: order.status.as_str().into(),
            to: OrderStatus::Paid.as_str().into(),
        });
    }

    let previous = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(&txn)
        .await?;
    let payment_method = payload
        .payment_method
        .or(previous.map(|payment| payment.payment_method))
        .unwrap_or(PaymentMethod::CreditCard);

    Payments::update_many()
        .col_expr(PaymentCol::Status, Expr::value(PaymentStatus::Failed.as_str()))
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::Status.eq(PaymentStatus::Pending))
        .exec(&txn)
        .await?;

    let now = Utc::now();
    let payment = payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        payment_method: Set(payment_method),
        amount: Set(order.total_amount),
        status: Set(PaymentStatus::Pending),
        transaction_id: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let order = if order.payment_status == PaymentStatus::Pending {
        order
    } else {
        let mut active: orders::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Pending);
        active.updated_at = Set(now.into());
        active.update(&txn).await?
    };

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment.id,
        amount = payment.amount,
        "payment attempt opened"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "payment_attempt",
        "payments",
        serde_json::json!({
            "order_id": order.id,
            "payment_id": payment.id,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment started",
        PaymentAttempt {
            order: order.into(),
            payment: payment.into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let mut finder = Orders::find_by_id(order_id);
    if !user.is_admin() {
        finder = finder.filter(OrderCol::UserId.eq(user.user_id));
    }
    let order = finder.one(&state.orm).await?.ok_or(AppError::NotFound)?;

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::ok(payment.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"tx_ref":"TX-1","status":"success"}"#;
        let signature = sign_payload("hook-secret", body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature("hook-secret", body, &signature).is_ok());
    }

    #[test]
    fn tampered_body_or_secret_is_rejected() {
        let body = br#"{"tx_ref":"TX-1","status":"success"}"#;
        let signature = sign_payload("hook-secret", body).unwrap();
        assert!(verify_signature("hook-secret", br#"{"tx_ref":"TX-2"}"#, &signature).is_err());
        assert!(verify_signature("other", body, &signature).is_err());
        assert!(verify_signature("hook-secret", body, "not-hex").is_err());
    }
}
