use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{OrderList, OrderWithItems, PlaceOrderRequest},
    entity::{
        CartItems, Carts, OrderItems, Orders, Payments, Products,
        cart_items::Column as CartItemCol,
        carts::Column as CartCol,
        order_items::{self, Column as OrderItemCol},
        orders::{self, Column as OrderCol},
        payments::{self, Column as PaymentCol},
        products::{self, Column as ProductCol},
        sea_orm_active_enums::{OrderStatus, PaymentStatus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        address_service::owned_address,
        cart_service::{add_amount, line_total},
    },
    state::AppState,
};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// `ORD-YYYYMMDD-XXXXXXXXXX`, ten upper-case hex digits of a fresh uuid.
pub fn build_order_number(now: DateTime<Utc>) -> String {
    let date = now.format("%Y%m%d");
    let token = Uuid::new_v4().simple().to_string()[..10].to_ascii_uppercase();
    format!("ORD-{date}-{token}")
}

/// Reference the payment provider echoes back on settlement.
pub fn build_tx_ref() -> String {
    format!("TX-{}", Uuid::new_v4())
}

async fn unique_order_number<C: ConnectionTrait>(conn: &C) -> AppResult<String> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = build_order_number(Utc::now());
        let taken = Orders::find()
            .filter(OrderCol::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
        tracing::warn!(order_number = %candidate, "order number collision, retrying");
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "could not allocate a unique order number"
    )))
}

/// Items and latest payment for an order.
pub async fn load_order_details<C: ConnectionTrait>(
    conn: &C,
    order: orders::Model,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::ProductId)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(conn)
        .await?
        .map(Into::into);

    Ok(OrderWithItems {
        order: order.into(),
        items,
        payment,
    })
}

/// Takes `quantity` units off a product's stock, only if that many remain.
///
/// The check and the decrement are one statement, so a competing checkout
/// that got there first shows up as `OutOfStock` rather than negative stock.
pub async fn reserve_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    let updated = Products::update_many()
        .col_expr(
            ProductCol::StockQuantity,
            Expr::col(ProductCol::StockQuantity).sub(quantity),
        )
        .col_expr(ProductCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(ProductCol::Id.eq(product_id))
        .filter(ProductCol::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;
    if updated.rows_affected != 1 {
        return Err(AppError::OutOfStock { product_id });
    }
    Ok(())
}

/// Converts the caller's cart into an order in a single transaction.
///
/// Products are locked in id order before stock is checked, and the
/// decrement itself is conditional on enough stock remaining, so two
/// checkouts racing for the last unit cannot both succeed. Any error
/// drops the transaction and leaves cart, stock and orders untouched.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let cart = match payload.cart_id {
        Some(cart_id) => Carts::find_by_id(cart_id)
            .filter(CartCol::UserId.eq(user.user_id))
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?,
        None => Carts::find()
            .filter(CartCol::UserId.eq(user.user_id))
            .one(&txn)
            .await?
            .ok_or(AppError::EmptyOrder)?,
    };

    owned_address(&txn, user.user_id, payload.shipping_address_id)
        .await
        .map_err(|err| address_error(err, "shipping_address_id"))?;
    owned_address(&txn, user.user_id, payload.billing_address_id)
        .await
        .map_err(|err| address_error(err, "billing_address_id"))?;

    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::ProductId)
        .all(&txn)
        .await?;
    if lines.is_empty() {
        return Err(AppError::EmptyOrder);
    }

    let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    let locked: HashMap<Uuid, products::Model> = Products::find()
        .filter(ProductCol::Id.is_in(product_ids))
        .order_by_asc(ProductCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut total_amount: i64 = 0;
    let mut priced = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = locked
            .get(&line.product_id)
            .filter(|product| product.is_active)
            .ok_or(AppError::NotFound)?;
        if line.quantity < 1 {
            return Err(AppError::InvalidQuantity);
        }
        if product.stock_quantity < line.quantity {
            return Err(AppError::OutOfStock {
                product_id: product.id,
            });
        }
        total_amount = add_amount(total_amount, line_total(product.price, line.quantity)?)?;
        priced.push((line.product_id, line.quantity, product.price));
    }

    let now = Utc::now();
    let order = orders::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        shipping_address_id: Set(payload.shipping_address_id),
        billing_address_id: Set(payload.billing_address_id),
        order_number: Set(unique_order_number(&txn).await?),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        tx_ref: Set(build_tx_ref()),
        order_date: Set(now.into()),
        shipped_at: Set(None),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    for (product_id, quantity, unit_price) in priced {
        order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
        }
        .insert(&txn)
        .await?;

        reserve_stock(&txn, product_id, quantity).await?;
    }

    payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        payment_method: Set(payload.payment_method),
        amount: Set(total_amount),
        status: Set(PaymentStatus::Pending),
        transaction_id: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    let details = load_order_details(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %details.order.id,
        order_number = %details.order.order_number,
        total_amount,
        "order placed"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_place",
        "orders",
        serde_json::json!({
            "order_id": details.order.id,
            "order_number": details.order.order_number,
            "total_amount": total_amount,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed",
        details,
        Some(Meta::empty()),
    ))
}

fn address_error(err: AppError, field: &str) -> AppError {
    match err {
        AppError::NotFound => AppError::field(field, "address does not belong to the user"),
        other => other,
    }
}

/// Moves an order along the state machine and applies the side effects of
/// the target state. Must run inside the caller's transaction.
pub async fn apply_status_transition<C: ConnectionTrait>(
    conn: &C,
    order: orders::Model,
    to: OrderStatus,
    shipped_at: Option<DateTime<Utc>>,
) -> AppResult<orders::Model> {
    let from = order.status;
    if !from.can_transition_to(to) {
        return Err(AppError::InvalidStateTransition {
            from: from.as_str().into(),
            to: to.as_str().into(),
        });
    }

    let now = Utc::now();
    let mut active: orders::ActiveModel = order.clone().into();
    active.status = Set(to);
    active.updated_at = Set(now.into());

    match to {
        OrderStatus::Cancelled => {
            let lines = OrderItems::find()
                .filter(OrderItemCol::OrderId.eq(order.id))
                .order_by_asc(OrderItemCol::ProductId)
                .all(conn)
                .await?;
            for line in lines {
                Products::update_many()
                    .col_expr(
                        ProductCol::StockQuantity,
                        Expr::col(ProductCol::StockQuantity).add(line.quantity),
                    )
                    .col_expr(ProductCol::UpdatedAt, Expr::value(now))
                    .filter(ProductCol::Id.eq(line.product_id))
                    .exec(conn)
                    .await?;
            }

            Payments::update_many()
                .col_expr(PaymentCol::Status, Expr::value(PaymentStatus::Failed.as_str()))
                .filter(PaymentCol::OrderId.eq(order.id))
                .filter(PaymentCol::Status.eq(PaymentStatus::Pending))
                .exec(conn)
                .await?;
            if order.payment_status == PaymentStatus::Pending {
                active.payment_status = Set(PaymentStatus::Failed);
            }
        }
        OrderStatus::Shipped => {
            active.shipped_at = Set(Some(shipped_at.unwrap_or(now).into()));
        }
        _ => {}
    }

    let updated = active.update(conn).await?;
    tracing::info!(
        order_id = %updated.id,
        from = from.as_str(),
        to = to.as_str(),
        "order status changed"
    );
    Ok(updated)
}

/// Locks the order row, optionally scoped to one owner, and transitions it.
pub async fn transition_order(
    state: &AppState,
    actor: &AuthUser,
    order_id: Uuid,
    owner: Option<Uuid>,
    to: OrderStatus,
    shipped_at: Option<DateTime<Utc>>,
) -> AppResult<OrderWithItems> {
    let txn = state.orm.begin().await?;

    let mut finder = Orders::find_by_id(order_id);
    if let Some(owner) = owner {
        finder = finder.filter(OrderCol::UserId.eq(owner));
    }
    let order = finder
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let from = order.status;

    let order = apply_status_transition(&txn, order, to, shipped_at).await?;
    let details = load_order_details(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(actor.user_id),
        "order_status",
        "orders",
        serde_json::json!({
            "order_id": order_id,
            "from": from.as_str(),
            "to": to.as_str(),
        }),
    )
    .await;

    Ok(details)
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    paginate_orders(state, condition, &query).await
}

pub async fn paginate_orders(
    state: &AppState,
    condition: Condition,
    query: &OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder.order_by_asc(OrderCol::OrderDate),
        SortOrder::Desc => finder.order_by_desc(OrderCol::OrderDate),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let details = load_order_details(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", details, Some(Meta::empty())))
}

/// Customers may cancel their own orders while the state machine allows it.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let details = transition_order(
        state,
        user,
        id,
        Some(user.user_id),
        OrderStatus::Cancelled,
        None,
    )
    .await?;
    Ok(ApiResponse::success(
        "Order cancelled",
        details,
        Some(Meta::empty()),
    ))
}
