use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        CartItems, Carts, Products,
        cart_items::{self, Column as CartItemCol},
        carts::{self, Column as CartCol},
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, session::CartOwner},
    response::{ApiResponse, Meta},
    services::product_service::find_active_product,
    state::AppState,
};

pub async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> AppResult<Option<carts::Model>> {
    let finder = match owner {
        CartOwner::User(user_id) => Carts::find().filter(CartCol::UserId.eq(*user_id)),
        CartOwner::Session(session_id) => Carts::find()
            .filter(CartCol::SessionId.eq(session_id.as_str()))
            .filter(CartCol::UserId.is_null()),
    };
    Ok(finder.order_by_asc(CartCol::CreatedAt).one(conn).await?)
}

/// The single cart for `owner`, created on first use.
pub async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> AppResult<carts::Model> {
    if let Some(cart) = find_cart(conn, owner).await? {
        return Ok(cart);
    }

    let (user_id, session_id) = match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(session) => (None, Some(session.clone())),
    };
    let now = Utc::now();
    let cart = carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        session_id: Set(session_id),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(cart)
}

async fn touch<C: ConnectionTrait>(conn: &C, cart: carts::Model) -> AppResult<()> {
    let mut active: carts::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

fn amount_too_large() -> AppError {
    AppError::field("quantity", "amount exceeds the supported maximum")
}

/// `unit_price * quantity`, rejected when it does not fit in minor units.
pub fn line_total(unit_price: i64, quantity: i32) -> AppResult<i64> {
    unit_price
        .checked_mul(i64::from(quantity))
        .ok_or_else(amount_too_large)
}

/// Adds a line total to a running sum with the same overflow rule.
pub fn add_amount(total: i64, amount: i64) -> AppResult<i64> {
    total.checked_add(amount).ok_or_else(amount_too_large)
}

/// Lines with product names and prices, newest first.
pub async fn build_view<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<CartView> {
    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_desc(CartItemCol::AddedAt)
        .find_also_related(Products)
        .all(conn)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut total_items: i64 = 0;
    let mut subtotal: i64 = 0;
    for (item, product) in rows {
        let Some(product) = product else {
            continue;
        };
        let total = line_total(product.price, item.quantity)?;
        subtotal = add_amount(subtotal, total)?;
        total_items += i64::from(item.quantity);
        items.push(CartLine {
            id: item.id,
            product_id: product.id,
            product_name: product.name,
            unit_price: product.price,
            quantity: item.quantity,
            line_total: total,
        });
    }

    Ok(CartView {
        id: cart_id,
        items,
        total_items,
        subtotal,
    })
}

pub async fn get_cart(state: &AppState, owner: &CartOwner) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_cart(&state.orm, owner).await?;
    let view = build_view(&state.orm, cart.id).await?;
    Ok(ApiResponse::ok(view))
}

/// Adds to an existing line or starts a new one. Stock is checked at checkout only.
pub async fn add_to_cart(
    state: &AppState,
    owner: &CartOwner,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity < 1 {
        return Err(AppError::InvalidQuantity);
    }

    let txn = state.orm.begin().await?;
    find_active_product(&txn, payload.product_id).await?;
    let cart = get_or_create_cart(&txn, owner).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&txn)
        .await?;

    match existing {
        Some(item) => {
            let quantity = item
                .quantity
                .checked_add(payload.quantity)
                .ok_or(AppError::InvalidQuantity)?;
            let mut active: cart_items::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.update(&txn).await?;
        }
        None => {
            cart_items::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                added_at: Set(Utc::now().into()),
            }
            .insert(&txn)
            .await?;
        }
    }

    let cart_id = cart.id;
    touch(&txn, cart).await?;
    let view = build_view(&txn, cart_id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        owner.user_id(),
        "cart_add",
        "carts",
        serde_json::json!({
            "cart_id": cart_id,
            "product_id": payload.product_id,
            "quantity": payload.quantity,
        }),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", view, Some(Meta::empty())))
}

/// Sets a line's quantity; 0 removes it.
pub async fn update_cart_item(
    state: &AppState,
    owner: &CartOwner,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity < 0 {
        return Err(AppError::InvalidQuantity);
    }

    let txn = state.orm.begin().await?;
    let cart = find_cart(&txn, owner).await?.ok_or(AppError::NotFound)?;
    let item = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.quantity == 0 {
        CartItems::delete_by_id(item.id).exec(&txn).await?;
    } else {
        find_active_product(&txn, product_id).await?;
        let mut active: cart_items::ActiveModel = item.into();
        active.quantity = Set(payload.quantity);
        active.update(&txn).await?;
    }

    let cart_id = cart.id;
    touch(&txn, cart).await?;
    let view = build_view(&txn, cart_id).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Cart updated", view, Some(Meta::empty())))
}

pub async fn remove_from_cart(
    state: &AppState,
    owner: &CartOwner,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    update_cart_item(state, owner, product_id, UpdateCartItemRequest { quantity: 0 }).await
}

pub async fn clear_cart(state: &AppState, owner: &CartOwner) -> AppResult<ApiResponse<CartView>> {
    let txn = state.orm.begin().await?;
    let cart = get_or_create_cart(&txn, owner).await?;
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    let cart_id = cart.id;
    touch(&txn, cart).await?;
    let view = build_view(&txn, cart_id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        owner.user_id(),
        "cart_clear",
        "carts",
        serde_json::json!({ "cart_id": cart_id }),
    )
    .await;

    Ok(ApiResponse::success("Cart cleared", view, Some(Meta::empty())))
}

/// Folds the session cart into the user's cart, summing shared products.
/// Without a user cart the session cart is simply handed over.
pub async fn merge_carts(
    state: &AppState,
    session: &CartOwner,
    user: &AuthUser,
) -> AppResult<Option<CartView>> {
    let txn = state.orm.begin().await?;
    let Some(session_cart) = find_cart(&txn, session).await? else {
        return Ok(None);
    };

    let user_owner = CartOwner::User(user.user_id);
    let cart_id = match find_cart(&txn, &user_owner).await? {
        None => {
            let mut active: carts::ActiveModel = session_cart.into();
            active.user_id = Set(Some(user.user_id));
            active.session_id = Set(None);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?.id
        }
        Some(user_cart) => {
            let mut existing: HashMap<Uuid, cart_items::Model> = CartItems::find()
                .filter(CartItemCol::CartId.eq(user_cart.id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|item| (item.product_id, item))
                .collect();

            let incoming = CartItems::find()
                .filter(CartItemCol::CartId.eq(session_cart.id))
                .all(&txn)
                .await?;

            for item in incoming {
                match existing.remove(&item.product_id) {
                    Some(target) => {
                        let quantity = target.quantity.saturating_add(item.quantity);
                        let mut active: cart_items::ActiveModel = target.into();
                        active.quantity = Set(quantity);
                        active.update(&txn).await?;
                        CartItems::delete_by_id(item.id).exec(&txn).await?;
                    }
                    None => {
                        let mut active: cart_items::ActiveModel = item.into();
                        active.cart_id = Set(user_cart.id);
                        active.update(&txn).await?;
                    }
                }
            }

            Carts::delete_by_id(session_cart.id).exec(&txn).await?;
            let cart_id = user_cart.id;
            touch(&txn, user_cart).await?;
            cart_id
        }
    };

    let view = build_view(&txn, cart_id).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, %cart_id, "session cart merged");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_merge",
        "carts",
        serde_json::json!({ "cart_id": cart_id }),
    )
    .await;

    Ok(Some(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_totals_multiply_in_minor_units() {
        assert_eq!(line_total(1000, 3).unwrap(), 3000);
        assert_eq!(add_amount(3000, 500).unwrap(), 3500);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        assert!(matches!(
            line_total(5_000_000_000, i32::MAX),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            add_amount(i64::MAX, 1),
            Err(AppError::Validation { .. })
        ));
    }
}
