use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        cart::{AddToCartRequest, CartView},
        wishlist::{AddToWishlistRequest, WishlistAdded, WishlistCount, WishlistItem, WishlistList},
    },
    entity::{
        Products, Wishlists,
        wishlists::{self, Column as WishlistCol},
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, session::CartOwner},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::{cart_service, product_service::find_active_product},
    state::AppState,
};

pub async fn list_wishlist(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<WishlistList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .order_by_desc(WishlistCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .find_also_related(Products)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(entry, product)| {
            product.map(|product| WishlistItem {
                id: entry.id,
                product: product.into(),
                added_at: entry.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", WishlistList { items }, Some(meta)))
}

/// Re-adding a saved product reports the existing entry.
pub async fn add_to_wishlist(
    state: &AppState,
    user: &AuthUser,
    payload: AddToWishlistRequest,
) -> AppResult<ApiResponse<WishlistAdded>> {
    find_active_product(&state.orm, payload.product_id).await?;

    let existing = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .filter(WishlistCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;
    if let Some(entry) = existing {
        return Ok(ApiResponse::success(
            "Product already in wishlist",
            WishlistAdded {
                entry: entry.into(),
                already_present: true,
            },
            Some(Meta::empty()),
        ));
    }

    let entry = wishlists::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "wishlist_add",
        "wishlists",
        serde_json::json!({ "product_id": payload.product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Added to wishlist",
        WishlistAdded {
            entry: entry.into(),
            already_present: false,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_wishlist(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let deleted = Wishlists::delete_many()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .filter(WishlistCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Removed from wishlist",
        serde_json::json!({ "product_id": product_id }),
        Some(Meta::empty()),
    ))
}

pub async fn count_wishlist(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<WishlistCount>> {
    let count = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await? as i64;
    Ok(ApiResponse::ok(WishlistCount { count }))
}

pub async fn clear_wishlist(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<WishlistCount>> {
    let deleted = Wishlists::delete_many()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::success(
        "Wishlist cleared",
        WishlistCount {
            count: deleted.rows_affected as i64,
        },
        Some(Meta::empty()),
    ))
}

/// Puts one unit in the cart and drops the wishlist entry.
pub async fn move_to_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let entry = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .filter(WishlistCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let owner = CartOwner::User(user.user_id);
    let cart = cart_service::add_to_cart(
        state,
        &owner,
        AddToCartRequest {
            product_id,
            quantity: 1,
        },
    )
    .await?;

    Wishlists::delete_by_id(entry.id).exec(&state.orm).await?;

    Ok(ApiResponse::success(
        "Moved to cart",
        cart.data.ok_or(AppError::NotFound)?,
        Some(Meta::empty()),
    ))
}
