use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::users::{Profile, UpdateProfileRequest},
    entity::{
        Addresses, Carts, OrderItems, Orders, Payments, Reviews, Users, Wishlists, addresses,
        carts, order_items, orders, payments, reviews, users, wishlists,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::normalize_email,
    state::AppState,
};

async fn find_user(state: &AppState, id: Uuid) -> AppResult<users::Model> {
    Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Profile>> {
    let model = find_user(state, user.user_id).await?;
    let addresses = Addresses::find()
        .filter(addresses::Column::UserId.eq(user.user_id))
        .order_by_desc(addresses::Column::IsDefault)
        .order_by_asc(addresses::Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::ok(Profile {
        user: model.into(),
        addresses,
    }))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    payload.validate()?;
    let model = find_user(state, user.user_id).await?;

    let mut active: users::ActiveModel = model.clone().into();
    if let Some(email) = payload.email {
        let email = normalize_email(&email);
        if email != model.email {
            let taken = Users::find()
                .filter(users::Column::Email.eq(email.as_str()))
                .filter(users::Column::Id.ne(model.id))
                .one(&state.orm)
                .await?;
            if taken.is_some() {
                return Err(AppError::Conflict("Email is already taken".into()));
            }
            active.email = Set(email);
        }
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(Some(first_name));
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(Some(last_name));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    active.updated_at = Set(Utc::now().into());
    let model = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Profile updated",
        model.into(),
        Some(Meta::empty()),
    ))
}

/// Removes the account, applying each foreign-key rule explicitly in one transaction.
pub async fn delete_account(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    Users::find_by_id(user.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    // carts outlive their owner (SET NULL)
    Carts::update_many()
        .col_expr(carts::Column::UserId, Expr::value(Option::<Uuid>::None))
        .filter(carts::Column::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    let order_ids: Vec<Uuid> = Orders::find()
        .select_only()
        .column(orders::Column::Id)
        .filter(orders::Column::UserId.eq(user.user_id))
        .into_tuple()
        .all(&txn)
        .await?;
    if !order_ids.is_empty() {
        Payments::delete_many()
            .filter(payments::Column::OrderId.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;
        OrderItems::delete_many()
            .filter(order_items::Column::OrderId.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;
        Orders::delete_many()
            .filter(orders::Column::Id.is_in(order_ids.clone()))
            .exec(&txn)
            .await?;
    }

    Reviews::delete_many()
        .filter(reviews::Column::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;
    Wishlists::delete_many()
        .filter(wishlists::Column::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;
    Addresses::delete_many()
        .filter(addresses::Column::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;
    Users::delete_by_id(user.user_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, orders = order_ids.len(), "account deleted");
    audit::record(
        &state.orm,
        None,
        "user_delete",
        "users",
        serde_json::json!({ "user_id": user.user_id, "orders_removed": order_ids.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Account deleted",
        serde_json::json!({ "id": user.user_id }),
        Some(Meta::empty()),
    ))
}
