use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
    entity::{
        Addresses, Orders,
        addresses::{self, Column as AddressCol},
        orders::Column as OrderCol,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Address owned by `user_id`; another user's address is reported as missing.
pub async fn owned_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<addresses::Model> {
    Addresses::find_by_id(id)
        .filter(AddressCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn clear_default<C: ConnectionTrait>(conn: &C, user_id: Uuid, keep: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(AddressCol::IsDefault, Expr::value(false))
        .filter(AddressCol::UserId.eq(user_id))
        .filter(AddressCol::Id.ne(keep))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::IsDefault)
        .order_by_asc(AddressCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(ApiResponse::ok(AddressList { items }))
}

pub async fn get_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let address = owned_address(&state.orm, user.user_id, id).await?;
    Ok(ApiResponse::ok(address.into()))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    payload.validate()?;
    let txn = state.orm.begin().await?;

    let existing = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let is_default = payload.is_default || existing == 0;

    let now = Utc::now();
    let address = addresses::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address_type: Set(payload.address_type),
        street: Set(payload.street),
        city: Set(payload.city),
        state: Set(payload.state),
        postal_code: Set(payload.postal_code),
        country: Set(payload.country),
        is_default: Set(is_default),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    if is_default {
        clear_default(&txn, user.user_id, address.id).await?;
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Address created",
        address.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    payload.validate()?;
    let txn = state.orm.begin().await?;
    let address = owned_address(&txn, user.user_id, id).await?;

    let mut active: addresses::ActiveModel = address.into();
    if let Some(address_type) = payload.address_type {
        active.address_type = Set(address_type);
    }
    if let Some(street) = payload.street {
        active.street = Set(Some(street));
    }
    if let Some(city) = payload.city {
        active.city = Set(Some(city));
    }
    if let Some(region) = payload.state {
        active.state = Set(Some(region));
    }
    if let Some(postal_code) = payload.postal_code {
        active.postal_code = Set(Some(postal_code));
    }
    if let Some(country) = payload.country {
        active.country = Set(Some(country));
    }
    if let Some(is_default) = payload.is_default {
        active.is_default = Set(is_default);
    }
    active.updated_at = Set(Utc::now().into());
    let address = active.update(&txn).await?;

    if address.is_default {
        clear_default(&txn, user.user_id, address.id).await?;
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Address updated",
        address.into(),
        Some(Meta::empty()),
    ))
}

/// Addresses referenced by an order cannot be removed.
pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let address = owned_address(&txn, user.user_id, id).await?;

    let referenced = Orders::find()
        .filter(
            sea_orm::Condition::any()
                .add(OrderCol::ShippingAddressId.eq(id))
                .add(OrderCol::BillingAddressId.eq(id)),
        )
        .count(&txn)
        .await?;
    if referenced > 0 {
        return Err(AppError::Conflict(
            "Address is used by existing orders".into(),
        ));
    }

    Addresses::delete_by_id(address.id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "address_delete",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Address deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}
