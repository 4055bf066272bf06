use std::collections::HashMap;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, Iterable,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    db::sum_as_bigint,
    dto::{
        admin::{
            BulkInventoryRequest, BulkInventoryResult, Dashboard, InventoryAdjustRequest,
            LowStockList, LowStockQuery, ProductStats, ReviewStats, SalesStats, StatusCount,
            UserList, UserListQuery, UserStats, UserWithStats,
        },
        orders::{MarkShippedRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        users::UpdateRoleRequest,
    },
    entity::{
        Orders, Products, Reviews, Users,
        orders::Column as OrderCol,
        products::{self, Column as ProductCol},
        reviews::Column as ReviewCol,
        sea_orm_active_enums::{OrderStatus, PaymentStatus, UserRole},
        users::{self, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, User},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service::{load_order_details, paginate_orders, transition_order},
    state::AppState,
};

async fn sum_orders<C: ConnectionTrait>(conn: &C, condition: Condition) -> AppResult<i64> {
    let sum: Option<Option<i64>> = Orders::find()
        .select_only()
        .column_as(sum_as_bigint(OrderCol::TotalAmount), "revenue")
        .filter(condition)
        .into_tuple()
        .one(conn)
        .await?;
    Ok(sum.flatten().unwrap_or(0))
}

pub async fn dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Dashboard>> {
    ensure_admin(user)?;
    let conn = &state.orm;
    let cutoff = Utc::now() - Duration::days(30);
    let threshold = state.config.low_stock_threshold;

    let not_cancelled = || Condition::all().add(OrderCol::Status.ne(OrderStatus::Cancelled));

    let total_orders = Orders::find().count(conn).await? as i64;
    let billable_orders = Orders::find().filter(not_cancelled()).count(conn).await? as i64;
    let total_revenue = sum_orders(conn, not_cancelled()).await?;
    let revenue_last_30_days =
        sum_orders(conn, not_cancelled().add(OrderCol::OrderDate.gte(cutoff))).await?;

    let mut orders_by_status = Vec::new();
    for status in OrderStatus::iter() {
        let count = Orders::find()
            .filter(OrderCol::Status.eq(status))
            .count(conn)
            .await? as i64;
        orders_by_status.push(StatusCount {
            status: status.as_str().to_string(),
            count,
        });
    }

    let sales = SalesStats {
        total_orders,
        total_revenue,
        average_order_value: if billable_orders > 0 {
            total_revenue / billable_orders
        } else {
            0
        },
        revenue_last_30_days,
        orders_by_status,
    };

    let users = UserStats {
        total: Users::find().count(conn).await? as i64,
        customers: Users::find()
            .filter(UserCol::Role.eq(UserRole::Customer))
            .count(conn)
            .await? as i64,
        admins: Users::find()
            .filter(UserCol::Role.eq(UserRole::Admin))
            .count(conn)
            .await? as i64,
        new_last_30_days: Users::find()
            .filter(UserCol::CreatedAt.gte(cutoff))
            .count(conn)
            .await? as i64,
    };

    let products = ProductStats {
        total: Products::find().count(conn).await? as i64,
        active: Products::find()
            .filter(ProductCol::IsActive.eq(true))
            .count(conn)
            .await? as i64,
        inactive: Products::find()
            .filter(ProductCol::IsActive.eq(false))
            .count(conn)
            .await? as i64,
        out_of_stock: Products::find()
            .filter(ProductCol::StockQuantity.lte(0))
            .count(conn)
            .await? as i64,
        low_stock: Products::find()
            .filter(ProductCol::StockQuantity.gt(0))
            .filter(ProductCol::StockQuantity.lt(threshold))
            .count(conn)
            .await? as i64,
    };

    let approved = Reviews::find()
        .filter(ReviewCol::IsApproved.eq(true))
        .count(conn)
        .await? as i64;
    let rating_sum: Option<Option<i64>> = Reviews::find()
        .select_only()
        .column_as(sum_as_bigint(ReviewCol::Rating), "rating_sum")
        .filter(ReviewCol::IsApproved.eq(true))
        .into_tuple()
        .one(conn)
        .await?;
    let reviews = ReviewStats {
        total: Reviews::find().count(conn).await? as i64,
        pending: Reviews::find()
            .filter(ReviewCol::IsApproved.eq(false))
            .count(conn)
            .await? as i64,
        approved,
        average_rating: match (approved, rating_sum.flatten()) {
            (0, _) | (_, None) => None,
            (n, Some(sum)) => Some(((sum as f64 / n as f64) * 100.0).round() / 100.0),
        },
    };

    Ok(ApiResponse::ok(Dashboard {
        sales,
        users,
        products,
        reviews,
    }))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Users::find().order_by_desc(UserCol::CreatedAt);
    if let Some(role) = query.role {
        finder = finder.filter(UserCol::Role.eq(role));
    }
    let total = finder.clone().count(&state.orm).await? as i64;
    let page_users = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = page_users.iter().map(|u| u.id).collect();
    let order_counts: HashMap<Uuid, i64> = Orders::find()
        .select_only()
        .column(OrderCol::UserId)
        .column_as(Expr::col(OrderCol::Id).count(), "order_count")
        .filter(OrderCol::UserId.is_in(ids.clone()))
        .group_by(OrderCol::UserId)
        .into_tuple::<(Uuid, i64)>()
        .all(&state.orm)
        .await?
        .into_iter()
        .collect();
    let spent: HashMap<Uuid, i64> = Orders::find()
        .select_only()
        .column(OrderCol::UserId)
        .column_as(sum_as_bigint(OrderCol::TotalAmount), "total_spent")
        .filter(OrderCol::UserId.is_in(ids))
        .filter(OrderCol::PaymentStatus.eq(PaymentStatus::Success))
        .group_by(OrderCol::UserId)
        .into_tuple::<(Uuid, Option<i64>)>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(id, sum)| (id, sum.unwrap_or(0)))
        .collect();

    let items = page_users
        .into_iter()
        .map(|model| {
            let id = model.id;
            UserWithStats {
                user: model.into(),
                order_count: order_counts.get(&id).copied().unwrap_or(0),
                total_spent: spent.get(&id).copied().unwrap_or(0),
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_user_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("Admins cannot change their own role".into()));
    }

    let target = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut active: users::ActiveModel = target.into();
    active.role = Set(payload.role);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "user_role",
        "users",
        serde_json::json!({ "user_id": id, "role": payload.role.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Role updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    if let Some(user_id) = query.user_id {
        condition = condition.add(OrderCol::UserId.eq(user_id));
    }
    paginate_orders(state, condition, &query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let details = load_order_details(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order found",
        details,
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let details = transition_order(state, user, id, None, payload.status, None).await?;
    Ok(ApiResponse::success(
        "Order updated",
        details,
        Some(Meta::empty()),
    ))
}

pub async fn mark_shipped(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: MarkShippedRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let details =
        transition_order(state, user, id, None, OrderStatus::Shipped, payload.shipped_at).await?;
    Ok(ApiResponse::success(
        "Order shipped",
        details,
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    ensure_admin(user)?;
    let threshold = query
        .threshold
        .unwrap_or(state.config.low_stock_threshold)
        .max(0);
    let (page, limit, offset) = query.pagination.normalize();

    let finder = Products::find()
        .filter(ProductCol::StockQuantity.lt(threshold))
        .order_by_asc(ProductCol::StockQuantity)
        .order_by_desc(ProductCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Low stock",
        LowStockList { threshold, items },
        Some(meta),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::field("delta", "must not be 0"));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product
        .stock_quantity
        .checked_add(payload.delta)
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| AppError::field("delta", "stock cannot go below zero"))?;

    let mut active: products::ActiveModel = product.into();
    active.stock_quantity = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(product_id = %id, delta = payload.delta, stock = new_stock, "inventory adjusted");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

/// Sets absolute quantities; unknown product ids are reported, not fatal.
pub async fn bulk_update_inventory(
    state: &AppState,
    user: &AuthUser,
    payload: BulkInventoryRequest,
) -> AppResult<ApiResponse<BulkInventoryResult>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let now = Utc::now();
    let mut updated = Vec::new();
    let mut failed = Vec::new();
    for item in &payload.items {
        let result = Products::update_many()
            .col_expr(ProductCol::StockQuantity, Expr::value(item.stock_quantity))
            .col_expr(ProductCol::UpdatedAt, Expr::value(now))
            .filter(ProductCol::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 1 {
            updated.push(item.product_id);
        } else {
            failed.push(item.product_id);
        }
    }
    txn.commit().await?;

    if !failed.is_empty() {
        tracing::warn!(failed = failed.len(), "bulk inventory update skipped unknown products");
    }
    audit::record(
        &state.orm,
        Some(user.user_id),
        "inventory_bulk",
        "products",
        serde_json::json!({ "updated": updated.len(), "failed": failed.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        BulkInventoryResult { updated, failed },
        Some(Meta::empty()),
    ))
}
