use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    db::sum_as_bigint,
    dto::products::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
    entity::{
        CartItems, Categories, OrderItems, Products, Reviews, Wishlists, cart_items,
        order_items,
        products::{self, Column as ProductCol},
        reviews::{self, Column as ReviewCol},
        wishlists,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{Availability, ProductQuery, ProductSortBy, SortOrder},
    services::{
        category_service::{descendant_ids, load_parent_map},
        slugs::{base_slug, generate_sku, slug_candidate},
    },
    state::AppState,
};

/// Product that exists and is listed; inactive products read as missing.
pub async fn find_active_product<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<products::Model> {
    Products::find_by_id(id)
        .filter(ProductCol::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn unique_slug<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<String> {
    let base = base_slug(name);
    let mut attempt = 1;
    loop {
        let candidate = slug_candidate(&base, attempt);
        let mut finder = Products::find().filter(ProductCol::Slug.eq(candidate.as_str()));
        if let Some(id) = exclude {
            finder = finder.filter(ProductCol::Id.ne(id));
        }
        if finder.count(conn).await? == 0 {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<()> {
    if Categories::find_by_id(id).one(conn).await?.is_none() {
        return Err(AppError::field("category_id", "category does not exist"));
    }
    Ok(())
}

/// Review count and mean rating over approved reviews, rounded to two places.
pub async fn rating_summary<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> AppResult<(i64, Option<f64>)> {
    let row: Option<(i64, Option<i64>)> = Reviews::find()
        .select_only()
        .column_as(Expr::col(ReviewCol::Id).count(), "review_count")
        .column_as(sum_as_bigint(ReviewCol::Rating), "rating_sum")
        .filter(ReviewCol::ProductId.eq(product_id))
        .filter(ReviewCol::IsApproved.eq(true))
        .into_tuple()
        .one(conn)
        .await?;

    let (count, sum) = row.unwrap_or((0, None));
    let average = match (count, sum) {
        (0, _) | (_, None) => None,
        (count, Some(sum)) => Some(((sum as f64 / count as f64) * 100.0).round() / 100.0),
    };
    Ok((count, average))
}

async fn detail(state: &AppState, product: products::Model) -> AppResult<ProductDetail> {
    let (review_count, average_rating) = rating_summary(&state.orm, product.id).await?;
    Ok(ProductDetail {
        in_stock: product.stock_quantity > 0,
        product: product.into(),
        average_rating,
        review_count,
    })
}

pub async fn list_products(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    let show_inactive = query.include_inactive && viewer.is_some_and(AuthUser::is_admin);
    if !show_inactive {
        condition = condition.add(ProductCol::IsActive.eq(true));
    }

    if let Some(category_id) = query.category_id {
        if query.include_subcategories {
            let parents = load_parent_map(&state.orm).await?;
            let mut ids = descendant_ids(&parents, category_id);
            ids.push(category_id);
            condition = condition.add(ProductCol::CategoryId.is_in(ids));
        } else {
            condition = condition.add(ProductCol::CategoryId.eq(category_id));
        }
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(ProductCol::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(ProductCol::Price.lte(max_price));
    }

    match query.availability.unwrap_or_default() {
        Availability::All => {}
        Availability::InStock => condition = condition.add(ProductCol::StockQuantity.gt(0)),
        Availability::OutOfStock => condition = condition.add(ProductCol::StockQuantity.lte(0)),
    }

    let sort_col = match query.sort_by.unwrap_or_default() {
        ProductSortBy::Id => ProductCol::Id,
        ProductSortBy::Name => ProductCol::Name,
        ProductSortBy::Price => ProductCol::Price,
        ProductSortBy::CreatedAt => ProductCol::CreatedAt,
    };

    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };
    finder = finder.order_by_asc(ProductCol::Id);

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
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

fn visible_to(product: &products::Model, viewer: Option<&AuthUser>) -> bool {
    product.is_active || viewer.is_some_and(AuthUser::is_admin)
}

pub async fn get_product(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|p| visible_to(p, viewer))
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", detail(state, product).await?, None))
}

pub async fn get_product_by_slug(
    state: &AppState,
    viewer: Option<&AuthUser>,
    slug: &str,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find()
        .filter(ProductCol::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .filter(|p| visible_to(p, viewer))
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", detail(state, product).await?, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    ensure_category(&txn, payload.category_id).await?;

    let name = payload.name.trim().to_string();
    let slug = unique_slug(&txn, &name, None).await?;
    let sku = payload.sku.unwrap_or_else(|| generate_sku(&name));
    let now = Utc::now();

    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        slug: Set(slug),
        description: Set(payload.description),
        price: Set(payload.price),
        stock_quantity: Set(payload.stock_quantity),
        sku: Set(Some(sku)),
        image_url: Set(payload.image_url),
        category_id: Set(payload.category_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: products::ActiveModel = product.clone().into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name != product.name {
            active.slug = Set(unique_slug(&txn, &name, Some(id)).await?);
            active.name = Set(name);
        }
    }
    if let Some(category_id) = payload.category_id {
        ensure_category(&txn, category_id).await?;
        active.category_id = Set(category_id);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock_quantity) = payload.stock_quantity {
        active.stock_quantity = Set(stock_quantity);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product updated",
        product.into(),
        Some(Meta::empty()),
    ))
}

/// Deletes the product and everything that cascades from it.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    Products::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    CartItems::delete_many()
        .filter(cart_items::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;
    Wishlists::delete_many()
        .filter(wishlists::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;
    Reviews::delete_many()
        .filter(reviews::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;
    OrderItems::delete_many()
        .filter(order_items::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;
    Products::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}
