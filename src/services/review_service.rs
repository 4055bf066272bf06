use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::reviews::{CreateReviewRequest, ReviewList, UpdateReviewRequest},
    entity::{
        Reviews,
        reviews::{self, Column as ReviewCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Review,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::find_active_product,
    state::AppState,
};

/// Unapproved reviews are visible to their author and to admins only.
fn visible_condition(viewer: Option<&AuthUser>) -> Condition {
    match viewer {
        Some(user) if user.is_admin() => Condition::all(),
        Some(user) => Condition::any()
            .add(ReviewCol::IsApproved.eq(true))
            .add(ReviewCol::UserId.eq(user.user_id)),
        None => Condition::all().add(ReviewCol::IsApproved.eq(true)),
    }
}

fn can_see(review: &reviews::Model, viewer: Option<&AuthUser>) -> bool {
    review.is_approved
        || viewer.is_some_and(|user| user.is_admin() || user.user_id == review.user_id)
}

async fn paginate(
    state: &AppState,
    condition: Condition,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Reviews::find()
        .filter(condition)
        .order_by_desc(ReviewCol::CreatedAt)
        .order_by_asc(ReviewCol::Id);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(ApiResponse::success(
        "OK",
        ReviewList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// One review per user and product; new reviews wait for moderation.
pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    payload.validate()?;
    find_active_product(&state.orm, payload.product_id).await?;

    let existing = Reviews::find()
        .filter(ReviewCol::UserId.eq(user.user_id))
        .filter(ReviewCol::ProductId.eq(payload.product_id))
        .count(&state.orm)
        .await?;
    if existing > 0 {
        return Err(AppError::DuplicateReview);
    }

    let now = Utc::now();
    let review = reviews::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        is_approved: Set(false),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| match AppError::from(err) {
        // lost a race with a concurrent submission
        AppError::Conflict(_) => AppError::DuplicateReview,
        other => other,
    })?;

    Ok(ApiResponse::success(
        "Review submitted",
        review.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_product_reviews(
    state: &AppState,
    viewer: Option<&AuthUser>,
    product_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    let condition = Condition::all()
        .add(ReviewCol::ProductId.eq(product_id))
        .add(visible_condition(viewer));
    paginate(state, condition, pagination).await
}

pub async fn list_my_reviews(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    let condition = Condition::all().add(ReviewCol::UserId.eq(user.user_id));
    paginate(state, condition, pagination).await
}

pub async fn get_review(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<Review>> {
    let review = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|review| can_see(review, viewer))
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::ok(review.into()))
}

/// Edits go back through moderation.
pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    payload.validate()?;
    let review = Reviews::find_by_id(id)
        .filter(ReviewCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: reviews::ActiveModel = review.into();
    if let Some(rating) = payload.rating {
        active.rating = Set(rating);
    }
    if let Some(comment) = payload.comment {
        active.comment = Set(Some(comment));
    }
    active.is_approved = Set(false);
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Review updated",
        review.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let review = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if review.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }

    Reviews::delete_by_id(id).exec(&state.orm).await?;
    audit::record(
        &state.orm,
        Some(user.user_id),
        "review_delete",
        "reviews",
        serde_json::json!({ "review_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

pub async fn list_pending_reviews(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    ensure_admin(user)?;
    let condition = Condition::all().add(ReviewCol::IsApproved.eq(false));
    paginate(state, condition, pagination).await
}

pub async fn approve_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Review>> {
    ensure_admin(user)?;
    let review = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: reviews::ActiveModel = review.into();
    active.is_approved = Set(true);
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "review_approve",
        "reviews",
        serde_json::json!({ "review_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review approved",
        review.into(),
        Some(Meta::empty()),
    ))
}

/// Rejection removes the review.
pub async fn reject_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let deleted = Reviews::delete_by_id(id).exec(&state.orm).await?;
    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "review_reject",
        "reviews",
        serde_json::json!({ "review_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review rejected",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}
