use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
    entity::{
        Categories, Products,
        categories::{self, Column as CategoryCol},
        products::Column as ProductCol,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::slugs::{base_slug, slug_candidate},
    state::AppState,
};

/// Child id -> parent id for every category.
pub type ParentMap = HashMap<Uuid, Option<Uuid>>;

/// Ids from `id` up to the root, nearest first. Stops on a repeated id.
pub fn ancestor_ids(parents: &ParentMap, id: Uuid) -> Vec<Uuid> {
    let mut visited = HashSet::from([id]);
    let mut chain = Vec::new();
    let mut current = parents.get(&id).copied().flatten();
    while let Some(parent) = current {
        if !visited.insert(parent) {
            tracing::warn!(category_id = %id, "category parent chain loops");
            break;
        }
        chain.push(parent);
        current = parents.get(&parent).copied().flatten();
    }
    chain
}

/// Breadth-first subtree below `id`, excluding `id` itself.
pub fn descendant_ids(parents: &ParentMap, id: Uuid) -> Vec<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (child, parent) in parents {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*child);
        }
    }
    for list in children.values_mut() {
        list.sort();
    }

    let mut visited = HashSet::from([id]);
    let mut out = Vec::new();
    let mut queue = VecDeque::from([id]);
    while let Some(node) = queue.pop_front() {
        for child in children.get(&node).into_iter().flatten() {
            if visited.insert(*child) {
                out.push(*child);
                queue.push_back(*child);
            }
        }
    }
    out
}

/// Whether re-parenting `id` under `new_parent` closes a loop.
pub fn would_create_cycle(parents: &ParentMap, id: Uuid, new_parent: Uuid) -> bool {
    new_parent == id || ancestor_ids(parents, new_parent).contains(&id)
}

pub async fn load_parent_map<C: ConnectionTrait>(conn: &C) -> AppResult<ParentMap> {
    let rows: Vec<(Uuid, Option<Uuid>)> = Categories::find()
        .select_only()
        .column(CategoryCol::Id)
        .column(CategoryCol::ParentId)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(rows.into_iter().collect())
}

async fn find_category<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<categories::Model> {
    Categories::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

fn missing_parent(err: AppError) -> AppError {
    match err {
        AppError::NotFound => AppError::field("parent_id", "parent category does not exist"),
        other => other,
    }
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
        let mut finder = Categories::find().filter(CategoryCol::Slug.eq(candidate.as_str()));
        if let Some(id) = exclude {
            finder = finder.filter(CategoryCol::Id.ne(id));
        }
        if finder.count(conn).await? == 0 {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

async fn ensure_name_free<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Categories::find().filter(CategoryCol::Name.eq(name));
    if let Some(id) = exclude {
        finder = finder.filter(CategoryCol::Id.ne(id));
    }
    if finder.count(conn).await? > 0 {
        return Err(AppError::Conflict(format!("Category '{name}' already exists")));
    }
    Ok(())
}

pub async fn list_categories(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Categories::find().order_by_asc(CategoryCol::Name);
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
        CategoryList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Category>> {
    let category = find_category(&state.orm, id).await?;
    Ok(ApiResponse::ok(category.into()))
}

pub async fn get_category_by_slug(
    state: &AppState,
    slug: &str,
) -> AppResult<ApiResponse<Category>> {
    let category = Categories::find()
        .filter(CategoryCol::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::ok(category.into()))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    payload.validate()?;
    let name = payload.name.trim().to_string();

    let txn = state.orm.begin().await?;
    ensure_name_free(&txn, &name, None).await?;
    if let Some(parent_id) = payload.parent_id {
        find_category(&txn, parent_id)
            .await
            .map_err(missing_parent)?;
    }

    let slug = unique_slug(&txn, &name, None).await?;
    let category = categories::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        slug: Set(slug),
        parent_id: Set(payload.parent_id),
        description: Set(payload.description),
        image_url: Set(payload.image_url),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        category.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let category = find_category(&txn, id).await?;
    let mut active: categories::ActiveModel = category.clone().into();

    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name != category.name {
            ensure_name_free(&txn, &name, Some(id)).await?;
            active.slug = Set(unique_slug(&txn, &name, Some(id)).await?);
            active.name = Set(name);
        }
    }

    if let Some(parent) = payload.parent_id {
        if let Some(parent_id) = parent {
            find_category(&txn, parent_id)
                .await
                .map_err(missing_parent)?;
            let parents = load_parent_map(&txn).await?;
            if would_create_cycle(&parents, id, parent_id) {
                return Err(AppError::field(
                    "parent_id",
                    "category cannot be its own ancestor",
                ));
            }
        }
        active.parent_id = Set(parent);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }

    let category = active.update(&txn).await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Category updated",
        category.into(),
        Some(Meta::empty()),
    ))
}

/// Children and products keep a category alive (RESTRICT).
pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;
    find_category(&txn, id).await?;

    let children = Categories::find()
        .filter(CategoryCol::ParentId.eq(id))
        .count(&txn)
        .await?;
    if children > 0 {
        return Err(AppError::Conflict(
            "Category still has subcategories".into(),
        ));
    }
    let products = Products::find()
        .filter(ProductCol::CategoryId.eq(id))
        .count(&txn)
        .await?;
    if products > 0 {
        return Err(AppError::Conflict("Category still has products".into()));
    }

    Categories::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

/// Path from the root down to the category's parent.
pub async fn get_ancestors(state: &AppState, id: Uuid) -> AppResult<ApiResponse<CategoryList>> {
    find_category(&state.orm, id).await?;
    let parents = load_parent_map(&state.orm).await?;
    let mut ids = ancestor_ids(&parents, id);
    ids.reverse();
    let items = load_in_order(state, &ids).await?;
    Ok(ApiResponse::ok(CategoryList { items }))
}

pub async fn get_descendants(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<CategoryList>> {
    find_category(&state.orm, id).await?;
    let parents = load_parent_map(&state.orm).await?;
    let ids = descendant_ids(&parents, id);
    let items = load_in_order(state, &ids).await?;
    Ok(ApiResponse::ok(CategoryList { items }))
}

async fn load_in_order(state: &AppState, ids: &[Uuid]) -> AppResult<Vec<Category>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_id: HashMap<Uuid, categories::Model> = Categories::find()
        .filter(CategoryCol::Id.is_in(ids.to_vec()))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    Ok(ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(Into::into)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn ancestors_walk_to_root() {
        let v = ids(3);
        let parents = ParentMap::from([(v[0], None), (v[1], Some(v[0])), (v[2], Some(v[1]))]);
        assert_eq!(ancestor_ids(&parents, v[2]), vec![v[1], v[0]]);
        assert!(ancestor_ids(&parents, v[0]).is_empty());
    }

    #[test]
    fn descendants_are_breadth_first() {
        let v = ids(4);
        let parents = ParentMap::from([
            (v[0], None),
            (v[1], Some(v[0])),
            (v[2], Some(v[0])),
            (v[3], Some(v[1])),
        ]);
        assert_eq!(descendant_ids(&parents, v[0]), vec![v[1], v[2], v[3]]);
        assert_eq!(descendant_ids(&parents, v[1]), vec![v[3]]);
    }

    #[test]
    fn detects_cycles() {
        let v = ids(3);
        let parents = ParentMap::from([(v[0], None), (v[1], Some(v[0])), (v[2], Some(v[1]))]);
        assert!(would_create_cycle(&parents, v[0], v[0]));
        assert!(would_create_cycle(&parents, v[0], v[2]));
        assert!(!would_create_cycle(&parents, v[2], v[0]));
    }

    #[test]
    fn corrupted_loops_terminate() {
        let v = ids(2);
        let parents = ParentMap::from([(v[0], Some(v[1])), (v[1], Some(v[0]))]);
        assert_eq!(ancestor_ids(&parents, v[0]), vec![v[1]]);
        assert_eq!(descendant_ids(&parents, v[0]), vec![v[1]]);
    }
}
