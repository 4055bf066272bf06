mod common;

use common::{create_admin, create_category, create_customer, create_product, setup_state};
use storefront_api::{
    dto::{
        categories::{CreateCategoryRequest, UpdateCategoryRequest},
        products::{CreateProductRequest, UpdateProductRequest},
    },
    error::AppError,
    routes::params::{Availability, ProductQuery, ProductSortBy, SortOrder},
    services::{category_service, product_service},
};

fn new_category(name: &str, parent_id: Option<uuid::Uuid>) -> CreateCategoryRequest {
    CreateCategoryRequest {
        name: name.into(),
        parent_id,
        description: None,
        image_url: None,
    }
}

fn new_product(name: &str, category_id: uuid::Uuid, price: i64) -> CreateProductRequest {
    CreateProductRequest {
        name: name.into(),
        description: None,
        price,
        stock_quantity: 5,
        category_id,
        image_url: None,
        sku: None,
        is_active: None,
    }
}

#[tokio::test]
async fn category_tree_walks_and_rejects_cycles() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;

    let root = category_service::create_category(&state, &admin, new_category("Electronics", None))
        .await?
        .data
        .expect("root");
    assert_eq!(root.slug, "electronics");
    let mid = category_service::create_category(&state, &admin, new_category("Audio", Some(root.id)))
        .await?
        .data
        .expect("mid");
    let leaf = category_service::create_category(&state, &admin, new_category("Headphones", Some(mid.id)))
        .await?
        .data
        .expect("leaf");

    let ancestors = category_service::get_ancestors(&state, leaf.id).await?.data.expect("ancestors");
    let names: Vec<_> = ancestors.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Electronics", "Audio"]);

    let descendants = category_service::get_descendants(&state, root.id).await?.data.expect("descendants");
    let names: Vec<_> = descendants.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Audio", "Headphones"]);

    let err = category_service::update_category(
        &state,
        &admin,
        root.id,
        UpdateCategoryRequest {
            parent_id: Some(Some(leaf.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation { fields, .. } => {
            assert!(fields.expect("field errors").contains_key("parent_id"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = category_service::delete_category(&state, &admin, mid.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let detached = category_service::update_category(
        &state,
        &admin,
        leaf.id,
        UpdateCategoryRequest {
            parent_id: Some(None),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("leaf");
    assert!(detached.parent_id.is_none());
    category_service::delete_category(&state, &admin, mid.id).await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_category_names_conflict() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    category_service::create_category(&state, &admin, new_category("Garden", None)).await?;
    let err = category_service::create_category(&state, &admin, new_category("Garden", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let customer = create_customer(&state, "c@example.com").await;
    let err = category_service::create_category(&state, &customer, new_category("Tools", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    Ok(())
}

#[tokio::test]
async fn product_slugs_stay_unique_and_follow_renames() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let category = create_category(&state, "Kitchen", None).await;

    let first = product_service::create_product(&state, &admin, new_product("Ferris Mug", category, 1200))
        .await?
        .data
        .expect("product");
    let second = product_service::create_product(&state, &admin, new_product("Ferris Mug", category, 1300))
        .await?
        .data
        .expect("product");
    assert_eq!(first.slug, "ferris-mug");
    assert_ne!(first.slug, second.slug);
    assert!(first.sku.as_deref().is_some_and(|sku| sku.starts_with("PRD-FERRI-")));

    let renamed = product_service::update_product(
        &state,
        &admin,
        second.id,
        UpdateProductRequest {
            name: Some("Crab Mug".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("product");
    assert_eq!(renamed.slug, "crab-mug");

    let by_slug = product_service::get_product_by_slug(&state, None, "crab-mug")
        .await?
        .data
        .expect("product");
    assert_eq!(by_slug.product.id, second.id);
    assert!(by_slug.in_stock);
    assert_eq!(by_slug.review_count, 0);

    let err = product_service::create_product(&state, &admin, new_product("Broken", category, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn listing_filters_by_subtree_price_and_stock() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let root = create_category(&state, "Outdoors", None).await;
    let child = create_category(&state, "Camping", Some(root)).await;
    let other = create_category(&state, "Office", None).await;

    let tent = create_product(&state, child, "Tent", 15000, 2).await;
    let lamp = create_product(&state, root, "Lamp", 2500, 0).await;
    create_product(&state, other, "Stapler", 900, 30).await;
    let hidden = create_product(&state, root, "Prototype", 100, 1).await;
    product_service::update_product(
        &state,
        &admin,
        hidden,
        UpdateProductRequest {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await?;

    let subtree = product_service::list_products(
        &state,
        None,
        ProductQuery {
            category_id: Some(root),
            include_subcategories: true,
            sort_by: Some(ProductSortBy::Price),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("products");
    let ids: Vec<_> = subtree.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, [lamp, tent]);

    let in_stock = product_service::list_products(
        &state,
        None,
        ProductQuery {
            category_id: Some(root),
            include_subcategories: true,
            availability: Some(Availability::InStock),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("products");
    let ids: Vec<_> = in_stock.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, [tent]);

    let cheap = product_service::list_products(
        &state,
        None,
        ProductQuery {
            max_price: Some(1000),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("products");
    assert_eq!(cheap.items.len(), 1);
    assert_eq!(cheap.items[0].name, "Stapler");

    let err = product_service::get_product(&state, None, hidden).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    let seen = product_service::get_product(&state, Some(&admin), hidden).await?;
    assert!(!seen.data.expect("product").product.is_active);

    let with_inactive = product_service::list_products(
        &state,
        Some(&admin),
        ProductQuery {
            category_id: Some(root),
            include_inactive: true,
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("products");
    assert_eq!(with_inactive.items.len(), 2);
    Ok(())
}
