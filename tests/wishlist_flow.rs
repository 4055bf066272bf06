mod common;

use common::{create_category, create_customer, create_product, setup_state};
use storefront_api::{
    dto::wishlist::AddToWishlistRequest,
    error::AppError,
    middleware::session::CartOwner,
    routes::params::Pagination,
    services::{cart_service, wishlist_service},
};

#[tokio::test]
async fn adding_twice_is_idempotent() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "saver@example.com").await;
    let category = create_category(&state, "Toys", None).await;
    let product = create_product(&state, category, "Kite", 1800, 3).await;

    let first = wishlist_service::add_to_wishlist(&state, &user, AddToWishlistRequest { product_id: product })
        .await?
        .data
        .expect("entry");
    assert!(!first.already_present);
    let second = wishlist_service::add_to_wishlist(&state, &user, AddToWishlistRequest { product_id: product })
        .await?
        .data
        .expect("entry");
    assert!(second.already_present);
    assert_eq!(first.entry.id, second.entry.id);

    let count = wishlist_service::count_wishlist(&state, &user).await?.data.expect("count");
    assert_eq!(count.count, 1);

    let list = wishlist_service::list_wishlist(&state, &user, Pagination::default())
        .await?
        .data
        .expect("list");
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].product.name, "Kite");
    Ok(())
}

#[tokio::test]
async fn removing_a_missing_entry_is_not_found() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "saver@example.com").await;
    let category = create_category(&state, "Toys", None).await;
    let product = create_product(&state, category, "Kite", 1800, 3).await;

    let err = wishlist_service::remove_from_wishlist(&state, &user, product)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    wishlist_service::add_to_wishlist(&state, &user, AddToWishlistRequest { product_id: product }).await?;
    wishlist_service::remove_from_wishlist(&state, &user, product).await?;
    let cleared = wishlist_service::clear_wishlist(&state, &user).await?.data.expect("count");
    assert_eq!(cleared.count, 0);
    Ok(())
}

#[tokio::test]
async fn move_to_cart_transfers_one_unit() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "saver@example.com").await;
    let category = create_category(&state, "Toys", None).await;
    let product = create_product(&state, category, "Kite", 1800, 3).await;

    wishlist_service::add_to_wishlist(&state, &user, AddToWishlistRequest { product_id: product }).await?;
    let cart = wishlist_service::move_to_cart(&state, &user, product)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 1);
    assert_eq!(cart.subtotal, 1800);

    let count = wishlist_service::count_wishlist(&state, &user).await?.data.expect("count");
    assert_eq!(count.count, 0);

    let view = cart_service::get_cart(&state, &CartOwner::User(user.user_id))
        .await?
        .data
        .expect("cart");
    assert_eq!(view.total_items, 1);
    Ok(())
}
