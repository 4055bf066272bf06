mod common;

use common::{create_category, create_customer, create_product, setup_state};
use storefront_api::{
    dto::{
        auth::{LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, UpdateCartItemRequest},
    },
    error::AppError,
    middleware::session::CartOwner,
    services::{auth_service, cart_service},
};

#[tokio::test]
async fn adding_the_same_product_accumulates_quantity() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "shopper@example.com").await;
    let owner = CartOwner::User(user.user_id);
    let category = create_category(&state, "Books", None).await;
    let book = create_product(&state, category, "Rust Book", 3999, 10).await;

    cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: book, quantity: 1 }).await?;
    let view = cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: book, quantity: 2 })
        .await?
        .data
        .expect("cart");

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.items[0].line_total, 3 * 3999);
    assert_eq!(view.total_items, 3);
    assert_eq!(view.subtotal, 3 * 3999);
    Ok(())
}

#[tokio::test]
async fn quantities_below_one_are_rejected() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "shopper@example.com").await;
    let owner = CartOwner::User(user.user_id);
    let category = create_category(&state, "Books", None).await;
    let book = create_product(&state, category, "Rust Book", 3999, 10).await;

    let err = cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: book, quantity: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity));

    cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: book, quantity: 1 }).await?;
    let err = cart_service::update_cart_item(&state, &owner, book, UpdateCartItemRequest { quantity: -1 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity));
    Ok(())
}

#[tokio::test]
async fn setting_quantity_to_zero_removes_the_line() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "shopper@example.com").await;
    let owner = CartOwner::User(user.user_id);
    let category = create_category(&state, "Books", None).await;
    let book = create_product(&state, category, "Rust Book", 3999, 10).await;
    let pen = create_product(&state, category, "Pen", 150, 10).await;

    cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: book, quantity: 1 }).await?;
    cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: pen, quantity: 4 }).await?;

    let view = cart_service::update_cart_item(&state, &owner, book, UpdateCartItemRequest { quantity: 0 })
        .await?
        .data
        .expect("cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, pen);
    assert_eq!(view.subtotal, 600);

    let err = cart_service::remove_from_cart(&state, &owner, book).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let view = cart_service::clear_cart(&state, &owner).await?.data.expect("cart");
    assert!(view.items.is_empty());
    assert_eq!(view.total_items, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_product_cannot_be_added() -> anyhow::Result<()> {
    let state = setup_state().await;
    let owner = CartOwner::Session("guest-1".into());
    let err = cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            product_id: uuid::Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn session_cart_merges_into_user_cart_on_login() -> anyhow::Result<()> {
    let state = setup_state().await;
    let category = create_category(&state, "Books", None).await;
    let book = create_product(&state, category, "Rust Book", 3999, 10).await;
    let pen = create_product(&state, category, "Pen", 150, 10).await;

    auth_service::register_user(
        &state,
        RegisterRequest {
            email: "Guest@Example.com".into(),
            password: "correct horse".into(),
            first_name: None,
            last_name: None,
            phone: None,
        },
    )
    .await?;

    let login = |session: Option<String>| {
        auth_service::login_user(
            &state,
            LoginRequest {
                email: "guest@example.com".into(),
                password: "correct horse".into(),
            },
            session,
        )
    };

    let logged_in = login(None).await?.data.expect("login");
    let user_owner = CartOwner::User(logged_in.user.id);
    cart_service::add_to_cart(&state, &user_owner, AddToCartRequest { product_id: book, quantity: 1 }).await?;

    let guest = CartOwner::Session("guest-session".into());
    cart_service::add_to_cart(&state, &guest, AddToCartRequest { product_id: book, quantity: 2 }).await?;
    cart_service::add_to_cart(&state, &guest, AddToCartRequest { product_id: pen, quantity: 1 }).await?;

    login(Some("guest-session".into())).await?;

    let view = cart_service::get_cart(&state, &user_owner).await?.data.expect("cart");
    let book_line = view.items.iter().find(|line| line.product_id == book).expect("book line");
    let pen_line = view.items.iter().find(|line| line.product_id == pen).expect("pen line");
    assert_eq!(book_line.quantity, 3);
    assert_eq!(pen_line.quantity, 1);

    assert!(cart_service::find_cart(&state.orm, &guest).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> anyhow::Result<()> {
    let state = setup_state().await;
    auth_service::register_user(
        &state,
        RegisterRequest {
            email: "someone@example.com".into(),
            password: "correct horse".into(),
            first_name: Some("Some".into()),
            last_name: None,
            phone: None,
        },
    )
    .await?;

    let err = auth_service::login_user(
        &state,
        LoginRequest {
            email: "someone@example.com".into(),
            password: "battery staple".into(),
        },
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AuthFailed));

    let err = auth_service::login_user(
        &state,
        LoginRequest {
            email: "nobody@example.com".into(),
            password: "correct horse".into(),
        },
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AuthFailed));

    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "SOMEONE@example.com".into(),
            password: "another password".into(),
            first_name: None,
            last_name: None,
            phone: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn line_totals_that_do_not_fit_are_rejected() -> anyhow::Result<()> {
    let state = setup_state().await;
    let user = create_customer(&state, "shopper@example.com").await;
    let owner = CartOwner::User(user.user_id);
    let category = create_category(&state, "Jewellery", None).await;
    let crown = create_product(&state, category, "Crown", 5_000_000_000, 10).await;

    let err = cart_service::add_to_cart(
        &state,
        &owner,
        AddToCartRequest {
            product_id: crown,
            quantity: i32::MAX,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation { fields: Some(ref fields), .. } if fields.contains_key("quantity")
    ));

    let view = cart_service::get_cart(&state, &owner).await?.data.expect("cart");
    assert!(view.items.is_empty());
    assert_eq!(view.subtotal, 0);

    let view = cart_service::add_to_cart(&state, &owner, AddToCartRequest { product_id: crown, quantity: 2 })
        .await?
        .data
        .expect("cart");
    assert_eq!(view.subtotal, 10_000_000_000);
    Ok(())
}
