mod common;

use common::{
    create_address, create_admin, create_category, create_customer, create_product, setup_state,
    stock_of,
};
use storefront_api::{
    dto::{
        admin::{BulkInventoryItem, BulkInventoryRequest, InventoryAdjustRequest, LowStockQuery, UserListQuery},
        cart::AddToCartRequest,
        orders::PlaceOrderRequest,
        payments::PaymentCallback,
        users::UpdateRoleRequest,
    },
    entity::sea_orm_active_enums::{PaymentMethod, PaymentStatus, UserRole},
    error::AppError,
    middleware::session::CartOwner,
    routes::params::Pagination,
    services::{admin_service, cart_service, order_service, payment_service},
};
use uuid::Uuid;

#[tokio::test]
async fn inventory_adjustments_never_go_negative() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let category = create_category(&state, "Stock", None).await;
    let product = create_product(&state, category, "Bolt", 10, 4).await;

    let err = admin_service::adjust_inventory(&state, &admin, product, InventoryAdjustRequest { delta: -5 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(stock_of(&state, product).await, 4);

    let err = admin_service::adjust_inventory(&state, &admin, product, InventoryAdjustRequest { delta: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let updated = admin_service::adjust_inventory(&state, &admin, product, InventoryAdjustRequest { delta: -4 })
        .await?
        .data
        .expect("product");
    assert_eq!(updated.stock_quantity, 0);

    let customer = create_customer(&state, "c@example.com").await;
    let err = admin_service::adjust_inventory(&state, &customer, product, InventoryAdjustRequest { delta: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    Ok(())
}

#[tokio::test]
async fn bulk_update_reports_unknown_products() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let category = create_category(&state, "Stock", None).await;
    let product = create_product(&state, category, "Bolt", 10, 4).await;
    let missing = Uuid::new_v4();

    let result = admin_service::bulk_update_inventory(
        &state,
        &admin,
        BulkInventoryRequest {
            items: vec![
                BulkInventoryItem { product_id: product, stock_quantity: 40 },
                BulkInventoryItem { product_id: missing, stock_quantity: 1 },
            ],
        },
    )
    .await?
    .data
    .expect("result");
    assert_eq!(result.updated, vec![product]);
    assert_eq!(result.failed, vec![missing]);
    assert_eq!(stock_of(&state, product).await, 40);

    let err = admin_service::bulk_update_inventory(&state, &admin, BulkInventoryRequest { items: vec![] })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn low_stock_uses_configured_threshold() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let category = create_category(&state, "Stock", None).await;
    let scarce = create_product(&state, category, "Scarce", 10, 2).await;
    let gone = create_product(&state, category, "Gone", 10, 0).await;
    create_product(&state, category, "Plenty", 10, 50).await;

    let list = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            pagination: Pagination::default(),
            threshold: None,
        },
    )
    .await?
    .data
    .expect("low stock");
    assert_eq!(list.threshold, 10);
    let ids: Vec<_> = list.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, [gone, scarce]);

    let dashboard = admin_service::dashboard(&state, &admin).await?.data.expect("dashboard");
    assert_eq!(dashboard.products.total, 3);
    assert_eq!(dashboard.products.out_of_stock, 1);
    assert_eq!(dashboard.products.low_stock, 1);
    assert_eq!(dashboard.users.admins, 1);
    assert_eq!(dashboard.sales.total_orders, 0);
    assert!(dashboard.reviews.average_rating.is_none());
    Ok(())
}

#[tokio::test]
async fn user_list_reports_spend_from_settled_orders() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let buyer = create_customer(&state, "buyer@example.com").await;
    let address = create_address(&state, &buyer).await;
    let category = create_category(&state, "Stock", None).await;
    let product = create_product(&state, category, "Bolt", 250, 10).await;

    for quantity in [2, 1] {
        cart_service::add_to_cart(
            &state,
            &CartOwner::User(buyer.user_id),
            AddToCartRequest { product_id: product, quantity },
        )
        .await?;
        let placed = order_service::place_order(
            &state,
            &buyer,
            PlaceOrderRequest {
                cart_id: None,
                shipping_address_id: address,
                billing_address_id: address,
                payment_method: PaymentMethod::Paypal,
            },
        )
        .await?
        .data
        .expect("order");
        if quantity == 2 {
            payment_service::handle_callback(
                &state,
                PaymentCallback {
                    tx_ref: placed.order.tx_ref,
                    status: PaymentStatus::Success,
                    transaction_id: None,
                },
            )
            .await?;
        }
    }

    let users = admin_service::list_users(
        &state,
        &admin,
        UserListQuery {
            pagination: Pagination::default(),
            role: Some(UserRole::Customer),
        },
    )
    .await?
    .data
    .expect("users");
    assert_eq!(users.items.len(), 1);
    assert_eq!(users.items[0].order_count, 2);
    assert_eq!(users.items[0].total_spent, 500);

    let dashboard = admin_service::dashboard(&state, &admin).await?.data.expect("dashboard");
    assert_eq!(dashboard.sales.total_orders, 2);
    assert_eq!(dashboard.sales.total_revenue, 750);
    Ok(())
}

#[tokio::test]
async fn admins_cannot_change_their_own_role() -> anyhow::Result<()> {
    let state = setup_state().await;
    let admin = create_admin(&state, "admin@example.com").await;
    let customer = create_customer(&state, "c@example.com").await;

    let err = admin_service::update_user_role(&state, &admin, admin.user_id, UpdateRoleRequest { role: UserRole::Customer })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let promoted = admin_service::update_user_role(&state, &admin, customer.user_id, UpdateRoleRequest { role: UserRole::Admin })
        .await?
        .data
        .expect("user");
    assert_eq!(promoted.role, UserRole::Admin);
    Ok(())
}
