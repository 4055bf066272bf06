#![allow(dead_code)]

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, EntityTrait, Schema, Set,
};
use storefront_api::{
    config::AppConfig,
    entity::{
        Addresses, AuditLogs, CartItems, Carts, Categories, OrderItems, Orders, Payments,
        Products, Reviews, Users, Wishlists, addresses, categories, products,
        sea_orm_active_enums::UserRole, users,
    },
    middleware::auth::AuthUser,
    state::AppState,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: JWT_SECRET.into(),
        jwt_expires_minutes: 60,
        payment_webhook_secret: WEBHOOK_SECRET.into(),
        low_stock_threshold: 10,
    }
}

async fn create_table<E: EntityTrait>(db: &sea_orm::DatabaseConnection, schema: &Schema, entity: E) {
    let backend = db.get_database_backend();
    db.execute(backend.build(&schema.create_table_from_entity(entity)))
        .await
        .expect("create table");
}

/// Fresh in-memory database with every table, on a single connection.
pub async fn setup_state() -> AppState {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");

    let schema = Schema::new(db.get_database_backend());
    create_table(&db, &schema, Users).await;
    create_table(&db, &schema, Addresses).await;
    create_table(&db, &schema, Categories).await;
    create_table(&db, &schema, Products).await;
    create_table(&db, &schema, Carts).await;
    create_table(&db, &schema, CartItems).await;
    create_table(&db, &schema, Orders).await;
    create_table(&db, &schema, OrderItems).await;
    create_table(&db, &schema, Payments).await;
    create_table(&db, &schema, Reviews).await;
    create_table(&db, &schema, Wishlists).await;
    create_table(&db, &schema, AuditLogs).await;

    for sql in [
        "CREATE UNIQUE INDEX cart_items_cart_product ON cart_items (cart_id, product_id)",
        "CREATE UNIQUE INDEX wishlists_user_product ON wishlists (user_id, product_id)",
        "CREATE UNIQUE INDEX reviews_user_product ON reviews (user_id, product_id)",
        "CREATE UNIQUE INDEX carts_user ON carts (user_id) WHERE user_id IS NOT NULL",
        "CREATE UNIQUE INDEX carts_session ON carts (session_id) WHERE session_id IS NOT NULL",
    ] {
        db.execute_unprepared(sql).await.expect("create index");
    }

    AppState::new(db, test_config())
}

pub async fn create_user(state: &AppState, email: &str, role: UserRole) -> AuthUser {
    let now = Utc::now();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("not-a-real-hash".into()),
        first_name: Set(None),
        last_name: Set(None),
        phone: Set(None),
        role: Set(role),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert user");
    AuthUser {
        user_id: user.id,
        role,
    }
}

pub async fn create_customer(state: &AppState, email: &str) -> AuthUser {
    create_user(state, email, UserRole::Customer).await
}

pub async fn create_admin(state: &AppState, email: &str) -> AuthUser {
    create_user(state, email, UserRole::Admin).await
}

pub async fn create_address(state: &AppState, user: &AuthUser) -> Uuid {
    let now = Utc::now();
    addresses::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address_type: Set("shipping".into()),
        street: Set(Some("1 Main St".into())),
        city: Set(Some("Springfield".into())),
        state: Set(None),
        postal_code: Set(Some("12345".into())),
        country: Set(Some("US".into())),
        is_default: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert address")
    .id
}

pub async fn create_category(state: &AppState, name: &str, parent_id: Option<Uuid>) -> Uuid {
    categories::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase().replace(' ', "-")),
        parent_id: Set(parent_id),
        description: Set(None),
        image_url: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert category")
    .id
}

pub async fn create_product(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    price: i64,
    stock: i32,
) -> Uuid {
    let now = Utc::now();
    products::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(format!("{}-{}", name.to_lowercase().replace(' ', "-"), Uuid::new_v4().simple())),
        description: Set(None),
        price: Set(price),
        stock_quantity: Set(stock),
        sku: Set(None),
        image_url: Set(None),
        category_id: Set(category_id),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert product")
    .id
}

pub async fn stock_of(state: &AppState, product_id: Uuid) -> i32 {
    Products::find_by_id(product_id)
        .one(&state.orm)
        .await
        .expect("query product")
        .expect("product exists")
        .stock_quantity
}
