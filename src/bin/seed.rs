use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{
        Categories, Products, Users, categories, products,
        sea_orm_active_enums::UserRole,
        users::{self, Column as UserCol},
    },
    services::{auth_service::hash_password, slugs},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let orm = create_orm_conn(pool);

    let admin_id = ensure_user(&orm, "admin@example.com", "admin12345", UserRole::Admin).await?;
    let user_id = ensure_user(&orm, "user@example.com", "user12345", UserRole::Customer).await?;
    seed_catalog(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    role: UserRole,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        let mut active: users::ActiveModel = existing.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(orm).await?;
        println!("Ensured user {email} (role={})", role.as_str());
        return Ok(updated.id);
    }

    let now = Utc::now();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        first_name: Set(None),
        last_name: Set(None),
        phone: Set(None),
        role: Set(role),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(orm)
    .await?;

    println!("Created user {email} (role={})", role.as_str());
    Ok(user.id)
}

async fn ensure_category(orm: &DatabaseConnection, name: &str) -> anyhow::Result<Uuid> {
    let slug = slugs::base_slug(name);
    if let Some(existing) = Categories::find()
        .filter(categories::Column::Slug.eq(slug.as_str()))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }
    let category = categories::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(slug),
        parent_id: Set(None),
        description: Set(None),
        image_url: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(category.id)
}

async fn seed_catalog(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let apparel = ensure_category(orm, "Apparel").await?;
    let kitchen = ensure_category(orm, "Kitchen").await?;
    let books = ensure_category(orm, "Books").await?;

    let catalog = vec![
        ("Axum Hoodie", "Warm hoodie for Rustaceans", 5500, 50, apparel),
        ("Ferris Mug", "Coffee tastes better with Ferris", 1200, 100, kitchen),
        ("Rust Sticker Pack", "Decorate your laptop", 500, 200, apparel),
        ("E-book: Async Rust", "Learn async Rust patterns", 2500, 75, books),
    ];

    for (name, desc, price, stock, category_id) in catalog {
        let slug = slugs::base_slug(name);
        let exists = Products::find()
            .filter(products::Column::Slug.eq(slug.as_str()))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        let now = Utc::now();
        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug),
            description: Set(Some(desc.to_string())),
            price: Set(price),
            stock_quantity: Set(stock),
            sku: Set(Some(slugs::generate_sku(name))),
            image_url: Set(None),
            category_id: Set(category_id),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
