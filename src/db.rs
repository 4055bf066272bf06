use anyhow::Result;
use sea_orm::{
    DatabaseConnection, SqlxPostgresConnector,
    sea_query::{Alias, Expr, IntoColumnRef, SimpleExpr},
};
use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;
pub type OrmConn = DatabaseConnection;

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the SQL files under `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// SeaORM connection sharing the given pool.
pub fn create_orm_conn(pool: DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
}

/// `CAST(SUM(col) AS BIGINT)`; Postgres widens integer sums to NUMERIC otherwise.
pub fn sum_as_bigint<C: IntoColumnRef>(col: C) -> SimpleExpr {
    Expr::expr(Expr::col(col).sum()).cast_as(Alias::new("BIGINT"))
}
