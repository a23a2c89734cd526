use async_trait::async_trait;
use atelier_catalog::{Product, ProductRepository};
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    slug: String,
    name: String,
    maker: String,
    description: Option<String>,
    price_cents: i64,
    currency: String,
    sold: bool,
    reserved_until: Option<DateTime<Utc>>,
    reserved_by_session: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            slug: row.slug,
            name: row.name,
            maker: row.maker,
            description: row.description,
            price_cents: row.price_cents,
            currency: row.currency,
            sold: row.sold,
            reserved_until: row.reserved_until,
            reserved_by_session: row.reserved_by_session.map(SessionId::from),
            created_at: row.created_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, slug, name, maker, description, price_cents, currency, sold, reserved_until, reserved_by_session, created_at";

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, slug, name, maker, description, price_cents, currency, sold, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id)
        .bind(&product.slug)
        .bind(&product.name)
        .bind(&product.maker)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.currency)
        .bind(product.sold)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Product::from))
    }

    async fn list(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE products SET sold = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }
}
