use async_trait::async_trait;
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use atelier_order::models::{Order, OrderLine, OrderStatus};
use atelier_order::repository::OrderRepository;
use atelier_shared::pii::Masked;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT id, order_id, product_id, name, price_cents
            FROM order_lines
            WHERE order_id = $1
            ORDER BY name
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(OrderLine::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    session_id: String,
    payment_intent_id: String,
    customer_email: Option<String>,
    status: String,
    total_cents: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown order status: {}", self.status).into())
        })?;
        Ok(Order {
            id: self.id,
            session_id: SessionId::from(self.session_id),
            payment_intent_id: self.payment_intent_id,
            customer_email: self.customer_email.map(Masked::new),
            status,
            total_cents: self.total_cents,
            currency: self.currency,
            lines,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    name: String,
    price_cents: i64,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        OrderLine {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            name: row.name,
            price_cents: row.price_cents,
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, session_id, payment_intent_id, customer_email, status, total_cents, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(order.session_id.as_str())
        .bind(&order.payment_intent_id)
        .bind(order.customer_email.as_ref().map(|email| email.inner().as_str()))
        .bind(order.status.as_str())
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, product_id, name, price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(line.id)
            .bind(line.order_id)
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.price_cents)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, session_id, payment_intent_id, customer_email, status, total_cents, currency, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => {
                let lines = self.load_lines(row.id).await?;
                Ok(Some(row.into_order(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, session_id, payment_intent_id, customer_email, status, total_cents, currency, created_at
            FROM orders
            WHERE payment_intent_id = $1
            "#,
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => {
                let lines = self.load_lines(row.id).await?;
                Ok(Some(row.into_order(lines)?))
            }
            None => Ok(None),
        }
    }
}
