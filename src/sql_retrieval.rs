use crate::domain::{Citation, OrderRow, TurnState};
use crate::error::CoreError;
use crate::masking::mask_email;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

/// Authorized single-order fetch, gated by BOTH `order_id` and `user_id`
/// (§4.4). Mirrors `VectorIndex`/`Embedder`/`NotificationSink` as the trait
/// seam for this collaborator, so the authorization and masking laws around
/// it (§8 property 8) can be exercised against an in-memory fake instead of
/// requiring a live Postgres.
#[async_trait]
pub trait SqlRetriever: Send + Sync {
    /// Returns the order row joined with its owning customer and product, or
    /// `None` if the order doesn't exist or belongs to a different user —
    /// indistinguishable from the caller's perspective, by design.
    async fn fetch_order_for_user(&self, order_id: &str, user_id: &str) -> Result<Option<OrderRow>, CoreError>;
}

pub struct PostgresSqlRetriever {
    pool: Pool<Postgres>,
}

impl PostgresSqlRetriever {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Create the relational tables SQL retrieval reads from. Populated offline
/// by the ingestion pipelines (§1 Non-goals) — this only guarantees the
/// shape exists for a from-scratch deployment.
pub async fn init_schema(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            user_id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            product_id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES customers(user_id),
            product_id TEXT NOT NULL REFERENCES products(product_id),
            quantity INT NOT NULL DEFAULT 1,
            ordered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            delivery_date TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl SqlRetriever for PostgresSqlRetriever {
    async fn fetch_order_for_user(&self, order_id: &str, user_id: &str) -> Result<Option<OrderRow>, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT o.order_id, c.email AS customer_email, c.first_name, c.last_name,
                   p.name AS product_name, o.quantity, o.ordered_at, o.delivery_date
            FROM orders o
            JOIN customers c ON c.user_id = o.user_id
            JOIN products p ON p.product_id = o.product_id
            WHERE o.order_id = $1 AND c.user_id = $2
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        Ok(row.map(|r| OrderRow {
            order_id: r.get("order_id"),
            customer_email: r.get("customer_email"),
            first_name: r.get("first_name"),
            last_name: r.get("last_name"),
            product_name: r.get("product_name"),
            quantity: r.get("quantity"),
            ordered_at: r.get("ordered_at"),
            delivery_date: r.get("delivery_date"),
        }))
    }
}

/// Run SQL retrieval against `turn` in place: executes only if
/// `should_retrieve_sql` and `user_id` is non-empty, masks email fields,
/// hydrates name fields, and emits a `db:orders#<id>` citation on hit.
pub async fn retrieve(retriever: &dyn SqlRetriever, turn: &mut TurnState) -> Result<(), CoreError> {
    if !turn.should_retrieve_sql || turn.user_id.is_empty() {
        return Ok(());
    }

    let Some(order_id) = turn.order_id.clone() else {
        return Ok(());
    };

    let Some(mut row) = retriever.fetch_order_for_user(&order_id, &turn.user_id).await? else {
        return Ok(());
    };

    row.customer_email = mask_email(&row.customer_email, Some(&turn.query));

    if turn.first_name.is_none() {
        turn.first_name = row.first_name.clone();
    }
    if turn.last_name.is_none() {
        turn.last_name = row.last_name.clone();
    }

    turn.citations.push(Citation::db("orders", &row.order_id));
    turn.sql_rows.push(row);
    Ok(())
}
