use std::collections::HashMap;

use async_trait::async_trait;
use common::{CategoryId, OrderId, PartyId, ProductId, UserId};
use domain::{
    Clause, DraftOrder, HeaderPatch, Money, NewProduct, Order, OrderHeader, OrderKind, OrderLine,
    OrderQuery, Product, ProductPatch, ProductQuery,
};
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{InventoryStore, OrderRepository, OrderStore, StoreTransaction},
};

const ORDER_COLUMNS: &str = "id, kind, counterparty_id, actor_id, payment_method, description, \
     total_cents, idempotency_key, created_at";

const PRODUCT_COLUMNS: &str = "id, category_id, name, bill_format, incoming_price_cents, \
     standard_price_cents, on_hand_count, created_by, created_at";

const IDEMPOTENCY_CONSTRAINT: &str = "orders_kind_idempotency_key";

/// PostgreSQL-backed order and inventory store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        category_id: row
            .try_get::<Option<Uuid>, _>("category_id")?
            .map(CategoryId::from_uuid),
        name: row.try_get("name")?,
        bill_format: row.try_get("bill_format")?,
        incoming_price: Money::from_cents(row.try_get("incoming_price_cents")?),
        standard_price: Money::from_cents(row.try_get("standard_price_cents")?),
        on_hand_count: row.try_get("on_hand_count")?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_line(row: &PgRow) -> Result<OrderLine> {
    let quantity: i64 = row.try_get("quantity")?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| StoreError::InvalidRow(format!("line quantity {quantity} out of range")))?;

    Ok(OrderLine {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        total_price: Money::from_cents(row.try_get("total_price_cents")?),
    })
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let kind: String = row.try_get("kind")?;
    let kind: OrderKind = kind
        .parse()
        .map_err(|e| StoreError::InvalidRow(format!("{e}")))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        created_at: row.try_get("created_at")?,
        header: OrderHeader {
            kind,
            counterparty_id: PartyId::from_uuid(row.try_get::<Uuid, _>("counterparty_id")?),
            actor_id: UserId::from_uuid(row.try_get::<Uuid, _>("actor_id")?),
            payment_method: row.try_get("payment_method")?,
            description: row.try_get("description")?,
            total: Money::from_cents(row.try_get("total_cents")?),
        },
        lines,
        idempotency_key: row.try_get("idempotency_key")?,
    })
}

/// Loads the lines of the given orders, grouped by order and in line order.
async fn fetch_lines<'e, E>(
    executor: E,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderLine>>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT order_id, product_id, quantity, unit_price_cents, total_price_cents
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY order_id, line_no ASC
        "#,
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &rows {
        let order_id: Uuid = row.try_get("order_id")?;
        lines.entry(order_id).or_default().push(row_to_line(row)?);
    }
    Ok(lines)
}

/// Escapes `LIKE` wildcards so the value matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Joins header rows with their lines, keeping the header row order.
fn assemble(rows: Vec<PgRow>, mut lines: HashMap<Uuid, Vec<OrderLine>>) -> Result<Vec<Order>> {
    rows.iter()
        .map(|row| {
            let id: Uuid = row.try_get("id")?;
            row_to_order(row, lines.remove(&id).unwrap_or_default())
        })
        .collect()
}

#[async_trait]
impl OrderStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn load_order(&self, kind: OrderKind, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE kind = $1 AND id = $2"
        ))
        .bind(kind.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::OrderNotFound { kind, id })?;

        let mut lines = fetch_lines(&self.pool, &[id.as_uuid()]).await?;
        row_to_order(&row, lines.remove(&id.as_uuid()).unwrap_or_default())
    }

    #[tracing::instrument(skip_all, fields(kind = %query.kind, clauses = query.clauses.len()))]
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.kind = $1");
        let mut param_count = 1;

        // Build dynamic query
        for clause in &query.clauses {
            param_count += 1;
            let condition = match clause {
                Clause::Product(_) => format!(
                    " AND EXISTS (SELECT 1 FROM order_lines l \
                     WHERE l.order_id = o.id AND l.product_id = ${param_count})"
                ),
                Clause::Counterparty(_) => format!(" AND o.counterparty_id = ${param_count}"),
                Clause::Actor(_) => format!(" AND o.actor_id = ${param_count}"),
                Clause::CreatedFrom(_) => format!(" AND o.created_at >= ${param_count}"),
                Clause::CreatedTo(_) => format!(" AND o.created_at <= ${param_count}"),
            };
            sql.push_str(&condition);
        }

        sql.push_str(" ORDER BY o.created_at DESC, o.seq DESC");

        let mut sqlx_query = sqlx::query(&sql).bind(query.kind.as_str());
        for clause in &query.clauses {
            sqlx_query = match *clause {
                Clause::Product(id) => sqlx_query.bind(id.as_uuid()),
                Clause::Counterparty(id) => sqlx_query.bind(id.as_uuid()),
                Clause::Actor(id) => sqlx_query.bind(id.as_uuid()),
                Clause::CreatedFrom(ts) | Clause::CreatedTo(ts) => sqlx_query.bind(ts),
            };
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let lines = fetch_lines(&self.pool, &ids).await?;
        assemble(rows, lines)
    }

    async fn update_order_header(
        &self,
        kind: OrderKind,
        id: OrderId,
        patch: &HeaderPatch,
    ) -> Result<Order> {
        let patch = patch.clone().normalized();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET description = COALESCE($1, description),
                payment_method = COALESCE($2, payment_method)
            WHERE kind = $3 AND id = $4
            "#,
        )
        .bind(patch.description)
        .bind(patch.payment_method)
        .bind(kind.as_str())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound { kind, id });
        }
        self.load_order(kind, id).await
    }

    async fn delete_order(&self, kind: OrderKind, id: OrderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products
                (id, category_id, name, bill_format, incoming_price_cents, standard_price_cents,
                 created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(ProductId::new().as_uuid())
        .bind(product.category_id.map(|id| id.as_uuid()))
        .bind(&product.name)
        .bind(&product.bill_format)
        .bind(product.incoming_price.cents())
        .bind(product.standard_price.cents())
        .bind(product.created_by.map(|id| id.as_uuid()))
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ProductNotFound(id))?;

        row_to_product(&row)
    }

    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> Result<Product> {
        let patch = patch.clone().normalized();

        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET category_id = COALESCE($1, category_id),
                name = COALESCE($2, name),
                bill_format = COALESCE($3, bill_format),
                incoming_price_cents = COALESCE($4, incoming_price_cents),
                standard_price_cents = COALESCE($5, standard_price_cents)
            WHERE id = $6
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(patch.category_id.map(|id| id.as_uuid()))
        .bind(patch.name)
        .bind(patch.bill_format)
        .bind(patch.incoming_price.map(|m| m.cents()))
        .bind(patch.standard_price.map(|m| m.cents()))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ProductNotFound(id))?;

        row_to_product(&row)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE ($1::UUID IS NULL OR category_id = $1)
              AND ($2::TEXT IS NULL OR name ILIKE '%' || $2 || '%')
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(query.category_id.map(|id| id.as_uuid()))
        .bind(query.name_contains.as_deref().map(escape_like))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }
}

/// Transaction over a [`PostgresStore`]. Rolls back when dropped uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderRepository for PostgresTransaction {
    async fn save_order(&mut self, draft: &DraftOrder) -> Result<Order> {
        let id = OrderId::new();
        let header = &draft.header;

        let row = sqlx::query(
            r#"
            INSERT INTO orders
                (id, kind, counterparty_id, actor_id, payment_method, description, total_cents,
                 idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(header.kind.as_str())
        .bind(header.counterparty_id.as_uuid())
        .bind(header.actor_id.as_uuid())
        .bind(&header.payment_method)
        .bind(&header.description)
        .bind(header.total.cents())
        .bind(draft.idempotency_key.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT)
                && let Some(key) = &draft.idempotency_key
            {
                return StoreError::DuplicateKey {
                    kind: header.kind,
                    key: key.clone(),
                };
            }
            StoreError::Database(e)
        })?;
        let created_at = row.try_get("created_at")?;

        for (line_no, line) in draft.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines
                    (order_id, line_no, product_id, quantity, unit_price_cents, total_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id.as_uuid())
            .bind(line_no as i32)
            .bind(line.product_id.as_uuid())
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .bind(line.total_price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(Order::from_draft(id, created_at, draft.clone()))
    }

    async fn find_by_idempotency_key(
        &mut self,
        kind: OrderKind,
        key: &str,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE kind = $1 AND idempotency_key = $2"
        ))
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.try_get("id")?;
        let mut lines = fetch_lines(&mut *self.tx, &[id]).await?;
        row_to_order(&row, lines.remove(&id).unwrap_or_default()).map(Some)
    }
}

#[async_trait]
impl InventoryStore for PostgresTransaction {
    #[tracing::instrument(skip_all, fields(product_id = %product_id, delta = delta))]
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<Product> {
        // The row lock taken by UPDATE serializes concurrent adjustments.
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET on_hand_count = on_hand_count + $1
            WHERE id = $2 AND on_hand_count + $1 >= 0
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(delta)
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return row_to_product(&row);
        }

        let on_hand: Option<i64> =
            sqlx::query_scalar("SELECT on_hand_count FROM products WHERE id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        match on_hand {
            Some(on_hand) => Err(StoreError::InsufficientStock {
                product_id,
                on_hand,
                delta,
            }),
            None => Err(StoreError::ProductNotFound(product_id)),
        }
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
