use async_trait::async_trait;
use common::{
    CartLineId, FulfillmentStatus, LikeId, Money, OrderId, PaymentStatus, ProductId, ShipmentId,
    StoreId, UserId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::{
    CartLine, Like, Order, Product, Result, Shipment, ShipmentStatus, StorageError, StoreRecord,
    store::{
        CartChange, CartChangeOutcome, CommerceStore, FulfillmentTransition, LineMutation,
        PricedOrder, ProductFilter, ProductPage, ProductUpdate, Settlement,
    },
};

const PRODUCT_COLUMNS: &str = "id, store_id, product_name, description, price_minor, \
     max_quantity, quantity, images, is_available, created_at";

const CART_LINE_COLUMNS: &str = "id, user_id, product_id, quantity, ordered, created_at";

const ORDER_COLUMNS: &str = "id, user_id, store_id, store_name, cart_line_id, address, \
     amount_minor, gateway_order_id, gateway_payment_id, gateway_signature, payment_method, \
     payment_status, status, shipment_id, return_reason, return_requested_at, created_at";

const SHIPMENT_COLUMNS: &str =
    "id, order_id, courier, tracking_number, status, estimated_delivery, created_at";

const LIKE_COLUMNS: &str = "id, user_id, product_id, liked_at";

/// PostgreSQL-backed store implementation.
///
/// Stock changes are single conditional `UPDATE` statements; composite
/// operations run inside one transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_store(row: PgRow) -> Result<StoreRecord> {
        Ok(StoreRecord {
            id: StoreId::from_uuid(row.try_get("id")?),
            store_name: row.try_get("store_name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get("id")?),
            store_id: StoreId::from_uuid(row.try_get("store_id")?),
            product_name: row.try_get("product_name")?,
            description: row.try_get("description")?,
            price: Money::from_minor(row.try_get("price_minor")?),
            max_quantity: decode_count(row.try_get("max_quantity")?, "max_quantity")?,
            quantity: decode_count(row.try_get("quantity")?, "quantity")?,
            images: row.try_get("images")?,
            is_available: row.try_get("is_available")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
        Ok(CartLine {
            id: CartLineId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            quantity: decode_count(row.try_get("quantity")?, "quantity")?,
            ordered: row.try_get("ordered")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let payment_status: String = row.try_get("payment_status")?;
        let status: String = row.try_get("status")?;
        let shipment_id: Option<Uuid> = row.try_get("shipment_id")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            store_id: StoreId::from_uuid(row.try_get("store_id")?),
            store_name: row.try_get("store_name")?,
            cart_line_id: CartLineId::from_uuid(row.try_get("cart_line_id")?),
            address: row.try_get("address")?,
            amount: Money::from_minor(row.try_get("amount_minor")?),
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            gateway_signature: row.try_get("gateway_signature")?,
            payment_method: row.try_get("payment_method")?,
            payment_status: payment_status
                .parse::<PaymentStatus>()
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            status: status
                .parse::<FulfillmentStatus>()
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            shipment_id: shipment_id.map(ShipmentId::from_uuid),
            return_reason: row.try_get("return_reason")?,
            return_requested_at: row.try_get("return_requested_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_shipment(row: PgRow) -> Result<Shipment> {
        let status: String = row.try_get("status")?;

        Ok(Shipment {
            id: ShipmentId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            courier: row.try_get("courier")?,
            tracking_number: row.try_get("tracking_number")?,
            status: status
                .parse::<ShipmentStatus>()
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            estimated_delivery: row.try_get("estimated_delivery")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_like(row: PgRow) -> Result<Like> {
        Ok(Like {
            id: LikeId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            liked_at: row.try_get("liked_at")?,
        })
    }

    async fn orders_where(&self, clause: &str, bind: Uuid) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause}");
        let rows = sqlx::query(&sql).bind(bind).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

fn decode_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("negative {column}: {value}")))
}

fn encode_count(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("quantity out of range: {value}")))
}

fn is_constraint(err: &sqlx::Error, name: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err
        && db_err.constraint() == Some(name)
    {
        return true;
    }
    false
}

/// Applies `delta` to a product quantity with a non-negative predicate.
///
/// Returns `None` when releasing against a product that no longer exists.
async fn adjust_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    delta: i64,
) -> Result<Option<u32>> {
    let step = i32::try_from(delta)
        .map_err(|_| StorageError::Corrupt(format!("stock delta out of range: {delta}")))?;

    let updated: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET quantity = quantity + $2
        WHERE id = $1 AND quantity + $2 >= 0
        RETURNING quantity
        "#,
    )
    .bind(product_id.as_uuid())
    .bind(step)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(quantity) = updated {
        return Ok(Some(decode_count(quantity, "quantity")?));
    }

    let available: Option<i32> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match available {
        Some(available) => Err(StorageError::InsufficientStock {
            product_id,
            requested: u32::try_from(-delta).unwrap_or(u32::MAX),
            available: decode_count(available, "quantity")?,
        }),
        None if delta < 0 => Err(StorageError::not_found("product", product_id)),
        None => Ok(None),
    }
}

/// Distinguishes a missing line from a stale precondition after a
/// conditional write matched nothing.
async fn line_miss(conn: &mut PgConnection, line_id: CartLineId) -> StorageError {
    let exists: std::result::Result<Option<bool>, sqlx::Error> =
        sqlx::query_scalar("SELECT ordered FROM cart_lines WHERE id = $1")
            .bind(line_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await;

    match exists {
        Ok(Some(true)) => {
            StorageError::Conflict(format!("cart line {line_id} is already ordered"))
        }
        Ok(Some(false)) => StorageError::Conflict(format!("cart line {line_id} changed")),
        Ok(None) => StorageError::not_found("cart line", line_id),
        Err(e) => StorageError::Database(e),
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_store(&self, store: StoreRecord) -> Result<StoreRecord> {
        sqlx::query("INSERT INTO stores (id, store_name, created_at) VALUES ($1, $2, $3)")
            .bind(store.id.as_uuid())
            .bind(&store.store_name)
            .bind(store.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_constraint(&e, "stores_pkey") {
                    return StorageError::AlreadyExists {
                        entity: "store",
                        id: store.id.to_string(),
                    };
                }
                StorageError::Database(e)
            })?;
        Ok(store)
    }

    async fn get_store(&self, store_id: StoreId) -> Result<Option<StoreRecord>> {
        let row = sqlx::query("SELECT id, store_name, created_at FROM stores WHERE id = $1")
            .bind(store_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_store).transpose()
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        sqlx::query(
            r#"
            INSERT INTO products (id, store_id, product_name, description, price_minor,
                                  max_quantity, quantity, images, is_available, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.store_id.as_uuid())
        .bind(&product.product_name)
        .bind(&product.description)
        .bind(product.price.minor())
        .bind(encode_count(product.max_quantity)?)
        .bind(encode_count(product.quantity)?)
        .bind(&product.images)
        .bind(product.is_available)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint(&e, "products_pkey") {
                return StorageError::AlreadyExists {
                    entity: "product",
                    id: product.id.to_string(),
                };
            }
            StorageError::Database(e)
        })?;
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn list_products(&self, filter: ProductFilter) -> Result<ProductPage> {
        let store_ids: Vec<Uuid> = filter.store_ids.iter().map(StoreId::as_uuid).collect();
        let predicate = "(cardinality($1::uuid[]) = 0 OR store_id = ANY($1)) \
                         AND (is_available OR NOT $2)";

        let count_sql = format!("SELECT COUNT(*) FROM products WHERE {predicate}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&store_ids)
            .bind(filter.available_only)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {predicate} \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4"
        );
        let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
        let rows = sqlx::query(&page_sql)
            .bind(&store_ids)
            .bind(filter.available_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(ProductPage {
            products: rows
                .into_iter()
                .map(Self::row_to_product)
                .collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn toggle_product_availability(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Product> {
        let sql = format!(
            "UPDATE products SET is_available = NOT is_available \
             WHERE id = $1 AND store_id = $2 RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(store_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("product", product_id))?;
        Self::row_to_product(row)
    }

    async fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        let sql = format!(
            r#"
            UPDATE products
            SET product_name = COALESCE($3, product_name),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                price_minor = COALESCE($6, price_minor),
                max_quantity = COALESCE($7, max_quantity),
                quantity = COALESCE($8, quantity),
                images = COALESCE($9, images)
            WHERE id = $1 AND store_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let description_given = update.description.is_some();
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(store_id.as_uuid())
            .bind(update.product_name)
            .bind(description_given)
            .bind(update.description.flatten())
            .bind(update.price.map(|p| p.minor()))
            .bind(update.max_quantity.map(encode_count).transpose()?)
            .bind(update.quantity.map(encode_count).transpose()?)
            .bind(update.images)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("product", product_id))?;
        Self::row_to_product(row)
    }

    async fn delete_product(&self, store_id: StoreId, product_id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND store_id = $2")
            .bind(product_id.as_uuid())
            .bind(store_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("product", product_id));
        }
        Ok(())
    }

    async fn reserve_stock(&self, product_id: ProductId, units: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock(&mut conn, product_id, -i64::from(units))
            .await?
            .ok_or_else(|| StorageError::not_found("product", product_id))
    }

    async fn release_stock(&self, product_id: ProductId, units: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock(&mut conn, product_id, i64::from(units))
            .await?
            .ok_or_else(|| StorageError::not_found("product", product_id))
    }

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLine>> {
        let sql = format!("SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(line_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_cart_line).transpose()
    }

    async fn get_cart_lines(&self, ids: &[CartLineId]) -> Result<Vec<CartLine>> {
        let ids: Vec<Uuid> = ids.iter().map(CartLineId::as_uuid).collect();
        let sql = format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE id = ANY($1) ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn open_cart_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        let sql = format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines \
             WHERE user_id = $1 AND product_id = $2 AND NOT ordered"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_cart_line).transpose()
    }

    async fn open_cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let sql = format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines \
             WHERE user_id = $1 AND NOT ordered ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn apply_cart_change(&self, change: CartChange) -> Result<CartChangeOutcome> {
        let mut tx = self.pool.begin().await?;

        let line = match change.line {
            LineMutation::Insert(line) => {
                sqlx::query(
                    r#"
                    INSERT INTO cart_lines (id, user_id, product_id, quantity, ordered, created_at)
                    VALUES ($1, $2, $3, $4, FALSE, $5)
                    "#,
                )
                .bind(line.id.as_uuid())
                .bind(line.user_id.as_uuid())
                .bind(line.product_id.as_uuid())
                .bind(encode_count(line.quantity)?)
                .bind(line.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_constraint(&e, "cart_lines_one_open_line") {
                        return StorageError::Conflict(format!(
                            "open cart line already exists for product {}",
                            line.product_id
                        ));
                    }
                    StorageError::Database(e)
                })?;
                Some(line)
            }
            LineMutation::Upsert(line) => {
                let sql = format!(
                    "INSERT INTO cart_lines (id, user_id, product_id, quantity, ordered, created_at) \
                     VALUES ($1, $2, $3, $4, FALSE, $5) \
                     ON CONFLICT (user_id, product_id) WHERE NOT ordered \
                     DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity \
                     RETURNING {CART_LINE_COLUMNS}"
                );
                let row = sqlx::query(&sql)
                    .bind(line.id.as_uuid())
                    .bind(line.user_id.as_uuid())
                    .bind(line.product_id.as_uuid())
                    .bind(encode_count(line.quantity)?)
                    .bind(line.created_at)
                    .fetch_one(&mut *tx)
                    .await?;
                Some(Self::row_to_cart_line(row)?)
            }
            LineMutation::SetQuantity {
                line_id,
                expected,
                quantity,
            } => {
                let sql = format!(
                    "UPDATE cart_lines SET quantity = $3 \
                     WHERE id = $1 AND quantity = $2 AND NOT ordered \
                     RETURNING {CART_LINE_COLUMNS}"
                );
                let row = sqlx::query(&sql)
                    .bind(line_id.as_uuid())
                    .bind(encode_count(expected)?)
                    .bind(encode_count(quantity)?)
                    .fetch_optional(&mut *tx)
                    .await?;
                match row {
                    Some(row) => Some(Self::row_to_cart_line(row)?),
                    None => return Err(line_miss(&mut tx, line_id).await),
                }
            }
            LineMutation::Delete { line_id, expected } => {
                let result = sqlx::query(
                    "DELETE FROM cart_lines WHERE id = $1 AND quantity = $2 AND NOT ordered",
                )
                .bind(line_id.as_uuid())
                .bind(encode_count(expected)?)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(line_miss(&mut tx, line_id).await);
                }
                None
            }
        };

        let remaining_stock = if change.stock_delta == 0 {
            None
        } else {
            adjust_stock(&mut tx, change.product_id, change.stock_delta).await?
        };

        tx.commit().await?;
        Ok(CartChangeOutcome {
            line,
            remaining_stock,
        })
    }

    async fn materialize_orders(&self, orders: Vec<PricedOrder>) -> Result<Vec<Order>> {
        let mut tx = self.pool.begin().await?;

        for PricedOrder {
            order,
            line_quantity,
        } in &orders
        {
            let flagged = sqlx::query(
                "UPDATE cart_lines SET ordered = TRUE \
                 WHERE id = $1 AND quantity = $2 AND NOT ordered",
            )
            .bind(order.cart_line_id.as_uuid())
            .bind(encode_count(*line_quantity)?)
            .execute(&mut *tx)
            .await?;
            if flagged.rows_affected() == 0 {
                return Err(line_miss(&mut tx, order.cart_line_id).await);
            }

            sqlx::query(
                r#"
                INSERT INTO orders (id, user_id, store_id, store_name, cart_line_id, address,
                                    amount_minor, gateway_order_id, gateway_payment_id,
                                    gateway_signature, payment_method, payment_status, status,
                                    shipment_id, return_reason, return_requested_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.user_id.as_uuid())
            .bind(order.store_id.as_uuid())
            .bind(&order.store_name)
            .bind(order.cart_line_id.as_uuid())
            .bind(&order.address)
            .bind(order.amount.minor())
            .bind(&order.gateway_order_id)
            .bind(&order.gateway_payment_id)
            .bind(&order.gateway_signature)
            .bind(&order.payment_method)
            .bind(order.payment_status.as_str())
            .bind(order.status.as_str())
            .bind(order.shipment_id.map(|id| id.as_uuid()))
            .bind(&order.return_reason)
            .bind(order.return_requested_at)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_constraint(&e, "orders_one_per_cart_line") {
                    return StorageError::Conflict(format!(
                        "cart line {} is already ordered",
                        order.cart_line_id
                    ));
                }
                StorageError::Database(e)
            })?;
        }

        tx.commit().await?;
        Ok(orders.into_iter().map(|p| p.order).collect())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.orders_where("user_id = $1 ORDER BY created_at ASC, id ASC", user_id.as_uuid())
            .await
    }

    async fn orders_for_store(&self, store_id: StoreId) -> Result<Vec<Order>> {
        self.orders_where(
            "store_id = $1 ORDER BY created_at DESC, id DESC",
            store_id.as_uuid(),
        )
        .await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn orders_for_transaction(&self, gateway_order_id: &str) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_order_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(gateway_order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn settle_transaction(&self, settlement: Settlement) -> Result<u64> {
        let sources: Vec<String> = PaymentStatus::sources_for(settlement.status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2,
                gateway_payment_id = COALESCE($3, gateway_payment_id),
                gateway_signature = COALESCE($4, gateway_signature)
            WHERE gateway_order_id = $1 AND user_id = $6 AND payment_status = ANY($5)
            "#,
        )
        .bind(&settlement.gateway_order_id)
        .bind(settlement.status.as_str())
        .bind(&settlement.payment_id)
        .bind(&settlement.signature)
        .bind(sources)
        .bind(settlement.user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn transition_fulfillment(&self, transition: FulfillmentTransition) -> Result<Order> {
        let (reason, requested_at) = match transition.return_request {
            Some(request) => (Some(request.reason), Some(request.requested_at)),
            None => (None, None),
        };

        let sql = format!(
            "UPDATE orders SET status = $3, \
                 return_reason = COALESCE($4, return_reason), \
                 return_requested_at = COALESCE($5, return_requested_at) \
             WHERE id = $1 AND status = $2 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(transition.order_id.as_uuid())
            .bind(transition.expected.as_str())
            .bind(transition.next.as_str())
            .bind(reason)
            .bind(requested_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => match self.get_order(transition.order_id).await? {
                Some(current) => Err(StorageError::Conflict(format!(
                    "order {} changed: expected {}, found {}",
                    current.id, transition.expected, current.status
                ))),
                None => Err(StorageError::not_found("order", transition.order_id)),
            },
        }
    }

    async fn create_shipment(
        &self,
        shipment: Shipment,
        expected: FulfillmentStatus,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE orders SET status = $3, shipment_id = $2 \
             WHERE id = $1 AND status = $4 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(shipment.order_id.as_uuid())
            .bind(shipment.id.as_uuid())
            .bind(FulfillmentStatus::Shipped.as_str())
            .bind(expected.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            drop(tx);
            if self.shipment_for_order(shipment.order_id).await?.is_some() {
                return Err(StorageError::AlreadyExists {
                    entity: "shipment",
                    id: shipment.order_id.to_string(),
                });
            }
            return match self.get_order(shipment.order_id).await? {
                Some(current) => Err(StorageError::Conflict(format!(
                    "order {} changed: expected {expected}, found {}",
                    current.id, current.status
                ))),
                None => Err(StorageError::not_found("order", shipment.order_id)),
            };
        };
        let order = Self::row_to_order(row)?;

        sqlx::query(
            r#"
            INSERT INTO shipments (id, order_id, courier, tracking_number, status,
                                   estimated_delivery, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(shipment.id.as_uuid())
        .bind(shipment.order_id.as_uuid())
        .bind(&shipment.courier)
        .bind(&shipment.tracking_number)
        .bind(shipment.status.as_str())
        .bind(shipment.estimated_delivery)
        .bind(shipment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint(&e, "shipments_one_per_order") {
                return StorageError::AlreadyExists {
                    entity: "shipment",
                    id: shipment.order_id.to_string(),
                };
            }
            StorageError::Database(e)
        })?;

        tx.commit().await?;
        Ok(order)
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_shipment).transpose()
    }

    async fn insert_like(&self, like: Like) -> Result<Like> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO likes (id, user_id, product_id, liked_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(like.id.as_uuid())
        .bind(like.user_id.as_uuid())
        .bind(like.product_id.as_uuid())
        .bind(like.liked_at)
        .execute(&mut *conn)
        .await?;

        let sql =
            format!("SELECT {LIKE_COLUMNS} FROM likes WHERE user_id = $1 AND product_id = $2");
        let row = sqlx::query(&sql)
            .bind(like.user_id.as_uuid())
            .bind(like.product_id.as_uuid())
            .fetch_one(&mut *conn)
            .await?;
        Self::row_to_like(row)
    }

    async fn likes_for_user(&self, user_id: UserId) -> Result<Vec<Like>> {
        let sql = format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE user_id = $1 ORDER BY liked_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_like).collect()
    }

    async fn delete_like(&self, user_id: UserId, product_id: ProductId) -> Result<Like> {
        let sql = format!(
            "DELETE FROM likes WHERE user_id = $1 AND product_id = $2 RETURNING {LIKE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("like", product_id))?;
        Self::row_to_like(row)
    }
}
