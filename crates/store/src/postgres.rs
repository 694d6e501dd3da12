use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};

use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, CartStore, Catalog, Category, CategoryId, Money,
    NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderLedger, OrderStatus, PageRequest,
    Product, ProductDetails, ProductId, Result, StockLedger, Store, StoreError, Transaction,
    UserId,
};

/// PostgreSQL-backed store.
///
/// Holds the process-wide connection pool; every unit of work is a database
/// transaction at the default READ COMMITTED isolation level.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
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

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }
}

/// A unit of work backed by a PostgreSQL transaction.
///
/// sqlx rolls the transaction back when it is dropped without a commit.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        category_id: CategoryId::new(row.try_get("category_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        sku: row.try_get("sku")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_cart(row: &PgRow) -> Result<Cart> {
    Ok(Cart {
        id: CartId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::new(row.try_get("id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

/// Maps an `orders` row; items are attached by the caller.
fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown order status '{status}'")))?;

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        status,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        created_at: row.try_get("created_at")?,
        items: Vec::new(),
    })
}

impl PostgresTransaction {
    async fn attach_items(&mut self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id ASC, id ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = row_to_order_item(row)?;
            by_order.entry(item.order_id).or_default().push(item);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for PostgresTransaction {
    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, category_id, name, description, price_cents, stock, sku, is_active
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn product_details(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>> {
        let ids: Vec<i64> = product_ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.category_id, p.name, p.description, p.price_cents, p.stock, p.sku,
                   p.is_active,
                   c.name AS category_name,
                   c.description AS category_description,
                   c.is_active AS category_is_active
            FROM products p
            JOIN categories c ON c.id = p.category_id
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<ProductDetails> {
                let product = row_to_product(row)?;
                let category = Category {
                    id: product.category_id,
                    name: row.try_get("category_name")?,
                    description: row.try_get("category_description")?,
                    is_active: row.try_get("category_is_active")?,
                };
                Ok(ProductDetails { product, category })
            })
            .collect()
    }
}

#[async_trait]
impl StockLedger for PostgresTransaction {
    async fn get_stock(&mut self, product_id: ProductId) -> Result<i32> {
        let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        stock.ok_or_else(|| StoreError::not_found("product", product_id))
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: i32) -> Result<i32> {
        // The conditional update takes the row lock; a concurrent decrement
        // blocks here and re-evaluates the predicate once the holder commits.
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(product_id.as_i64())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await?;

        match remaining {
            Some(stock) => Ok(stock),
            None => {
                let available = self.get_stock(product_id).await?;
                Err(StoreError::InsufficientStock {
                    product_id,
                    requested: amount,
                    available,
                })
            }
        }
    }
}

#[async_trait]
impl CartStore for PostgresTransaction {
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart).transpose()
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart).transpose()
    }

    async fn create_cart(&mut self, user_id: UserId) -> Result<Cart> {
        sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StoreError::not_found("user", user_id);
                }
                StoreError::Database(e)
            })?;

        self.find_cart(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", user_id))
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.id AS item_id, ci.cart_id, ci.quantity,
                   p.id, p.category_id, p.name, p.description, p.price_cents, p.stock, p.sku,
                   p.is_active
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY p.id ASC
            "#,
        )
        .bind(cart_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLine> {
                let product = row_to_product(row)?;
                let item = CartItem {
                    id: CartItemId::new(row.try_get("item_id")?),
                    cart_id: CartId::new(row.try_get("cart_id")?),
                    product_id: product.id,
                    quantity: row.try_get("quantity")?,
                };
                Ok(CartLine { item, product })
            })
            .collect()
    }

    async fn find_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, quantity
            FROM cart_items
            WHERE cart_id = $1 AND product_id = $2
            "#,
        )
        .bind(cart_id.as_i64())
        .bind(product_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn find_user_item(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity
            FROM cart_items ci
            JOIN carts c ON c.id = ci.cart_id
            WHERE ci.id = $1 AND c.user_id = $2
            "#,
        )
        .bind(item_id.as_i64())
        .bind(user_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn insert_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            RETURNING id, cart_id, product_id, quantity
            "#,
        )
        .bind(cart_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return StoreError::not_found("product", product_id);
            }
            StoreError::Database(e)
        })?;

        row_to_cart_item(&row)
    }

    async fn set_item_quantity(&mut self, item_id: CartItemId, quantity: i32) -> Result<CartItem> {
        let row = sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, cart_id, product_id, quantity
            "#,
        )
        .bind(item_id.as_i64())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => row_to_cart_item(&row),
            None => Err(StoreError::not_found("cart item", item_id)),
        }
    }

    async fn delete_user_item(&mut self, user_id: UserId, item_id: CartItemId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cart_items ci
            USING carts c
            WHERE ci.cart_id = c.id AND ci.id = $1 AND c.user_id = $2
            "#,
        )
        .bind(item_id.as_i64())
        .bind(user_id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderLedger for PostgresTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        // clock_timestamp() rather than NOW() keeps creation times distinct
        // for orders written by the same transaction.
        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, status, total_amount_cents, created_at)
            VALUES ($1, $2, $3, clock_timestamp())
            RETURNING id, user_id, status, total_amount_cents, created_at
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(OrderStatus::Pending.as_str())
        .bind(order.total_amount.cents())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return StoreError::not_found("user", order.user_id);
            }
            StoreError::Database(e)
        })?;

        let mut created = row_to_order(&row)?;

        for item in &order.items {
            let row = sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                RETURNING id, order_id, product_id, quantity, unit_price_cents
                "#,
            )
            .bind(created.id.as_i64())
            .bind(item.product_id.as_i64())
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .fetch_one(&mut *self.tx)
            .await?;

            created.items.push(row_to_order_item(&row)?);
        }

        Ok(created)
    }

    async fn find_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount_cents, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [row_to_order(&row)?];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn find_user_order(
        &mut self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        match self.find_order(order_id).await? {
            Some(order) if order.user_id == user_id => Ok(Some(order)),
            _ => Ok(None),
        }
    }

    async fn list_user_orders(&mut self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount_cents, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_i64())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut orders = rows
            .iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.attach_items(&mut orders).await?;
        Ok(orders)
    }

    async fn count_user_orders(&mut self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count as u64)
    }
}
