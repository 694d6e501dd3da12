use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, CartStore, Catalog, Category, CategoryId, Money,
    NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderLedger, OrderStatus, PageRequest,
    Product, ProductDetails, ProductId, Result, StockLedger, Store, StoreError, Transaction,
    UserId,
};

/// Points at which the in-memory store can be told to fail, for exercising
/// rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    DecrementStock,
    InsertOrder,
    ClearCart,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    category: i64,
    product: i64,
    cart: i64,
    cart_item: i64,
    order: i64,
    order_item: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<CartId, Cart>,
    cart_items: BTreeMap<CartItemId, CartItem>,
    orders: BTreeMap<OrderId, Order>,
    seq: Sequences,
}

impl MemoryState {
    fn cart_of(&self, user_id: UserId) -> Option<&Cart> {
        self.carts.values().find(|c| c.user_id == user_id)
    }

    fn owns_item(&self, user_id: UserId, item: &CartItem) -> bool {
        self.carts
            .get(&item.cart_id)
            .is_some_and(|c| c.user_id == user_id)
    }
}

type Faults = Arc<Mutex<HashSet<FailPoint>>>;

fn check(faults: &Faults, point: FailPoint) -> Result<()> {
    let armed = faults
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&point);
    if armed {
        return Err(StoreError::Injected(format!("{point:?}")));
    }
    Ok(())
}

/// In-memory store for tests and local runs.
///
/// A transaction holds an exclusive lock on the whole state and works on a
/// private copy of it, so transactions are fully serialized and a rollback
/// simply drops the copy.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
    faults: Faults,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a failure at the given point for every following transaction.
    pub fn fail_at(&self, point: FailPoint) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    /// Disarms all injected failures.
    pub fn clear_failures(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Adds an active catalog category.
    pub async fn add_category(&self, name: &str) -> CategoryId {
        let mut state = self.state.lock().await;
        let id = CategoryId::new(next(&mut state.seq.category));
        state.categories.insert(
            id,
            Category {
                id,
                name: name.to_string(),
                description: format!("{name} category"),
                is_active: true,
            },
        );
        id
    }

    /// Adds an active catalog product.
    pub async fn add_product(
        &self,
        category_id: CategoryId,
        name: &str,
        price: Money,
        stock: i32,
    ) -> ProductId {
        let mut state = self.state.lock().await;
        let id = ProductId::new(next(&mut state.seq.product));
        state.products.insert(
            id,
            Product {
                id,
                category_id,
                name: name.to_string(),
                description: String::new(),
                price,
                stock,
                sku: format!("SKU-{:04}", id.as_i64()),
                is_active: true,
            },
        );
        id
    }

    /// Changes a product's catalog price.
    pub async fn set_price(&self, product_id: ProductId, price: Money) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Overwrites a product's stock counter.
    pub async fn set_stock(&self, product_id: ProductId, stock: i32) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.stock = stock;
        }
    }

    /// Marks a product as listed or delisted in the catalog.
    pub async fn set_active(&self, product_id: ProductId, is_active: bool) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.is_active = is_active;
        }
    }

    /// Returns the committed stock of a product.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<i32> {
        self.state
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of committed lines in a user's cart.
    pub async fn cart_item_count(&self, user_id: UserId) -> usize {
        let state = self.state.lock().await;
        match state.cart_of(user_id) {
            Some(cart) => state
                .cart_items
                .values()
                .filter(|i| i.cart_id == cart.id)
                .count(),
            None => 0,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }
}

/// A unit of work over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Faults,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        check(&self.faults, FailPoint::Commit)?;
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryTransaction {
    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn product_details(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>> {
        let details = product_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| {
                let product = self.working.products.get(id)?;
                let category = self.working.categories.get(&product.category_id)?;
                Some(ProductDetails {
                    product: product.clone(),
                    category: category.clone(),
                })
            })
            .collect();
        Ok(details)
    }
}

#[async_trait]
impl StockLedger for InMemoryTransaction {
    async fn get_stock(&mut self, product_id: ProductId) -> Result<i32> {
        self.working
            .products
            .get(&product_id)
            .map(|p| p.stock)
            .ok_or_else(|| StoreError::not_found("product", product_id))
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: i32) -> Result<i32> {
        check(&self.faults, FailPoint::DecrementStock)?;
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;

        if product.stock < amount {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: amount,
                available: product.stock,
            });
        }
        product.stock -= amount;
        Ok(product.stock)
    }
}

#[async_trait]
impl CartStore for InMemoryTransaction {
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.working.cart_of(user_id).cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        // The whole state is already exclusively held by this transaction.
        self.find_cart(user_id).await
    }

    async fn create_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.working.cart_of(user_id) {
            return Ok(cart.clone());
        }
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(next(&mut self.working.seq.cart)),
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.working.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let mut lines = self
            .working
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .map(|item| -> Result<CartLine> {
                let product = self
                    .working
                    .products
                    .get(&item.product_id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found("product", item.product_id))?;
                Ok(CartLine {
                    item: item.clone(),
                    product,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        lines.sort_by_key(|l| l.item.product_id);
        Ok(lines)
    }

    async fn find_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .working
            .cart_items
            .values()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
            .cloned())
    }

    async fn find_user_item(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .working
            .cart_items
            .get(&item_id)
            .filter(|item| self.working.owns_item(user_id, item))
            .cloned())
    }

    async fn insert_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem> {
        if !self.working.carts.contains_key(&cart_id) {
            return Err(StoreError::not_found("cart", cart_id));
        }
        if !self.working.products.contains_key(&product_id) {
            return Err(StoreError::not_found("product", product_id));
        }
        let item = CartItem {
            id: CartItemId::new(next(&mut self.working.seq.cart_item)),
            cart_id,
            product_id,
            quantity,
        };
        self.working.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_item_quantity(&mut self, item_id: CartItemId, quantity: i32) -> Result<CartItem> {
        let item = self
            .working
            .cart_items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::not_found("cart item", item_id))?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn delete_user_item(&mut self, user_id: UserId, item_id: CartItemId) -> Result<bool> {
        let owned = self
            .working
            .cart_items
            .get(&item_id)
            .is_some_and(|item| self.working.owns_item(user_id, item));
        if owned {
            self.working.cart_items.remove(&item_id);
        }
        Ok(owned)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64> {
        check(&self.faults, FailPoint::ClearCart)?;
        let before = self.working.cart_items.len();
        self.working.cart_items.retain(|_, i| i.cart_id != cart_id);
        Ok((before - self.working.cart_items.len()) as u64)
    }
}

#[async_trait]
impl OrderLedger for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        check(&self.faults, FailPoint::InsertOrder)?;
        let order_id = OrderId::new(next(&mut self.working.seq.order));
        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            items.push(OrderItem {
                id: OrderItemId::new(next(&mut self.working.seq.order_item)),
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }
        let created = Order {
            id: order_id,
            user_id: order.user_id,
            status: OrderStatus::Pending,
            total_amount: order.total_amount,
            created_at: Utc::now(),
            items,
        };
        self.working.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn find_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn find_user_order(
        &mut self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }

    async fn list_user_orders(&mut self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count_user_orders(&mut self, user_id: UserId) -> Result<u64> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .count() as u64)
    }
}
