use async_trait::async_trait;

use crate::{
    Cart, CartId, CartItem, CartItemId, CartLine, NewOrder, Order, OrderId, PageRequest, Product,
    ProductDetails, ProductId, Result, UserId,
};

/// Read access to the catalog owned by another service.
#[async_trait]
pub trait Catalog: Send {
    /// Loads a single product.
    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Loads products together with their categories.
    ///
    /// Unknown ids are skipped; the result order is unspecified.
    async fn product_details(&mut self, product_ids: &[ProductId]) -> Result<Vec<ProductDetails>>;
}

/// The authoritative per-product stock counter.
#[async_trait]
pub trait StockLedger: Send {
    /// Reads the current stock of a product.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn get_stock(&mut self, product_id: ProductId) -> Result<i32>;

    /// Decrements stock by `amount` (which must be positive) and returns the
    /// remaining quantity.
    ///
    /// The decrement is checked-and-set: if fewer than `amount` units are
    /// available the counter is left untouched and `InsufficientStock` is
    /// returned.
    async fn decrement_stock(&mut self, product_id: ProductId, amount: i32) -> Result<i32>;
}

/// Per-user carts and their lines.
#[async_trait]
pub trait CartStore: Send {
    /// Finds a user's cart without locking it.
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Finds a user's cart and locks it until the transaction ends, so
    /// concurrent checkouts of the same cart are serialized.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Creates the user's cart, or returns the existing one.
    async fn create_cart(&mut self, user_id: UserId) -> Result<Cart>;

    /// Loads a cart's lines with their current products, ordered by
    /// ascending product id.
    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>>;

    /// Finds the line for a product in a cart.
    async fn find_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>>;

    /// Finds a line only if it belongs to a cart owned by `user_id`.
    async fn find_user_item(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>>;

    /// Inserts a new line.
    async fn insert_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem>;

    /// Replaces the quantity of an existing line.
    async fn set_item_quantity(&mut self, item_id: CartItemId, quantity: i32) -> Result<CartItem>;

    /// Deletes a line owned by `user_id`. Returns false if no such line.
    async fn delete_user_item(&mut self, user_id: UserId, item_id: CartItemId) -> Result<bool>;

    /// Deletes every line of a cart and returns how many were removed.
    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64>;
}

/// Immutable orders and their lines.
#[async_trait]
pub trait OrderLedger: Send {
    /// Inserts an order with status `pending` and all of its lines.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Loads an order regardless of owner.
    async fn find_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order only if it belongs to `user_id`.
    async fn find_user_order(&mut self, user_id: UserId, order_id: OrderId)
    -> Result<Option<Order>>;

    /// Lists a user's orders, newest first (ties broken by descending id).
    async fn list_user_orders(&mut self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>>;

    /// Counts all of a user's orders.
    async fn count_user_orders(&mut self, user_id: UserId) -> Result<u64>;
}

/// A unit of work over every ledger.
///
/// All operations performed through a transaction become visible to other
/// transactions only after [`Transaction::commit`]. Dropping a transaction
/// without committing discards its changes.
#[async_trait]
pub trait Transaction: Catalog + StockLedger + CartStore + OrderLedger + Send + Sized {
    /// Makes every change performed in this transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discards every change performed in this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Entry point to the backing store.
///
/// Implementations hold only a connection handle and are cheap to clone.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by this store.
    type Tx: Transaction;

    /// Begins a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;
}
