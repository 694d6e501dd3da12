//! Rows owned or read by the checkout core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CartId, CartItemId, CategoryId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId,
};

/// A catalog category. Read-only for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

/// A catalog product.
///
/// The checkout core only ever mutates `stock`; every other field belongs to
/// the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Available quantity. Never negative.
    pub stock: i32,
    pub sku: String,
    pub is_active: bool,
}

/// A product joined with its category, used for denormalized responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub product: Product,
    pub category: Category,
}

/// A user's cart. One per user, never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single cart line. At most one per (cart, product).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A cart line together with the product as currently stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub item: CartItem,
    pub product: Product,
}

impl CartLine {
    /// Line subtotal at the product's current price, or `None` if it
    /// overflows.
    pub fn subtotal(&self) -> Option<Money> {
        self.product.price.checked_times(self.item.quantity)
    }
}

/// A placed order with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// An order line. `unit_price` is the price at purchase, copied from the
/// product when the order was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Money,
}

/// An order to be inserted. Always stored with [`OrderStatus::Pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Money,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Money,
}
