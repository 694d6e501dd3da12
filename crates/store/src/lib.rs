//! Persistence layer for the shop checkout core.
//!
//! Every read and write happens inside a [`Transaction`] obtained from a
//! [`Store`]. A transaction exposes the capability traits ([`Catalog`],
//! [`StockLedger`], [`CartStore`], [`OrderLedger`]) and is finished with an
//! explicit commit or rollback. Dropping a transaction without committing
//! rolls it back.

pub mod error;
pub mod memory;
pub mod model;
pub mod page;
pub mod postgres;
pub mod status;
pub mod store;

pub use common::{CartId, CartItemId, CategoryId, Money, OrderId, OrderItemId, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::{FailPoint, InMemoryStore, InMemoryTransaction};
pub use model::{
    Cart, CartItem, CartLine, Category, NewOrder, NewOrderItem, Order, OrderItem, Product,
    ProductDetails,
};
pub use page::PageRequest;
pub use postgres::{PostgresStore, PostgresTransaction};
pub use status::OrderStatus;
pub use store::{CartStore, Catalog, OrderLedger, StockLedger, Store, Transaction};
