//! Checkout core for the shop.
//!
//! This crate provides the services that sit between the HTTP surface and the
//! store:
//! - [`CartService`] for reading and editing a user's cart
//! - [`OrderMaterializer`] for turning a cart into an order as one unit of work
//! - [`OrderQueryService`] for reading placed orders
//! - snapshot types that denormalize product data for responses
//! - the `order.created` event and its publishers

pub mod cart;
pub mod checkout;
pub mod error;
pub mod events;
pub mod orders;
pub mod snapshot;

pub use cart::CartService;
pub use checkout::OrderMaterializer;
pub use error::{DomainError, Result};
pub use events::{
    EventEnvelope, EventId, EventPublisher, InMemoryPublisher, ORDER_CREATED, PublishError,
    TracingPublisher,
};
pub use orders::OrderQueryService;
pub use snapshot::{
    CartItemSnapshot, CartSnapshot, CategorySnapshot, OrderItemSnapshot, OrderPage,
    OrderSnapshot, PageMeta, ProductSnapshot,
};

use store::Transaction;

/// Commits `tx` if `result` is a success and rolls it back otherwise.
///
/// A failed rollback is only logged; the original error is returned.
pub(crate) async fn finish<T, R>(tx: T, result: Result<R>) -> Result<R>
where
    T: Transaction,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
