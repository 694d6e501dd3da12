//! Order materializer: converts a user's cart into an order.

use std::sync::Arc;
use std::time::Instant;

use common::UserId;
use store::{CartStore, NewOrder, NewOrderItem, OrderLedger, StockLedger, Store};

use crate::error::{DomainError, Result};
use crate::events::{EventEnvelope, EventPublisher};
use crate::finish;
use crate::snapshot::{OrderSnapshot, assemble_order, line_subtotal, total_of};

/// Turns carts into orders.
///
/// Each checkout runs as one unit of work spanning the cart, the stock
/// counters and the order ledger: either the order exists, stock is
/// decremented and the cart is empty, or nothing changed at all.
pub struct OrderMaterializer<S: Store, P: EventPublisher> {
    store: S,
    publisher: Arc<P>,
}

impl<S: Store, P: EventPublisher> OrderMaterializer<S, P> {
    /// Creates a new materializer over the given store.
    ///
    /// `publisher` receives an `order.created` event after each successful
    /// checkout.
    pub fn new(store: S, publisher: P) -> Self {
        Self {
            store,
            publisher: Arc::new(publisher),
        }
    }

    /// Places an order for everything in the user's cart.
    ///
    /// Unit prices are taken from the products at this moment and frozen into
    /// the order. Fails with `NotFound` if the user has no cart, `EmptyCart`
    /// if it has no lines and `InsufficientStock` naming the first product
    /// (by ascending id) that cannot be covered.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, user_id: UserId) -> Result<OrderSnapshot> {
        let started = Instant::now();
        let result = self.checkout(user_id).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    %user_id,
                    order_id = %order.id,
                    total = %order.total_amount,
                    items = order.items.len(),
                    "order created"
                );
                self.publish_created(order);
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
                if e.is_retryable() {
                    tracing::error!(%user_id, error = %e, "checkout failed");
                } else {
                    tracing::info!(%user_id, reason = e.reason(), error = %e, "checkout rejected");
                }
            }
        }

        result
    }

    async fn checkout(&self, user_id: UserId) -> Result<OrderSnapshot> {
        let mut tx = self.store.begin().await?;
        let result = Self::materialize(&mut tx, user_id).await;
        finish(tx, result).await
    }

    async fn materialize(tx: &mut S::Tx, user_id: UserId) -> Result<OrderSnapshot> {
        let cart = tx
            .lock_cart(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart", user_id))?;

        // Ascending product id, so concurrent checkouts take row locks in the
        // same order.
        let lines = tx.cart_lines(cart.id).await?;
        if lines.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        for line in &lines {
            if line.product.stock < line.item.quantity {
                return Err(DomainError::InsufficientStock {
                    product_id: line.product.id,
                    requested: line.item.quantity,
                    available: line.product.stock,
                });
            }
        }

        let subtotals = lines.iter().map(line_subtotal).collect::<Result<Vec<_>>>()?;
        let total_amount = total_of(subtotals)?;
        let items: Vec<NewOrderItem> = lines
            .iter()
            .map(|line| NewOrderItem {
                product_id: line.product.id,
                quantity: line.item.quantity,
                unit_price: line.product.price,
            })
            .collect();

        // The stock read above may be stale; the decrement is the
        // authoritative check.
        for item in &items {
            tx.decrement_stock(item.product_id, item.quantity).await?;
        }

        let order = tx
            .insert_order(NewOrder {
                user_id,
                total_amount,
                items,
            })
            .await?;
        tx.clear_cart(cart.id).await?;

        let order = tx
            .find_order(order.id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order.id))?;
        assemble_order(tx, &order).await
    }

    fn publish_created(&self, order: &OrderSnapshot) {
        let event = match EventEnvelope::order_created(order) {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!("order_events_failed_total").increment(1);
                tracing::warn!(order_id = %order.id, error = %e, "failed to encode order event");
                return;
            }
        };

        let publisher = Arc::clone(&self.publisher);
        let order_id = order.id;
        tokio::spawn(async move {
            let event_id = event.event_id;
            match publisher.publish(event).await {
                Ok(()) => {
                    metrics::counter!("order_events_published_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("order_events_failed_total").increment(1);
                    tracing::warn!(%order_id, %event_id, error = %e, "failed to publish order event");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::{Money, ProductId};
    use store::{FailPoint, InMemoryStore, OrderStatus};

    use crate::CartService;
    use crate::events::{InMemoryPublisher, ORDER_CREATED};

    struct Fixture {
        store: InMemoryStore,
        publisher: InMemoryPublisher,
        carts: CartService<InMemoryStore>,
        orders: OrderMaterializer<InMemoryStore, InMemoryPublisher>,
        first: ProductId,
        second: ProductId,
    }

    async fn fixture(first_stock: i32, second_stock: i32) -> Fixture {
        let store = InMemoryStore::new();
        let category = store.add_category("Tools").await;
        let first = store
            .add_product(category, "Hammer", Money::from_cents(1000), first_stock)
            .await;
        let second = store
            .add_product(category, "Nails", Money::from_cents(500), second_stock)
            .await;
        let publisher = InMemoryPublisher::new();
        Fixture {
            carts: CartService::new(store.clone()),
            orders: OrderMaterializer::new(store.clone(), publisher.clone()),
            store,
            publisher,
            first,
            second,
        }
    }

    #[tokio::test]
    async fn checkout_places_order_and_empties_cart() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 2).await.unwrap();
        f.carts.add_item(user, f.second, 1).await.unwrap();

        let order = f.orders.create_order(user).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(2500));
        assert_eq!(order.items.len(), 2);
        assert_eq!(f.store.stock_of(f.first).await, Some(3));
        assert_eq!(f.store.stock_of(f.second).await, Some(0));
        assert_eq!(f.store.cart_item_count(user).await, 0);
    }

    #[tokio::test]
    async fn missing_cart_is_not_found() {
        let f = fixture(5, 1).await;

        let result = f.orders.create_order(UserId::new(1)).await;

        assert!(matches!(
            result,
            Err(DomainError::NotFound { entity: "cart", .. })
        ));
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.create_cart(user).await.unwrap();

        let result = f.orders.create_order(user).await;

        assert!(matches!(result, Err(DomainError::EmptyCart)));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn short_stock_names_the_product() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 2).await.unwrap();
        f.carts.add_item(user, f.second, 1).await.unwrap();
        f.store.set_stock(f.second, 0).await;

        let result = f.orders.create_order(user).await;

        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock { product_id, .. }) if product_id == f.second
        ));
        assert_eq!(f.store.stock_of(f.first).await, Some(5));
        assert_eq!(f.store.cart_item_count(user).await, 2);
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn total_overflow_is_rejected() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 3).await.unwrap();
        f.store
            .set_price(f.first, Money::from_cents(i64::MAX / 2))
            .await;

        let result = f.orders.create_order(user).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(f.store.stock_of(f.first).await, Some(5));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn failure_after_decrement_rolls_everything_back() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 2).await.unwrap();

        for point in [FailPoint::InsertOrder, FailPoint::ClearCart, FailPoint::Commit] {
            f.store.fail_at(point);
            let result = f.orders.create_order(user).await;
            f.store.clear_failures();

            assert!(matches!(result, Err(DomainError::Persistence(_))), "{point:?}");
            assert_eq!(f.store.stock_of(f.first).await, Some(5), "{point:?}");
            assert_eq!(f.store.cart_item_count(user).await, 1, "{point:?}");
            assert_eq!(f.store.order_count().await, 0, "{point:?}");
        }
    }

    #[tokio::test]
    async fn order_created_event_is_published() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 1).await.unwrap();

        let order = f.orders.create_order(user).await.unwrap();

        assert!(f.publisher.wait_for(1, Duration::from_secs(1)).await);
        let event = &f.publisher.events()[0];
        assert_eq!(event.event_type, ORDER_CREATED);
        assert_eq!(event.payload["id"], order.id.as_i64());
    }

    #[tokio::test]
    async fn publish_failure_keeps_the_order() {
        let f = fixture(5, 1).await;
        let user = UserId::new(1);
        f.carts.add_item(user, f.first, 1).await.unwrap();
        f.publisher.set_fail(true);

        let result = f.orders.create_order(user).await;

        assert!(result.is_ok());
        assert_eq!(f.store.order_count().await, 1);
        assert!(!f.publisher.wait_for(1, Duration::from_millis(50)).await);
    }
}
