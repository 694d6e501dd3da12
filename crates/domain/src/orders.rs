//! Read-only queries over placed orders.

use common::{OrderId, UserId};
use store::{OrderLedger, PageRequest, Store};

use crate::error::{DomainError, Result};
use crate::finish;
use crate::snapshot::{OrderPage, OrderSnapshot, PageMeta, assemble_order, assemble_orders};

/// Service for reading a user's orders.
pub struct OrderQueryService<S: Store> {
    store: S,
}

impl<S: Store> OrderQueryService<S> {
    /// Creates a new query service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists the user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<OrderPage> {
        let mut tx = self.store.begin().await?;
        let result = Self::list_in(&mut tx, user_id, page).await;
        finish(tx, result).await
    }

    async fn list_in(tx: &mut S::Tx, user_id: UserId, page: PageRequest) -> Result<OrderPage> {
        let orders = tx.list_user_orders(user_id, page).await?;
        let total = tx.count_user_orders(user_id).await?;
        Ok(OrderPage {
            orders: assemble_orders(tx, &orders).await?,
            meta: PageMeta::new(page, total),
        })
    }

    /// Loads one of the user's orders.
    ///
    /// Orders belonging to other users are reported as `NotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<OrderSnapshot> {
        let mut tx = self.store.begin().await?;
        let result = Self::get_in(&mut tx, user_id, order_id).await;
        finish(tx, result).await
    }

    async fn get_in(tx: &mut S::Tx, user_id: UserId, order_id: OrderId) -> Result<OrderSnapshot> {
        let order = tx
            .find_user_order(user_id, order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        assemble_order(tx, &order).await
    }
}
