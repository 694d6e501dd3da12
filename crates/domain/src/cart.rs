//! Cart service: reads and edits a user's cart.

use common::{CartItemId, ProductId, UserId};
use store::{Cart, CartStore, Catalog, Product, Store, Transaction};

use crate::error::{DomainError, Result};
use crate::finish;
use crate::snapshot::{CartSnapshot, assemble_cart};

fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(DomainError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

/// Best-effort check against the stock as currently stored. Nothing is
/// reserved; checkout re-checks authoritatively.
fn ensure_stock(product: &Product, requested: i32) -> Result<()> {
    if requested > product.stock {
        return Err(DomainError::InsufficientStock {
            product_id: product.id,
            requested,
            available: product.stock,
        });
    }
    Ok(())
}

/// Loads a product that can still be put in a cart.
async fn active_product<T: Transaction>(tx: &mut T, product_id: ProductId) -> Result<Product> {
    tx.find_product(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| DomainError::not_found("product", product_id))
}

/// Takes the cart row lock so the edit waits for an in-flight checkout of
/// the same cart.
async fn lock_for_edit<T: Transaction>(tx: &mut T, user_id: UserId) -> Result<Option<Cart>> {
    Ok(tx.lock_cart(user_id).await?)
}

async fn snapshot_of<T: Transaction>(tx: &mut T, user_id: UserId) -> Result<CartSnapshot> {
    let cart = tx.find_cart(user_id).await?;
    let lines = match &cart {
        Some(cart) => tx.cart_lines(cart.id).await?,
        None => Vec::new(),
    };
    assemble_cart(tx, user_id, cart.as_ref(), &lines).await
}

/// Service for managing carts.
///
/// Carts are created lazily on the first write. Every method runs in its own
/// unit of work and returns the cart as it is after the change.
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, or an empty view if they have none.
    ///
    /// Never creates a cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut tx = self.store.begin().await?;
        let result = snapshot_of(&mut tx, user_id).await;
        finish(tx, result).await
    }

    /// Creates the user's cart if it does not exist yet.
    ///
    /// Called when a user registers; idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut tx = self.store.begin().await?;
        let result = Self::create_in(&mut tx, user_id).await;
        finish(tx, result).await
    }

    async fn create_in(tx: &mut S::Tx, user_id: UserId) -> Result<CartSnapshot> {
        tx.create_cart(user_id).await?;
        snapshot_of(tx, user_id).await
    }

    /// Adds `quantity` units of a product to the user's cart.
    ///
    /// Increases the existing line if the product is already in the cart.
    /// Rejects the change if the resulting quantity exceeds current stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartSnapshot> {
        validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let result = Self::add_in(&mut tx, user_id, product_id, quantity).await;
        let cart = finish(tx, result).await?;

        metrics::counter!("cart_mutations_total", "op" => "add").increment(1);
        Ok(cart)
    }

    async fn add_in(
        tx: &mut S::Tx,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartSnapshot> {
        let product = active_product(tx, product_id).await?;

        tx.create_cart(user_id).await?;
        let cart = lock_for_edit(tx, user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart", user_id))?;
        match tx.find_item(cart.id, product_id).await? {
            Some(item) => {
                let requested = item.quantity.checked_add(quantity).ok_or_else(|| {
                    DomainError::Validation(format!("quantity {quantity} is too large"))
                })?;
                ensure_stock(&product, requested)?;
                tx.set_item_quantity(item.id, requested).await?;
            }
            None => {
                ensure_stock(&product, quantity)?;
                tx.insert_item(cart.id, product_id, quantity).await?;
            }
        }

        snapshot_of(tx, user_id).await
    }

    /// Replaces the quantity of one of the user's cart lines.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartSnapshot> {
        validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let result = Self::update_in(&mut tx, user_id, item_id, quantity).await;
        let cart = finish(tx, result).await?;

        metrics::counter!("cart_mutations_total", "op" => "update").increment(1);
        Ok(cart)
    }

    async fn update_in(
        tx: &mut S::Tx,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartSnapshot> {
        if lock_for_edit(tx, user_id).await?.is_none() {
            return Err(DomainError::not_found("cart item", item_id));
        }
        let item = tx
            .find_user_item(user_id, item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart item", item_id))?;
        let product = active_product(tx, item.product_id).await?;

        ensure_stock(&product, quantity)?;
        tx.set_item_quantity(item.id, quantity).await?;

        snapshot_of(tx, user_id).await
    }

    /// Deletes one of the user's cart lines.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<CartSnapshot> {
        let mut tx = self.store.begin().await?;
        let result = Self::remove_in(&mut tx, user_id, item_id).await;
        let cart = finish(tx, result).await?;

        metrics::counter!("cart_mutations_total", "op" => "remove").increment(1);
        Ok(cart)
    }

    async fn remove_in(
        tx: &mut S::Tx,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<CartSnapshot> {
        if lock_for_edit(tx, user_id).await?.is_none() {
            return Err(DomainError::not_found("cart item", item_id));
        }
        if !tx.delete_user_item(user_id, item_id).await? {
            return Err(DomainError::not_found("cart item", item_id));
        }
        snapshot_of(tx, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use store::{FailPoint, InMemoryStore};

    async fn seeded() -> (InMemoryStore, ProductId, ProductId) {
        let store = InMemoryStore::new();
        let category = store.add_category("Tools").await;
        let hammer = store
            .add_product(category, "Hammer", Money::from_cents(1000), 5)
            .await;
        let nails = store
            .add_product(category, "Nails", Money::from_cents(500), 1)
            .await;
        (store, hammer, nails)
    }

    #[tokio::test]
    async fn get_cart_without_cart_is_empty_view() {
        let (store, _, _) = seeded().await;
        let service = CartService::new(store.clone());

        let cart = service.get_cart(UserId::new(1)).await.unwrap();

        assert_eq!(cart.id, None);
        assert!(cart.items.is_empty());
        assert_eq!(cart.total, Money::zero());

        // Reading never creates a cart.
        let cart = service.get_cart(UserId::new(1)).await.unwrap();
        assert_eq!(cart.id, None);
    }

    #[tokio::test]
    async fn add_item_creates_cart_lazily() {
        let (store, hammer, nails) = seeded().await;
        let service = CartService::new(store);
        let user = UserId::new(1);

        service.add_item(user, nails, 1).await.unwrap();
        let cart = service.add_item(user, hammer, 2).await.unwrap();

        assert!(cart.id.is_some());
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].product.id, hammer);
        assert_eq!(cart.items[0].subtotal, Money::from_cents(2000));
        assert_eq!(cart.total, Money::from_cents(2500));
        assert_eq!(cart.items[0].product.category.name, "Tools");
    }

    #[tokio::test]
    async fn add_item_merges_existing_line() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store);
        let user = UserId::new(1);

        service.add_item(user, hammer, 2).await.unwrap();
        let cart = service.add_item(user, hammer, 3).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn add_item_rejects_quantity_over_stock() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());
        let user = UserId::new(1);

        service.add_item(user, hammer, 4).await.unwrap();
        let result = service.add_item(user, hammer, 2).await;

        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock {
                requested: 6,
                available: 5,
                ..
            })
        ));
        let cart = service.get_cart(user).await.unwrap();
        assert_eq!(cart.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn add_item_does_not_reserve_stock() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());

        service.add_item(UserId::new(1), hammer, 5).await.unwrap();
        service.add_item(UserId::new(2), hammer, 5).await.unwrap();

        assert_eq!(store.stock_of(hammer).await, Some(5));
    }

    #[tokio::test]
    async fn add_item_rejects_non_positive_quantity() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());

        for quantity in [0, -3] {
            let result = service.add_item(UserId::new(1), hammer, quantity).await;
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
        assert_eq!(store.cart_item_count(UserId::new(1)).await, 0);
    }

    #[tokio::test]
    async fn add_item_unknown_or_delisted_product() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());

        let result = service.add_item(UserId::new(1), ProductId::new(99), 1).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        store.set_active(hammer, false).await;
        let result = service.add_item(UserId::new(1), hammer, 1).await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                entity: "product",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn update_item_checks_ownership_and_stock() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store);
        let owner = UserId::new(1);

        let cart = service.add_item(owner, hammer, 1).await.unwrap();
        let item_id = cart.items[0].id;

        let result = service.update_item(UserId::new(2), item_id, 2).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        let result = service.update_item(owner, item_id, 6).await;
        assert!(matches!(result, Err(DomainError::InsufficientStock { .. })));

        let cart = service.update_item(owner, item_id, 3).await.unwrap();
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.total, Money::from_cents(3000));
    }

    #[tokio::test]
    async fn delisted_product_cannot_be_resized_but_can_be_removed() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());
        let user = UserId::new(1);
        let cart = service.add_item(user, hammer, 1).await.unwrap();
        let item_id = cart.items[0].id;
        store.set_active(hammer, false).await;

        let result = service.update_item(user, item_id, 2).await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                entity: "product",
                ..
            })
        ));

        let cart = service.remove_item(user, item_id).await.unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn edits_without_a_cart_are_not_found() {
        let (store, _, _) = seeded().await;
        let service = CartService::new(store.clone());
        let user = UserId::new(1);

        let result = service.update_item(user, CartItemId::new(1), 1).await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                entity: "cart item",
                ..
            })
        ));
        let result = service.remove_item(user, CartItemId::new(1)).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        // Neither edit creates a cart.
        assert_eq!(service.get_cart(user).await.unwrap().id, None);
    }

    #[tokio::test]
    async fn cart_total_overflow_is_rejected() {
        let (store, _, _) = seeded().await;
        let category = store.add_category("Jewels").await;
        let crown = store
            .add_product(category, "Crown", Money::from_cents(i64::MAX / 2), 10)
            .await;
        let service = CartService::new(store.clone());

        let result = service.add_item(UserId::new(1), crown, 3).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(store.cart_item_count(UserId::new(1)).await, 0);
    }

    #[tokio::test]
    async fn remove_item_checks_ownership() {
        let (store, hammer, nails) = seeded().await;
        let service = CartService::new(store);
        let owner = UserId::new(1);

        service.add_item(owner, hammer, 1).await.unwrap();
        let cart = service.add_item(owner, nails, 1).await.unwrap();
        let item_id = cart.items[0].id;

        let result = service.remove_item(UserId::new(2), item_id).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        let cart = service.remove_item(owner, item_id).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product.id, nails);

        let result = service.remove_item(owner, item_id).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn create_cart_is_idempotent() {
        let (store, _, _) = seeded().await;
        let service = CartService::new(store);

        let first = service.create_cart(UserId::new(1)).await.unwrap();
        let second = service.create_cart(UserId::new(1)).await.unwrap();

        assert!(first.id.is_some());
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn failed_commit_surfaces_persistence_error() {
        let (store, hammer, _) = seeded().await;
        let service = CartService::new(store.clone());
        store.fail_at(FailPoint::Commit);

        let result = service.add_item(UserId::new(1), hammer, 1).await;

        assert!(matches!(result, Err(DomainError::Persistence(_))));
        store.clear_failures();
        assert_eq!(store.cart_item_count(UserId::new(1)).await, 0);
    }
}
