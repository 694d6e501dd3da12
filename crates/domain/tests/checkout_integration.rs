//! End-to-end checkout tests against the in-memory store.

use std::sync::Arc;

use common::{Money, ProductId, UserId};
use domain::{
    CartService, DomainError, InMemoryPublisher, OrderMaterializer, OrderQueryService,
};
use futures_util::future::join_all;
use store::{InMemoryStore, PageRequest};

struct Shop {
    store: InMemoryStore,
    carts: CartService<InMemoryStore>,
    checkout: OrderMaterializer<InMemoryStore, InMemoryPublisher>,
    orders: OrderQueryService<InMemoryStore>,
}

impl Shop {
    fn new(store: InMemoryStore) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: OrderMaterializer::new(store.clone(), InMemoryPublisher::new()),
            orders: OrderQueryService::new(store.clone()),
            store,
        }
    }
}

/// Product 1 costs 10.00 with 5 in stock, product 2 costs 5.00 with 1 in stock.
async fn two_product_shop() -> (Shop, ProductId, ProductId) {
    let store = InMemoryStore::new();
    let category = store.add_category("Hardware").await;
    let first = store
        .add_product(category, "Drill", Money::from_cents(1000), 5)
        .await;
    let second = store
        .add_product(category, "Bit", Money::from_cents(500), 1)
        .await;
    (Shop::new(store), first, second)
}

#[tokio::test]
async fn test_checkout_totals_and_decrements() {
    let (shop, first, second) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 2).await.unwrap();
    shop.carts.add_item(user, second, 1).await.unwrap();

    let order = shop.checkout.create_order(user).await.unwrap();

    assert_eq!(order.total_amount, Money::from_cents(2500));
    assert_eq!(order.total_amount.to_decimal_string(), "25.00");
    let line_total = Money::checked_sum(
        order
            .items
            .iter()
            .map(|i| i.price.checked_times(i.quantity).unwrap()),
    );
    assert_eq!(line_total, Some(order.total_amount));

    assert_eq!(shop.store.stock_of(first).await, Some(3));
    assert_eq!(shop.store.stock_of(second).await, Some(0));
    assert_eq!(shop.store.order_count().await, 1);

    let cart = shop.carts.get_cart(user).await.unwrap();
    assert!(cart.items.is_empty());
    assert!(cart.id.is_some());
}

#[tokio::test]
async fn test_out_of_stock_item_changes_nothing() {
    let (shop, first, second) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 2).await.unwrap();
    shop.carts.add_item(user, second, 1).await.unwrap();
    shop.store.set_stock(second, 0).await;
    let cart_before = shop.carts.get_cart(user).await.unwrap();

    let result = shop.checkout.create_order(user).await;

    match result {
        Err(DomainError::InsufficientStock { product_id, .. }) => assert_eq!(product_id, second),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(shop.store.stock_of(first).await, Some(5));
    assert_eq!(shop.store.stock_of(second).await, Some(0));
    assert_eq!(shop.store.order_count().await, 0);
    assert_eq!(shop.carts.get_cart(user).await.unwrap(), cart_before);
}

#[tokio::test]
async fn test_empty_cart_has_no_side_effects() {
    let (shop, first, _) = two_product_shop().await;
    let user = UserId::new(1);
    let cart = shop.carts.add_item(user, first, 1).await.unwrap();
    shop.carts.remove_item(user, cart.items[0].id).await.unwrap();

    let result = shop.checkout.create_order(user).await;

    assert!(matches!(result, Err(DomainError::EmptyCart)));
    assert_eq!(shop.store.stock_of(first).await, Some(5));
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_get_order_is_stable() {
    let (shop, first, _) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 1).await.unwrap();
    let placed = shop.checkout.create_order(user).await.unwrap();

    let once = shop.orders.get_order(user, placed.id).await.unwrap();
    let twice = shop.orders.get_order(user, placed.id).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(once, placed);
}

#[tokio::test]
async fn test_price_at_purchase_survives_price_change() {
    let (shop, first, _) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 2).await.unwrap();
    let placed = shop.checkout.create_order(user).await.unwrap();

    shop.store.set_price(first, Money::from_cents(9900)).await;
    let order = shop.orders.get_order(user, placed.id).await.unwrap();

    assert_eq!(order.items[0].price, Money::from_cents(1000));
    assert_eq!(order.total_amount, Money::from_cents(2000));
    assert_eq!(order.items[0].product.price, Money::from_cents(9900));
}

#[tokio::test]
async fn test_checkout_uses_price_at_checkout_time() {
    let (shop, first, _) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 1).await.unwrap();
    shop.store.set_price(first, Money::from_cents(1200)).await;

    let order = shop.checkout.create_order(user).await.unwrap();

    assert_eq!(order.total_amount, Money::from_cents(1200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_for_last_unit() {
    let (shop, _, last) = two_product_shop().await;
    let buyers = [UserId::new(1), UserId::new(2)];
    for user in buyers {
        shop.carts.add_item(user, last, 1).await.unwrap();
    }

    let shop = Arc::new(shop);
    let handles = buyers.map(|user| {
        let shop = Arc::clone(&shop);
        tokio::spawn(async move { shop.checkout.create_order(user).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(DomainError::InsufficientStock { product_id, .. }) if *product_id == last))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 1);
    assert_eq!(shop.store.stock_of(last).await, Some(0));
    assert_eq!(shop.store.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let store = InMemoryStore::new();
    let category = store.add_category("Hardware").await;
    let product = store
        .add_product(category, "Saw", Money::from_cents(3000), 7)
        .await;
    let shop = Arc::new(Shop::new(store));

    let buyers: Vec<UserId> = (1..=10).map(UserId::new).collect();
    for user in &buyers {
        shop.carts.add_item(*user, product, 2).await.unwrap();
    }

    let handles = buyers.iter().map(|user| {
        let shop = Arc::clone(&shop);
        let user = *user;
        tokio::spawn(async move { shop.checkout.create_order(user).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 3);
    assert_eq!(shop.store.stock_of(product).await, Some(1));
    assert_eq!(shop.store.order_count().await, 3);
}

#[tokio::test]
async fn test_list_orders_second_page() {
    let (shop, first, _) = two_product_shop().await;
    shop.store.set_stock(first, 100).await;
    let user = UserId::new(1);

    let mut placed = Vec::new();
    for _ in 0..25 {
        shop.carts.add_item(user, first, 1).await.unwrap();
        placed.push(shop.checkout.create_order(user).await.unwrap().id);
    }

    let page = shop
        .orders
        .list_orders(user, PageRequest::new(2, 10))
        .await
        .unwrap();

    // Newest first: the second page holds the 11th through 20th newest.
    let expected: Vec<_> = placed.iter().rev().skip(10).take(10).copied().collect();
    let ids: Vec<_> = page.orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(page.meta.total, 25);
    assert_eq!(page.meta.total_pages, 3);
}

#[tokio::test]
async fn test_list_orders_clamps_page_size() {
    let (shop, first, _) = two_product_shop().await;
    let user = UserId::new(1);
    shop.carts.add_item(user, first, 1).await.unwrap();
    shop.checkout.create_order(user).await.unwrap();

    let page = shop
        .orders
        .list_orders(user, PageRequest::new(0, 1000))
        .await
        .unwrap();

    assert_eq!(page.meta.page, 1);
    assert_eq!(page.meta.limit, 100);
    assert_eq!(page.orders.len(), 1);
}
