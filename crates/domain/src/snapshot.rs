//! Client-facing snapshots of carts and orders.
//!
//! Snapshots denormalize product and category data as it is at the time of
//! the read. Order lines additionally carry the frozen price-at-purchase.

use std::collections::HashMap;

use common::{CartId, CartItemId, CategoryId, Money, OrderId, OrderItemId, ProductId, UserId};
use serde::{Serialize, Serializer};
use store::{Cart, CartLine, Catalog, Order, OrderStatus, PageRequest, ProductDetails};

use crate::error::{DomainError, Result};

/// Format used for order timestamps in responses (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn amount_overflow() -> DomainError {
    DomainError::Validation("amount exceeds the supported range".to_string())
}

/// Subtotal of a cart line at the product's current price.
pub(crate) fn line_subtotal(line: &CartLine) -> Result<Money> {
    line.subtotal().ok_or_else(amount_overflow)
}

/// Sum of several amounts.
pub(crate) fn total_of<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money> {
    Money::checked_sum(amounts).ok_or_else(amount_overflow)
}

fn decimal<S: Serializer>(money: &Money, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&money.to_decimal_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySnapshot {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    #[serde(serialize_with = "decimal")]
    pub price: Money,
    pub stock: i32,
    pub sku: String,
    pub is_active: bool,
    pub category: CategorySnapshot,
}

impl From<&ProductDetails> for ProductSnapshot {
    fn from(details: &ProductDetails) -> Self {
        let ProductDetails { product, category } = details;
        Self {
            id: product.id,
            category_id: product.category_id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            stock: product.stock,
            sku: product.sku.clone(),
            is_active: product.is_active,
            category: CategorySnapshot {
                id: category.id,
                name: category.name.clone(),
                description: category.description.clone(),
                is_active: category.is_active,
            },
        }
    }
}

/// A placed order as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    #[serde(serialize_with = "decimal")]
    pub total_amount: Money,
    #[serde(rename = "order_items")]
    pub items: Vec<OrderItemSnapshot>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemSnapshot {
    pub id: OrderItemId,
    pub quantity: i32,
    /// Unit price at purchase.
    #[serde(serialize_with = "decimal")]
    pub price: Money,
    pub product: ProductSnapshot,
}

/// A user's cart. `id` is `None` when the user has never written to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub id: Option<CartId>,
    pub user_id: UserId,
    #[serde(serialize_with = "decimal")]
    pub total: Money,
    #[serde(rename = "cart_items")]
    pub items: Vec<CartItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItemSnapshot {
    pub id: CartItemId,
    pub quantity: i32,
    /// Quantity times the product's current price.
    #[serde(serialize_with = "decimal")]
    pub subtotal: Money,
    pub product: ProductSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(request: PageRequest, total: u64) -> Self {
        Self {
            page: request.page(),
            limit: request.page_size(),
            total,
            total_pages: request.total_pages(total),
        }
    }
}

/// One page of a user's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPage {
    #[serde(rename = "data")]
    pub orders: Vec<OrderSnapshot>,
    pub meta: PageMeta,
}

async fn details_by_id<C>(
    catalog: &mut C,
    product_ids: Vec<ProductId>,
) -> Result<HashMap<ProductId, ProductDetails>>
where
    C: Catalog + ?Sized,
{
    let details = catalog.product_details(&product_ids).await?;
    Ok(details.into_iter().map(|d| (d.product.id, d)).collect())
}

fn product_snapshot(
    details: &HashMap<ProductId, ProductDetails>,
    product_id: ProductId,
) -> Result<ProductSnapshot> {
    details
        .get(&product_id)
        .map(ProductSnapshot::from)
        .ok_or_else(|| DomainError::not_found("product", product_id))
}

fn order_snapshot(
    order: &Order,
    details: &HashMap<ProductId, ProductDetails>,
) -> Result<OrderSnapshot> {
    let items = order
        .items
        .iter()
        .map(|item| -> Result<OrderItemSnapshot> {
            Ok(OrderItemSnapshot {
                id: item.id,
                quantity: item.quantity,
                price: item.unit_price,
                product: product_snapshot(details, item.product_id)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(OrderSnapshot {
        id: order.id,
        user_id: order.user_id,
        status: order.status,
        total_amount: order.total_amount,
        items,
        created_at: order.created_at.format(TIMESTAMP_FORMAT).to_string(),
    })
}

/// Assembles snapshots for a batch of orders with a single catalog read.
pub async fn assemble_orders<C>(catalog: &mut C, orders: &[Order]) -> Result<Vec<OrderSnapshot>>
where
    C: Catalog + ?Sized,
{
    let product_ids = orders
        .iter()
        .flat_map(|o| o.items.iter().map(|i| i.product_id))
        .collect();
    let details = details_by_id(catalog, product_ids).await?;
    orders.iter().map(|o| order_snapshot(o, &details)).collect()
}

/// Assembles the snapshot of a single order.
pub async fn assemble_order<C>(catalog: &mut C, order: &Order) -> Result<OrderSnapshot>
where
    C: Catalog + ?Sized,
{
    let product_ids = order.items.iter().map(|i| i.product_id).collect();
    let details = details_by_id(catalog, product_ids).await?;
    order_snapshot(order, &details)
}

/// Assembles a cart snapshot from its lines.
///
/// Prices and stock come from the products carried by the lines; the catalog
/// is only consulted for categories.
pub async fn assemble_cart<C>(
    catalog: &mut C,
    user_id: UserId,
    cart: Option<&Cart>,
    lines: &[CartLine],
) -> Result<CartSnapshot>
where
    C: Catalog + ?Sized,
{
    let product_ids = lines.iter().map(|l| l.item.product_id).collect();
    let details = details_by_id(catalog, product_ids).await?;

    let items = lines
        .iter()
        .map(|line| -> Result<CartItemSnapshot> {
            let category = details
                .get(&line.product.id)
                .map(|d| d.category.clone())
                .ok_or_else(|| DomainError::not_found("product", line.product.id))?;
            let product = ProductSnapshot::from(&ProductDetails {
                product: line.product.clone(),
                category,
            });
            Ok(CartItemSnapshot {
                id: line.item.id,
                quantity: line.item.quantity,
                subtotal: line_subtotal(line)?,
                product,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CartSnapshot {
        id: cart.map(|c| c.id),
        user_id,
        total: total_of(items.iter().map(|i| i.subtotal))?,
        items,
    })
}
