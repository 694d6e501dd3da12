//! Shared types used across the shop checkout crates.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, CartItemId, CategoryId, OrderId, OrderItemId, ProductId, UserId};
