use serde::{Deserialize, Serialize};

/// Declares an integer-backed identifier for a persisted row.
///
/// Each identifier wraps the row's `BIGSERIAL` primary key so that a product
/// id can never be passed where an order id is expected.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw key.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw key.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of an authenticated user, supplied by the identity gateway.
    UserId
);
row_id!(
    /// Identifier of a catalog product.
    ProductId
);
row_id!(
    /// Identifier of a catalog category.
    CategoryId
);
row_id!(
    /// Identifier of a user's cart.
    CartId
);
row_id!(
    /// Identifier of a single cart line.
    CartItemId
);
row_id!(
    /// Identifier of a placed order.
    OrderId
);
row_id!(
    /// Identifier of a single order line.
    OrderItemId
);
