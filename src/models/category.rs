//! Represents a product grouping. Categories are read-only for this service.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::product::ProductView;

/// A category referenced by `Product::category_id`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Everything the storefront landing page renders in one call.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontHome {
    pub categories: Vec<Category>,
    pub featured_products: Vec<ProductView>,
}
