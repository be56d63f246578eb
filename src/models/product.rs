//! Represents a sellable product and the shapes it takes on the way in and out.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::FromRow;

use crate::services::file_store::FileStore;

/// A product row as stored in SQLite, joined with its category name.
///
/// Money is kept as integer cents; see [`Product`] for the decimal form.
#[derive(Clone, FromRow, Debug)]
pub struct ProductRow {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub cost_cents: i64,
    pub sale_cents: i64,
    pub featured: bool,
    pub photo_path: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_name: Option<String>,
}

/// A single sellable item.
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    /// Assigned by the record store on insert, immutable afterwards.
    pub id: i64,

    /// Foreign key into `categories`.
    pub category_id: i64,

    pub name: String,

    pub description: Option<String>,

    /// Units in stock.
    pub quantity: i32,

    /// Purchase price, two fractional digits.
    pub cost_value: Decimal,

    /// Shelf price, two fractional digits.
    pub sale_value: Decimal,

    /// Shown on the storefront landing page.
    pub featured: bool,

    /// Opaque file store path of the product photo. Never the bytes.
    pub photo_path: Option<String>,

    /// Optimistic concurrency token, bumped on every update.
    pub version: i64,

    /// Joined from `categories`; `None` when the category row is gone.
    pub category_name: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            description: row.description,
            quantity: row.quantity,
            cost_value: from_cents(row.cost_cents),
            sale_value: from_cents(row.sale_cents),
            featured: row.featured,
            photo_path: row.photo_path,
            version: row.version,
            category_name: row.category_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Product {
    /// Overwrite every caller-editable field. Update is full replacement,
    /// not a merge, so absent optional values clear the stored ones.
    pub fn apply(&mut self, fields: ProductFields) {
        self.category_id = fields.category_id;
        self.name = fields.name;
        self.description = fields.description;
        self.quantity = fields.quantity;
        self.cost_value = fields.cost_value;
        self.sale_value = fields.sale_value;
        self.featured = fields.featured;
    }
}

/// Caller-editable product fields shared by create and update.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductFields {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub cost_value: Decimal,
    pub sale_value: Decimal,
    pub featured: bool,
}

/// An uploaded photo payload, held in memory until the file store persists it.
#[derive(Clone, Debug)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension for the stored copy, taken from the uploaded file name
    /// or, failing that, from the declared content type.
    pub fn extension(&self) -> Option<String> {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric())
            });

        from_name.or_else(|| {
            let ext = match self.content_type.as_deref()? {
                "image/jpeg" => "jpg",
                "image/png" => "png",
                "image/gif" => "gif",
                "image/webp" => "webp",
                _ => return None,
            };
            Some(ext.to_string())
        })
    }
}

/// Input of `create_product`.
#[derive(Clone, Debug)]
pub struct ProductCreateInput {
    pub fields: ProductFields,
    pub photo: Option<PhotoUpload>,
}

/// Input of `update_product`. `id` must match the id being updated.
#[derive(Clone, Debug)]
pub struct ProductUpdateInput {
    pub id: i64,
    pub fields: ProductFields,
    pub photo: Option<PhotoUpload>,
    /// Token from a previously read [`ProductView`]; when present the update
    /// only applies to that exact version.
    pub row_version: Option<String>,
}

/// Optional narrowing for `list_products`.
#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub featured_only: bool,
}

/// View-safe projection of a product returned to callers.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sale_value: Decimal,
    pub featured: bool,
    /// Public URL of the photo, if any.
    pub photo: Option<String>,
    pub category_name: Option<String>,
    pub row_version: String,
    pub updated_at: DateTime<Utc>,
}

impl ProductView {
    pub fn from_product(product: &Product, files: &dyn FileStore) -> Self {
        Self {
            id: product.id,
            category_id: product.category_id,
            name: product.name.clone(),
            description: product.description.clone(),
            quantity: product.quantity,
            cost_value: product.cost_value,
            sale_value: product.sale_value,
            featured: product.featured,
            photo: product
                .photo_path
                .as_deref()
                .filter(|path| !path.is_empty())
                .map(|path| files.url_for(path)),
            category_name: product.category_name.clone(),
            row_version: encode_row_version(product.version),
            updated_at: product.updated_at,
        }
    }
}

/// Round to cents the way a `numeric(10,2)` column does; `None` when the
/// amount does not fit in an `i64` count of cents.
pub fn to_cents(value: Decimal) -> Option<i64> {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    if rounded.scale() != 2 {
        return None;
    }
    i64::try_from(rounded.mantissa()).ok()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn encode_row_version(version: i64) -> String {
    general_purpose::STANDARD.encode(version.to_be_bytes())
}

/// Inverse of [`encode_row_version`]; `None` for anything it could not have produced.
pub fn decode_row_version(token: &str) -> Option<i64> {
    let bytes = general_purpose::STANDARD.decode(token.trim()).ok()?;
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(raw))
}
