//! HTTP handlers for product operations.
//! Create and update take `multipart/form-data` so the photo travels with the
//! fields; everything else is plain JSON. Workflow rules live in
//! `ProductCatalogService`.

use crate::{
    errors::AppError,
    models::product::{
        PhotoUpload, ProductCreateInput, ProductFields, ProductFilter, ProductUpdateInput,
        ProductView,
    },
    services::catalog_service::CatalogError,
    state::AppState,
    validation::FieldError,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{collections::HashMap, str::FromStr};

/// Query params accepted by `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub category_id: Option<i64>,
    #[serde(default)]
    pub featured: bool,
}

/// `GET /api/products`
pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<ListProductsQuery>,
) -> Result<Json<Vec<ProductView>>, AppError> {
    let filter = ProductFilter {
        category_id: q.category_id,
        featured_only: q.featured,
    };
    Ok(Json(state.catalog.list_products(&filter).await?))
}

/// `GET /api/products/featured`
pub async fn list_featured(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductView>>, AppError> {
    let filter = ProductFilter {
        category_id: None,
        featured_only: true,
    };
    Ok(Json(state.catalog.list_products(&filter).await?))
}

/// `GET /api/products/category/{category_id}`
pub async fn list_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
) -> Result<Json<Vec<ProductView>>, AppError> {
    let filter = ProductFilter {
        category_id: Some(category_id),
        featured_only: false,
    };
    Ok(Json(state.catalog.list_products(&filter).await?))
}

/// `GET /api/products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProductView>, AppError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// `POST /api/products`: 201 with a `Location` header.
pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let input = ProductForm::read(multipart).await?.into_create_input()?;
    let view = state.catalog.create_product(input).await?;

    let mut response = (StatusCode::CREATED, Json(&view)).into_response();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/products/{}", view.id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// `PUT /api/products/{id}`: full replacement; a photo part replaces the photo.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<ProductView>, AppError> {
    let input = ProductForm::read(multipart).await?.into_update_input()?;
    Ok(Json(state.catalog.update_product(id, input).await?))
}

/// `DELETE /api/products/{id}`
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Raw multipart form: text parts by normalized name, plus the photo part.
///
/// Names are matched case-insensitively with underscores ignored, so
/// `categoryId`, `CategoryId` and `category_id` are the same field. The first
/// occurrence of a repeated field wins, which handles checkbox + hidden input pairs.
#[derive(Debug, Default)]
pub struct ProductForm {
    fields: HashMap<String, String>,
    photo: Option<PhotoUpload>,
}

impl ProductForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(normalize_key) else {
                continue;
            };
            if name == "photo" {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if form.photo.is_none() {
                    form.photo = Some(PhotoUpload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            } else {
                let value = field.text().await?;
                form.fields.entry(name).or_insert(value);
            }
        }
        Ok(form)
    }

    pub fn into_create_input(self) -> Result<ProductCreateInput, CatalogError> {
        let mut errors = Vec::new();
        let fields = self.product_fields(&mut errors);
        match fields {
            Some(fields) if errors.is_empty() => Ok(ProductCreateInput {
                fields,
                photo: self.photo,
            }),
            _ => Err(CatalogError::Validation(errors)),
        }
    }

    pub fn into_update_input(self) -> Result<ProductUpdateInput, CatalogError> {
        let mut errors = Vec::new();
        let id = self.required(&mut errors, "id", parse_int::<i64>);
        let fields = self.product_fields(&mut errors);
        let row_version = self.text("rowVersion").map(str::to_string);
        match (id, fields) {
            (Some(id), Some(fields)) if errors.is_empty() => Ok(ProductUpdateInput {
                id,
                fields,
                photo: self.photo,
                row_version,
            }),
            _ => Err(CatalogError::Validation(errors)),
        }
    }

    fn product_fields(&self, errors: &mut Vec<FieldError>) -> Option<ProductFields> {
        let category_id = self.required(errors, "categoryId", parse_int::<i64>);
        let name = self.required(errors, "name", |v| Ok(v.to_string()));
        let quantity = self.optional(errors, "quantity", parse_int::<i32>).unwrap_or(0);
        let cost_value = self.required(errors, "costValue", parse_money);
        let sale_value = self.required(errors, "saleValue", parse_money);
        let featured = self
            .optional(errors, "featured", parse_flag)
            .unwrap_or(false);
        let description = self.text("description").map(str::to_string);

        Some(ProductFields {
            category_id: category_id?,
            name: name?,
            description,
            quantity,
            cost_value: cost_value?,
            sale_value: sale_value?,
            featured,
        })
    }

    /// Trimmed, non-empty text value of `field`.
    fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(&normalize_key(field))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn optional<T>(
        &self,
        errors: &mut Vec<FieldError>,
        field: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Option<T> {
        let raw = self.text(field)?;
        match parse(raw) {
            Ok(value) => Some(value),
            Err(message) => {
                errors.push(FieldError::new(field, message));
                None
            }
        }
    }

    fn required<T>(
        &self,
        errors: &mut Vec<FieldError>,
        field: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Option<T> {
        if self.text(field).is_none() {
            errors.push(FieldError::new(field, format!("{} is required", field)));
            return None;
        }
        self.optional(errors, field, parse)
    }
}

fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_int<T: FromStr>(raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("`{}` is not a whole number", raw))
}

/// Accepts `9.99` as well as the comma-decimal `9,99`.
fn parse_money(raw: &str) -> Result<Decimal, String> {
    let normalized = if raw.contains('.') {
        raw.to_string()
    } else {
        raw.replace(',', ".")
    };
    Decimal::from_str(&normalized).map_err(|_| format!("`{}` is not a decimal amount", raw))
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(format!("`{}` is not a boolean", raw)),
    }
}
