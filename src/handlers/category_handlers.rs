//! Read-only category and storefront endpoints.

use crate::{
    errors::AppError,
    models::category::{Category, StorefrontHome},
    state::AppState,
};
use axum::{Json, extract::State};

/// `GET /api/categories`
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.catalog.list_categories().await?))
}

/// `GET /api/storefront`: categories and featured products for the landing page.
pub async fn storefront_home(
    State(state): State<AppState>,
) -> Result<Json<StorefrontHome>, AppError> {
    Ok(Json(state.catalog.storefront_home().await?))
}
