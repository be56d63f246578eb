//! src/services/catalog_service.rs
//!
//! ProductCatalogService: product CRUD that keeps each record and its photo
//! file consistent. Records go through a `ProductStore`, photo bytes through a
//! `FileStore`; both are injected so the workflow stays storage-agnostic.
//!
//! Photo replacement always saves the new file before deleting the old one,
//! so a failure part-way leaves the previous photo retrievable. Cleanup of
//! superseded files is best-effort: a failed delete is logged as an orphaned
//! file and never fails the operation it belongs to.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    models::{
        category::{Category, StorefrontHome},
        product::{
            PhotoUpload, Product, ProductCreateInput, ProductFields, ProductFilter,
            ProductUpdateInput, ProductView, decode_row_version,
        },
    },
    services::{
        file_store::{FileStore, FileStoreError},
        product_store::{ProductStore, RecordStoreError},
    },
    validation::{FieldError, validate_photo, validate_product},
};

/// Logical directory product photos are stored under.
pub const PRODUCT_PHOTO_DIR: &str = "products";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("route id {path_id} does not match body id {body_id}")]
    IdMismatch { path_id: i64, body_id: i64 },
    #[error("product {0} not found")]
    NotFound(i64),
    #[error("product {0} was modified concurrently")]
    Conflict(i64),
    #[error("photo storage failed: {0}")]
    Storage(#[from] FileStoreError),
    #[error(transparent)]
    Record(sqlx::Error),
}

impl From<RecordStoreError> for CatalogError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::Conflict { id, .. } => CatalogError::Conflict(id),
            RecordStoreError::OutOfRange { field } => CatalogError::Validation(vec![
                FieldError::new(field, "amount is out of range"),
            ]),
            RecordStoreError::Sqlx(err) => CatalogError::Record(err),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Clone)]
pub struct ProductCatalogService {
    records: Arc<dyn ProductStore>,
    files: Arc<dyn FileStore>,
    max_photo_bytes: usize,
}

impl ProductCatalogService {
    pub fn new(
        records: Arc<dyn ProductStore>,
        files: Arc<dyn FileStore>,
        max_photo_bytes: usize,
    ) -> Self {
        Self {
            records,
            files,
            max_photo_bytes,
        }
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> CatalogResult<Vec<ProductView>> {
        let products = self.records.list(filter).await?;
        Ok(products.iter().map(|p| self.view(p)).collect())
    }

    pub async fn get_product(&self, id: i64) -> CatalogResult<ProductView> {
        let product = self.load(id).await?;
        Ok(self.view(&product))
    }

    /// Create a product, storing its photo first when one is supplied.
    ///
    /// A failed photo save aborts before any record exists. A failed insert
    /// after a successful save leaves the file orphaned.
    pub async fn create_product(&self, input: ProductCreateInput) -> CatalogResult<ProductView> {
        let photo = input.photo.filter(|p| !p.is_empty());
        let errors = self.check_input(&input.fields, photo.as_ref());
        if !errors.is_empty() {
            return Err(CatalogError::Validation(errors));
        }
        self.ensure_category(input.fields.category_id).await?;

        let photo_path = match &photo {
            Some(photo) => Some(self.store_photo(photo).await?),
            None => None,
        };

        let product = match self
            .records
            .insert(&input.fields, photo_path.as_deref())
            .await
        {
            Ok(product) => product,
            Err(err) => {
                if let Some(path) = &photo_path {
                    warn!(path = %path, error = %err, "orphaned file: product insert failed");
                }
                return Err(err.into());
            }
        };

        info!(product_id = product.id, has_photo = photo_path.is_some(), "created product");
        Ok(self.view(&product))
    }

    /// Replace every editable field of product `id`, and its photo when a
    /// non-empty one is supplied.
    ///
    /// The old photo is deleted as soon as the new one is stored, before the
    /// record is written. If that write then fails the old photo is gone.
    pub async fn update_product(
        &self,
        id: i64,
        input: ProductUpdateInput,
    ) -> CatalogResult<ProductView> {
        if input.id != id {
            return Err(CatalogError::IdMismatch {
                path_id: id,
                body_id: input.id,
            });
        }

        let photo = input.photo.filter(|p| !p.is_empty());
        let mut errors = self.check_input(&input.fields, photo.as_ref());
        let expected_version = match input.row_version.as_deref() {
            Some(token) => {
                let decoded = decode_row_version(token);
                if decoded.is_none() {
                    errors.push(FieldError::new("rowVersion", "row version is malformed"));
                }
                decoded
            }
            None => None,
        };
        if !errors.is_empty() {
            return Err(CatalogError::Validation(errors));
        }

        let mut product = self.load(id).await?;
        if let Some(expected) = expected_version {
            if expected != product.version {
                debug!(product_id = id, expected, actual = product.version, "stale row version");
                return Err(CatalogError::Conflict(id));
            }
        }
        self.ensure_category(input.fields.category_id).await?;

        product.apply(input.fields);

        if let Some(photo) = &photo {
            let new_path = self.store_photo(photo).await?;
            if let Some(old_path) = product.photo_path.replace(new_path) {
                self.discard_file(&old_path, "superseded by a new photo").await;
            }
        }

        match self.records.update(&product).await {
            Ok(updated) => {
                info!(product_id = id, version = updated.version, "updated product");
                Ok(self.view(&updated))
            }
            Err(err) => {
                if photo.is_some() {
                    if let Some(path) = &product.photo_path {
                        warn!(path = %path, product_id = id, error = %err, "orphaned file: product update failed");
                    }
                }
                match err {
                    RecordStoreError::Conflict { .. } => {
                        if self.records.exists(id).await? {
                            Err(CatalogError::Conflict(id))
                        } else {
                            Err(CatalogError::NotFound(id))
                        }
                    }
                    err => Err(err.into()),
                }
            }
        }
    }

    /// Delete product `id` and, best-effort, its photo.
    pub async fn delete_product(&self, id: i64) -> CatalogResult<()> {
        let product = self.load(id).await?;

        if let Some(path) = product.photo_path.as_deref().filter(|p| !p.is_empty()) {
            self.discard_file(path, "product deleted").await;
        }

        if !self.records.delete(id).await? {
            return Err(CatalogError::NotFound(id));
        }

        info!(product_id = id, "deleted product");
        Ok(())
    }

    pub async fn list_categories(&self) -> CatalogResult<Vec<Category>> {
        Ok(self.records.list_categories().await?)
    }

    /// Categories plus featured products, as the storefront landing page shows them.
    pub async fn storefront_home(&self) -> CatalogResult<StorefrontHome> {
        let categories = self.list_categories().await?;
        let featured_products = self
            .list_products(&ProductFilter {
                category_id: None,
                featured_only: true,
            })
            .await?;
        Ok(StorefrontHome {
            categories,
            featured_products,
        })
    }

    fn view(&self, product: &Product) -> ProductView {
        ProductView::from_product(product, self.files.as_ref())
    }

    async fn load(&self, id: i64) -> CatalogResult<Product> {
        self.records
            .find_by_id(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    fn check_input(&self, fields: &ProductFields, photo: Option<&PhotoUpload>) -> Vec<FieldError> {
        let mut errors = validate_product(fields);
        if let Some(err) = photo.and_then(|p| validate_photo(p, self.max_photo_bytes)) {
            errors.push(err);
        }
        errors
    }

    async fn ensure_category(&self, category_id: i64) -> CatalogResult<()> {
        if self.records.category_exists(category_id).await? {
            Ok(())
        } else {
            Err(CatalogError::Validation(vec![FieldError::new(
                "categoryId",
                format!("category {} does not exist", category_id),
            )]))
        }
    }

    async fn store_photo(&self, photo: &PhotoUpload) -> CatalogResult<String> {
        let extension = photo.extension();
        let path = self
            .files
            .save(photo.bytes.clone(), PRODUCT_PHOTO_DIR, extension.as_deref())
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to store product photo");
                CatalogError::Storage(err)
            })?;
        Ok(path)
    }

    async fn discard_file(&self, path: &str, reason: &str) {
        if let Err(err) = self.files.delete(path).await {
            warn!(path = %path, reason, error = %err, "orphaned file: cleanup failed");
        }
    }
}
