//! src/services/product_store.rs
//!
//! Relational persistence for products. `ProductStore` is the seam the
//! catalog service depends on; `SqliteProductStore` implements it on SQLite
//! with a `version` column as the optimistic concurrency token.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    category::Category,
    product::{Product, ProductFields, ProductFilter, ProductRow, to_cents},
};

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("product {id} was changed by someone else (expected version {expected})")]
    Conflict { id: i64, expected: i64 },
    #[error("{field} does not fit in the money column")]
    OutOfRange { field: &'static str },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RecordResult<T> = Result<T, RecordStoreError>;

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RecordResult<Option<Product>>;

    async fn list(&self, filter: &ProductFilter) -> RecordResult<Vec<Product>>;

    /// Insert a new product and return it with its assigned id.
    async fn insert(
        &self,
        fields: &ProductFields,
        photo_path: Option<&str>,
    ) -> RecordResult<Product>;

    /// Write every mutable column of `product`, guarded by `product.version`.
    ///
    /// Returns `Conflict` when no row with that id and version exists, which
    /// covers both a stale token and a concurrently deleted row.
    async fn update(&self, product: &Product) -> RecordResult<Product>;

    /// Delete by id; `false` when nothing was deleted.
    async fn delete(&self, id: i64) -> RecordResult<bool>;

    async fn exists(&self, id: i64) -> RecordResult<bool>;

    async fn category_exists(&self, id: i64) -> RecordResult<bool>;

    async fn list_categories(&self) -> RecordResult<Vec<Category>>;
}

const PRODUCT_SELECT: &str = "SELECT p.id, p.category_id, p.name, p.description, p.quantity, \
     p.cost_cents, p.sale_cents, p.featured, p.photo_path, p.version, \
     p.created_at, p.updated_at, c.name AS category_name \
     FROM products p LEFT JOIN categories c ON c.id = p.category_id";

#[derive(Clone)]
pub struct SqliteProductStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteProductStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

fn cents(value: Decimal, field: &'static str) -> RecordResult<i64> {
    to_cents(value).ok_or(RecordStoreError::OutOfRange { field })
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn find_by_id(&self, id: i64) -> RecordResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{} WHERE p.id = ?", PRODUCT_SELECT))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn list(&self, filter: &ProductFilter) -> RecordResult<Vec<Product>> {
        let mut builder = QueryBuilder::<Sqlite>::new(PRODUCT_SELECT);
        builder.push(" WHERE 1 = 1");

        if let Some(category_id) = filter.category_id {
            builder.push(" AND p.category_id = ");
            builder.push_bind(category_id);
        }
        if filter.featured_only {
            builder.push(" AND p.featured = 1");
        }
        builder.push(" ORDER BY p.id ASC");

        let rows: Vec<ProductRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert(
        &self,
        fields: &ProductFields,
        photo_path: Option<&str>,
    ) -> RecordResult<Product> {
        let cost_cents = cents(fields.cost_value, "costValue")?;
        let sale_cents = cents(fields.sale_value, "saleValue")?;
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO products (
                category_id, name, description, quantity, cost_cents, sale_cents,
                featured, photo_path, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING id
            "#,
        )
        .bind(fields.category_id)
        .bind(&fields.name)
        .bind(fields.description.as_deref())
        .bind(fields.quantity)
        .bind(cost_cents)
        .bind(sale_cents)
        .bind(fields.featured)
        .bind(photo_path)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        // Reload to pick up the joined category name.
        self.find_by_id(id)
            .await?
            .ok_or(RecordStoreError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn update(&self, product: &Product) -> RecordResult<Product> {
        let cost_cents = cents(product.cost_value, "costValue")?;
        let sale_cents = cents(product.sale_value, "saleValue")?;
        let result = sqlx::query(
            r#"
            UPDATE products SET
                category_id = ?, name = ?, description = ?, quantity = ?,
                cost_cents = ?, sale_cents = ?, featured = ?, photo_path = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(product.category_id)
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.quantity)
        .bind(cost_cents)
        .bind(sale_cents)
        .bind(product.featured)
        .bind(product.photo_path.as_deref())
        .bind(Utc::now())
        .bind(product.id)
        .bind(product.version)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RecordStoreError::Conflict {
                id: product.id,
                expected: product.version,
            });
        }

        // The row can vanish between the update and this read.
        self.find_by_id(product.id)
            .await?
            .ok_or(RecordStoreError::Conflict {
                id: product.id,
                expected: product.version + 1,
            })
    }

    async fn delete(&self, id: i64) -> RecordResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: i64) -> RecordResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn category_exists(&self, id: i64) -> RecordResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn list_categories(&self) -> RecordResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name ASC")
                .fetch_all(&*self.db)
                .await?;
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, seed_category};
    use std::str::FromStr;

    fn fields(category_id: i64, name: &str, featured: bool) -> ProductFields {
        ProductFields {
            category_id,
            name: name.into(),
            description: Some("desc".into()),
            quantity: 3,
            cost_value: Decimal::from_str("1.50").unwrap(),
            sale_value: Decimal::from_str("4.25").unwrap(),
            featured,
        }
    }

    async fn store() -> (SqliteProductStore, i64, i64) {
        let pool = memory_pool().await;
        let consoles = seed_category(&pool, "Consoles").await;
        let games = seed_category(&pool, "Games").await;
        (SqliteProductStore::new(Arc::new(pool)), consoles, games)
    }

    #[tokio::test]
    async fn insert_assigns_id_and_joins_category() {
        let (store, consoles, _) = store().await;
        let product = store
            .insert(&fields(consoles, "Console X", false), Some("products/aa/bb/x.png"))
            .await
            .unwrap();

        assert!(product.id > 0);
        assert_eq!(product.version, 1);
        assert_eq!(product.category_name.as_deref(), Some("Consoles"));
        assert_eq!(product.cost_value, Decimal::from_str("1.50").unwrap());
        assert_eq!(product.photo_path.as_deref(), Some("products/aa/bb/x.png"));

        let loaded = store.find_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(loaded, product);
    }

    #[tokio::test]
    async fn list_filters_by_category_and_featured() {
        let (store, consoles, games) = store().await;
        let a = store.insert(&fields(consoles, "A", true), None).await.unwrap();
        let b = store.insert(&fields(games, "B", false), None).await.unwrap();
        let c = store.insert(&fields(games, "C", true), None).await.unwrap();

        let ids = |products: Vec<Product>| products.into_iter().map(|p| p.id).collect::<Vec<_>>();

        let all = store.list(&ProductFilter::default()).await.unwrap();
        assert_eq!(ids(all), vec![a.id, b.id, c.id]);

        let by_category = ProductFilter {
            category_id: Some(games),
            featured_only: false,
        };
        assert_eq!(ids(store.list(&by_category).await.unwrap()), vec![b.id, c.id]);

        let featured = ProductFilter {
            category_id: None,
            featured_only: true,
        };
        assert_eq!(ids(store.list(&featured).await.unwrap()), vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_token() {
        let (store, consoles, _) = store().await;
        let original = store.insert(&fields(consoles, "A", false), None).await.unwrap();

        let mut first = original.clone();
        first.name = "A v2".into();
        let updated = store.update(&first).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.name, "A v2");

        let mut stale = original.clone();
        stale.name = "A stale".into();
        let err = store.update(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::Conflict { expected: 1, .. }
        ));

        let current = store.find_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(current.name, "A v2");
    }

    #[tokio::test]
    async fn money_that_overflows_cents_is_refused() {
        let (store, consoles, _) = store().await;
        let mut huge = fields(consoles, "A", false);
        huge.sale_value = Decimal::from_str("100000000000000000000").unwrap();

        let err = store.insert(&huge, None).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::OutOfRange { field: "saleValue" }));
        assert!(store.list(&ProductFilter::default()).await.unwrap().is_empty());

        let mut product = store.insert(&fields(consoles, "A", false), None).await.unwrap();
        product.cost_value = Decimal::MAX;
        let err = store.update(&product).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::OutOfRange { field: "costValue" }));
        assert_eq!(store.find_by_id(product.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let (store, consoles, _) = store().await;
        let product = store.insert(&fields(consoles, "A", false), None).await.unwrap();

        assert!(store.exists(product.id).await.unwrap());
        assert!(store.delete(product.id).await.unwrap());
        assert!(!store.delete(product.id).await.unwrap());
        assert!(!store.exists(product.id).await.unwrap());
    }

    #[tokio::test]
    async fn categories_are_listed_by_name() {
        let (store, consoles, games) = store().await;
        assert!(store.category_exists(games).await.unwrap());
        assert!(!store.category_exists(999).await.unwrap());

        let names: Vec<String> = store
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Consoles", "Games"]);
        assert!(consoles < games);
    }
}
