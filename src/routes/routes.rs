//! Defines routes for the catalog API.
//!
//! ## Structure
//! - **Products**
//!   - `GET    /api/products`: list (supports `categoryId`, `featured`)
//!   - `GET    /api/products/featured`: featured products
//!   - `GET    /api/products/category/{category_id}`: products of one category
//!   - `GET    /api/products/{id}`: one product
//!   - `POST   /api/products`: create (multipart)
//!   - `PUT    /api/products/{id}`: full update (multipart)
//!   - `DELETE /api/products/{id}`: delete product and photo
//!
//! - **Storefront**
//!   - `GET    /api/categories`
//!   - `GET    /api/storefront`: categories + featured products
//!
//! - **Files**
//!   - `GET    /files/{*path}`: stored photos, nested paths like `products/0a/1b/x.jpg`

use crate::{
    handlers::{
        category_handlers::{list_categories, storefront_home},
        file_handlers::get_file,
        health_handlers::{healthz, readyz},
        product_handlers::{
            create_product, delete_product, get_product, list_by_category, list_featured,
            list_products, update_product,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for the text parts and multipart framing on top of the photo itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the router. Request bodies are capped just above `max_photo_bytes`
/// so oversized uploads are refused before they are buffered.
pub fn routes(max_photo_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Product routes
        .route("/api/products", post(create_product).get(list_products))
        .route("/api/products/featured", get(list_featured))
        .route("/api/products/category/{category_id}", get(list_by_category))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        // Storefront routes
        .route("/api/categories", get(list_categories))
        .route("/api/storefront", get(storefront_home))
        // Stored photos
        .route("/files/{*path}", get(get_file))
        .layer(DefaultBodyLimit::max(
            max_photo_bytes.saturating_add(FORM_OVERHEAD_BYTES),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{memory_pool, seed_category},
        services::{
            catalog_service::ProductCatalogService,
            file_store::{DiskFileStore, tests::temp_dir},
            product_store::SqliteProductStore,
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const MAX_PHOTO: usize = 1024;
    const BOUNDARY: &str = "catalog-form-boundary";
    const PUBLIC_BASE: &str = "http://shop.test";

    async fn app() -> (Router, i64) {
        let db = Arc::new(memory_pool().await);
        let category_id = seed_category(&db, "Gadgets").await;
        let files = Arc::new(DiskFileStore::new(temp_dir(), PUBLIC_BASE));
        let records = Arc::new(SqliteProductStore::new(db.clone()));
        let state = AppState {
            catalog: ProductCatalogService::new(records, files.clone(), MAX_PHOTO),
            db,
            files,
        };
        (routes(MAX_PHOTO).with_state(state), category_id)
    }

    /// `multipart/form-data` body with text parts and an optional `photo` part.
    fn form_body(fields: &[(&str, String)], photo: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = photo {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; \
                     filename=\"shot.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn widget(category_id: i64) -> Vec<(&'static str, String)> {
        vec![
            ("categoryId", category_id.to_string()),
            ("name", "Widget".into()),
            ("quantity", "5".into()),
            ("costValue", "3.00".into()),
            ("saleValue", "9,99".into()),
        ]
    }

    async fn send_form(app: &Router, method: Method, uri: &str, body: Vec<u8>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn send(app: &Router, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_returns_location_and_serves_the_photo() {
        let (app, category_id) = app().await;

        let response = send_form(
            &app,
            Method::POST,
            "/api/products",
            form_body(&widget(category_id), Some(b"png-bytes")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/api/products/1");

        let created = json(response).await;
        assert_eq!(created["id"], 1);
        assert_eq!(created["name"], "Widget");
        assert_eq!(created["saleValue"], serde_json::json!(9.99));
        assert_eq!(created["categoryName"], "Gadgets");

        let photo_url = created["photo"].as_str().unwrap();
        let file_uri = photo_url.strip_prefix(PUBLIC_BASE).unwrap();
        assert!(file_uri.starts_with("/files/products/"));

        let response = send(&app, Method::GET, file_uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"png-bytes");
    }

    #[tokio::test]
    async fn featured_route_is_not_taken_for_an_id() {
        let (app, category_id) = app().await;
        send_form(&app, Method::POST, "/api/products", form_body(&widget(category_id), None)).await;
        let mut featured = widget(category_id);
        featured.push(("featured", "on".into()));
        send_form(&app, Method::POST, "/api/products", form_body(&featured, None)).await;

        let response = send(&app, Method::GET, "/api/products/featured").await;
        assert_eq!(response.status(), StatusCode::OK);
        let products = json(response).await;
        let ids: Vec<i64> = products
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2]);

        let response = send(&app, Method::GET, &format!("/api/products/category/{category_id}")).await;
        assert_eq!(json(response).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_errors_map_to_statuses() {
        let (app, category_id) = app().await;
        let response =
            send_form(&app, Method::POST, "/api/products", form_body(&widget(category_id), None)).await;
        let created = json(response).await;
        let token = created["rowVersion"].as_str().unwrap().to_string();

        let mut mismatched = widget(category_id);
        mismatched.push(("id", "2".into()));
        let response =
            send_form(&app, Method::PUT, "/api/products/1", form_body(&mismatched, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert!(body["error"].as_str().unwrap().contains("does not match"));

        let mut oversized = widget(category_id);
        oversized.push(("id", "1".into()));
        let big = vec![0u8; MAX_PHOTO + 1];
        let response =
            send_form(&app, Method::PUT, "/api/products/1", form_body(&oversized, Some(&big))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["fields"][0]["field"], "photo");

        let mut versioned = widget(category_id);
        versioned.push(("id", "1".into()));
        versioned.push(("rowVersion", token));
        let response = send_form(
            &app,
            Method::PUT,
            "/api/products/1",
            form_body(&versioned, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            send_form(&app, Method::PUT, "/api/products/1", form_body(&versioned, None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_fields_are_reported_together() {
        let (app, _) = app().await;
        let response = send_form(
            &app,
            Method::POST,
            "/api/products",
            form_body(&[("quantity", "x".into())], None),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        let fields: Vec<&str> = body["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["categoryId", "name", "quantity", "costValue", "saleValue"]);
    }

    #[tokio::test]
    async fn delete_is_no_content_then_not_found() {
        let (app, category_id) = app().await;
        send_form(
            &app,
            Method::POST,
            "/api/products",
            form_body(&widget(category_id), Some(b"png-bytes")),
        )
        .await;

        assert_eq!(
            send(&app, Method::DELETE, "/api/products/1").await.status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            send(&app, Method::DELETE, "/api/products/1").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&app, Method::GET, "/api/products/1").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
