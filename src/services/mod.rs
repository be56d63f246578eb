pub mod catalog_service;
pub mod file_store;
pub mod product_store;
