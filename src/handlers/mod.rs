pub mod category_handlers;
pub mod file_handlers;
pub mod health_handlers;
pub mod product_handlers;
