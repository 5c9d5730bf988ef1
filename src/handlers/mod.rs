pub mod bucket_handlers;
pub mod directory_handlers;
pub mod download_handlers;
pub mod file_handlers;
pub mod health_handlers;
