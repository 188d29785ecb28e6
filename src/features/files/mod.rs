pub mod dtos;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod workers;

pub use routes::{routes, FileState};
pub use services::ShareService;
