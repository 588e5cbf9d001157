//! REST surface over [`FamilyService`](crate::service::FamilyService).

pub mod http;
pub mod render;

pub use http::{router, HttpServer};
pub use render::ApiError;
