pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod import;
pub mod service;

pub use config::Config;
pub use error::{FamilyTreeError, Result};
pub use service::FamilyService;
