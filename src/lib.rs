pub mod aggregation;
pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod locks;
pub mod models;
pub mod portal;
pub mod registry;
pub mod scheduler;
pub mod store;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use models::Snapshot;
pub use registry::{Dormitory, DormitoryRegistry};
