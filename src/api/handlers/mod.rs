pub mod dormitories;
pub mod fleet;
pub mod health;
pub mod scrape;

use axum::extract::rejection::JsonRejection;
use std::sync::Arc;

use crate::{
    collector::Collector,
    error::{AppError, Result},
    registry::{Dormitory, DormitoryRegistry},
    store::SnapshotStore,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DormitoryRegistry>,
    pub store: Arc<SnapshotStore>,
    pub collector: Arc<Collector>,
    pub low_balance_threshold: f64,
}

impl AppState {
    fn dormitory(&self, id: &str) -> Result<Dormitory> {
        self.registry
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Dormitory {} not found", id)))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
