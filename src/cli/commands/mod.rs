//! CLI command implementations.

pub mod check;
pub mod config;
pub mod plan;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::models::IntakeDocument;
use crate::services::TripRecordStore;

/// Read an intake document. YAML and JSON are both accepted.
pub fn load_intake(path: &Path) -> Result<IntakeDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read intake record {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse intake record {}", path.display()))
}

/// Fresh store with the intake document replayed into it.
pub async fn intake_store(path: &Path) -> Result<Arc<TripRecordStore>> {
    let document = load_intake(path)?;
    let store = TripRecordStore::new();
    store
        .apply_intake(document)
        .await
        .context("Failed to apply intake record")?;
    Ok(Arc::new(store))
}
