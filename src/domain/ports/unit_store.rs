//! Unit store port: read-only access to extracted units.

use crate::domain::error::Result;
use crate::domain::types::ExtractedUnit;
use async_trait::async_trait;

/// Read-only access to the extractor's output. The engine never writes
/// through this port; units are mutated only by extractor re-runs.
#[async_trait]
pub trait UnitStore: Send + Sync {
    async fn get(&self, identifier: &str) -> Result<Option<ExtractedUnit>>;
    async fn list_ids(&self) -> Result<Vec<String>>;
    async fn list_by_type(&self, unit_type: &str) -> Result<Vec<String>>;
}
