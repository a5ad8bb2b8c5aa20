//! Sources of the locations that need weather coverage.

use crate::{error::StoreError, model::Location};

/// Read-only snapshot of known locations, re-read at the start of every tick.
pub trait LocationRegistry: Send + Sync {
    fn list_locations(&self) -> Result<Vec<Location>, StoreError>;
}

/// Registry backed by a fixed list, usually the `[[locations]]` config table.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    locations: Vec<Location>,
}

impl StaticRegistry {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl LocationRegistry for StaticRegistry {
    fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        Ok(self.locations.clone())
    }
}
