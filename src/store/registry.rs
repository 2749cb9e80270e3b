//! Ordered registry of attached stores

use std::sync::Arc;

use super::{StoreDriver, StoreKind};
use crate::error::{MuxError, MuxResult};
use crate::types::ActionName;

/// One attached store: its name, kind and driver
#[derive(Clone)]
pub struct StoreRegistration {
    pub name: String,
    pub kind: StoreKind,
    pub driver: Arc<dyn StoreDriver>,
}

impl std::fmt::Debug for StoreRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Holds the attached stores in registration order. Registration order is
/// the default execution order when no configuration overrides it.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: Vec<StoreRegistration>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a store. Registering a name twice replaces the driver but
    /// keeps the original position.
    pub fn register<S: Into<String>>(
        &mut self,
        name: S,
        kind: StoreKind,
        driver: Arc<dyn StoreDriver>,
    ) -> &mut Self {
        let name = name.into();
        match self.stores.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                existing.kind = kind;
                existing.driver = driver;
            }
            None => self.stores.push(StoreRegistration { name, kind, driver }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&StoreRegistration> {
        self.stores.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreRegistration> {
        self.stores.iter()
    }

    /// Resolve an execution order into concrete registrations. `None` means
    /// registration order; unknown store names are a configuration error,
    /// detected before any store runs.
    pub fn ordered(
        &self,
        execution_order: Option<&[String]>,
        action: ActionName,
    ) -> MuxResult<Vec<&StoreRegistration>> {
        match execution_order {
            None => Ok(self.stores.iter().collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    self.get(name).ok_or_else(|| MuxError::UnknownStore {
                        store: name.clone(),
                        action,
                    })
                })
                .collect(),
        }
    }
}
