use std::{any::Any, collections::HashMap};

use thiserror::Error;

/// Data a plugin stores in [`CycleState`].
///
/// The framework may clone the whole cycle state, so every value has to be
/// able to duplicate itself without exposing its concrete type.
pub trait StateData: Any + Send + Sync {
    fn clone_state(&self) -> Box<dyn StateData>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("key {0:?} not found in cycle state")]
    NotFound(String),
    #[error("value stored under key {0:?} has an unexpected type")]
    WrongType(String),
}

/// Scratch space scoped to one scheduling cycle.
///
/// Plugins use it to pass data from one extension point to a later one
/// within the same cycle.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn StateData>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<T: StateData>(&self, key: &str) -> Result<&T, ReadError> {
        let value = self
            .storage
            .get(key)
            .ok_or_else(|| ReadError::NotFound(key.to_string()))?;
        let any: &dyn Any = &**value;
        any.downcast_ref::<T>()
            .ok_or_else(|| ReadError::WrongType(key.to_string()))
    }

    pub fn write(&mut self, key: &str, value: Box<dyn StateData>) {
        self.storage.insert(key.to_string(), value);
    }

    pub fn delete(&mut self, key: &str) {
        self.storage.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        Self {
            storage: self
                .storage
                .iter()
                .map(|(k, v)| (k.clone(), v.clone_state()))
                .collect(),
        }
    }
}
