use crate::{OptionsStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Options held in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryOptionsStore {
    values: RwLock<HashMap<String, Value>>,
}

impl InMemoryOptionsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OptionsStore for InMemoryOptionsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}
