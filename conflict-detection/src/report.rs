//! Conflict reports and the persisted map of unregistered clients.

use crate::errors::ConflictDetectionError;
use indexmap::IndexMap;
use options_store::{OptionsStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNREGISTERED_CLIENTS_KEY: &str = "font-awesome-unregistered-clients";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Script,
    Style,
}

/// A script or style found on a page that was not loaded by Font Awesome
/// itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub src: String,
    /// Whatever else the detector sent along, stored as is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn new<S: Into<String>>(resource_type: ResourceType, src: S) -> Self {
        ResourceDescriptor {
            resource_type,
            src: src.into(),
            extra: Map::new(),
        }
    }
}

/// Client identifier to descriptor, in the order clients were first seen.
pub type UnregisteredClients = IndexMap<String, ResourceDescriptor>;

/// Decodes a report body. An empty JSON array is accepted as an empty report
/// since some encoders cannot tell an empty map from an empty list.
pub fn decode_report(raw: &[u8]) -> Result<UnregisteredClients, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    clients_from_value(value)
}

/// Merges `report` into `current`. Reported clients replace existing entries
/// with the same identifier; everything else in `current` is kept.
pub fn merge_report(current: &mut UnregisteredClients, report: UnregisteredClients) {
    current.extend(report);
}

pub async fn load_unregistered_clients(
    store: &dyn OptionsStore,
) -> Result<UnregisteredClients, ConflictDetectionError> {
    match store.get(UNREGISTERED_CLIENTS_KEY).await? {
        None | Some(Value::Null) => Ok(UnregisteredClients::new()),
        Some(value) => {
            clients_from_value(value).map_err(|err| ConflictDetectionError::MalformedOption {
                key: UNREGISTERED_CLIENTS_KEY,
                reason: err.to_string(),
            })
        }
    }
}

pub async fn save_unregistered_clients(
    store: &dyn OptionsStore,
    clients: &UnregisteredClients,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(clients)?;
    store.set(UNREGISTERED_CLIENTS_KEY, value).await
}

fn clients_from_value(value: Value) -> Result<UnregisteredClients, serde_json::Error> {
    match value {
        Value::Array(items) if items.is_empty() => Ok(UnregisteredClients::new()),
        other => serde_json::from_value(other),
    }
}
