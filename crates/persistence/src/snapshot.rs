use std::collections::{BTreeMap, BTreeSet};

use foundation::{Instant, format_iso, parse_iso};
use serde::Serialize;
use serde_json::{Map, Value};
use state::{DashboardState, LayerVisibility, default_phenomena};
use thiserror::Error;

use crate::storage::{SnapshotStorage, StorageError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Wire shape of the stored blob. Field order is fixed so repeated saves of
/// the same state are byte-identical.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot<'a> {
    latitude: f64,
    longitude: f64,
    zoom: f64,
    is_realtime: bool,
    current_time: Option<String>,
    active_phenomena: Vec<&'a str>,
    layer_visibility: &'a LayerVisibility,
    base_layer: &'a str,
    rwisobs_label: Option<&'a str>,
}

/// Encodes the persisted projection of `state`.
///
/// The time is written only while pinned; a live instant is stored as `null`.
pub fn encode_snapshot(state: &DashboardState) -> Result<String, serde_json::Error> {
    let stored = StoredSnapshot {
        latitude: state.lat,
        longitude: state.lon,
        zoom: state.zoom,
        is_realtime: state.is_realtime,
        current_time: (!state.is_realtime).then(|| format_iso(state.current_time)),
        active_phenomena: state.active_phenomena.iter().map(String::as_str).collect(),
        layer_visibility: &state.layer_visibility,
        base_layer: &state.base_layer,
        rwisobs_label: state.rwis_label.as_deref(),
    };
    serde_json::to_string(&stored)
}

/// A snapshot as read back at startup, normalized.
///
/// Fields that were absent or unusable in the stored blob are `None`, except
/// for the ones that always resolve to something usable: time mode, time,
/// phenomena and the merged visibility map.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSnapshot {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub zoom: Option<f64>,
    pub is_realtime: bool,
    /// "now" whenever `is_realtime` is true.
    pub current_time: Instant,
    pub active_phenomena: BTreeSet<String>,
    /// Stored entries merged over the layer defaults.
    pub layer_visibility: LayerVisibility,
    /// Only the entries actually present in the blob.
    pub stored_layers: BTreeMap<String, bool>,
    pub base_layer: Option<String>,
    pub rwis_label: Option<String>,
}

impl PersistedSnapshot {
    /// Lenient decode of a stored blob; `None` if it is not a JSON object.
    pub fn decode(raw: &str, now: Instant) -> Option<Self> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse saved state");
                return None;
            }
        };
        let Some(obj) = value.as_object() else {
            tracing::warn!("saved state is not a JSON object");
            return None;
        };
        Some(Self::from_object(obj, now))
    }

    fn from_object(obj: &Map<String, Value>, now: Instant) -> Self {
        let number = |name: &str| obj.get(name).and_then(Value::as_f64);

        let mut is_realtime = obj
            .get("isRealtime")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let mut current_time = now;
        if !is_realtime {
            match obj.get("currentTime").and_then(Value::as_str) {
                Some(raw) => match parse_iso(raw) {
                    Some(t) => current_time = t,
                    None => {
                        tracing::warn!(current_time = raw, "discarding invalid saved time; going live");
                        is_realtime = true;
                    }
                },
                None => {
                    tracing::debug!("saved state is pinned without a time; going live");
                    is_realtime = true;
                }
            }
        }

        let stored_layers: BTreeMap<String, bool> = obj
            .get("layerVisibility")
            .and_then(Value::as_object)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|(name, v)| v.as_bool().map(|b| (name.clone(), b)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            lat: number("latitude"),
            lon: number("longitude"),
            zoom: number("zoom"),
            is_realtime,
            current_time,
            active_phenomena: phenomena_or_default(obj.get("activePhenomena")),
            layer_visibility: LayerVisibility::merged_over_defaults(stored_layers.clone()),
            stored_layers,
            base_layer: non_empty_string(obj.get("baseLayer")),
            rwis_label: non_empty_string(obj.get("rwisobsLabel")),
        }
    }
}

fn phenomena_or_default(raw: Option<&Value>) -> BTreeSet<String> {
    let parsed = raw.and_then(Value::as_array).and_then(|items| {
        items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<BTreeSet<_>>>()
    });
    match parsed {
        Some(set) if !set.is_empty() => set,
        _ => default_phenomena(),
    }
}

fn non_empty_string(raw: Option<&Value>) -> Option<String> {
    raw.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reads and writes the session snapshot under one storage key.
pub struct StatePersistence {
    storage: Box<dyn SnapshotStorage>,
    key: String,
}

impl StatePersistence {
    pub fn new(storage: Box<dyn SnapshotStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes the snapshot and returns the JSON that was stored.
    pub fn save(&mut self, state: &DashboardState) -> Result<String, PersistError> {
        let raw = encode_snapshot(state)?;
        self.storage.write(&self.key, &raw)?;
        tracing::debug!(key = %self.key, bytes = raw.len(), "saved state");
        Ok(raw)
    }

    /// Never fails: unreadable storage and malformed blobs are logged and
    /// treated as "nothing saved".
    pub fn load(&self, now: Instant) -> Option<PersistedSnapshot> {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to read saved state");
                return None;
            }
        };
        if raw.trim().is_empty() {
            return None;
        }
        PersistedSnapshot::decode(&raw, now)
    }

    /// Removes the stored snapshot; returns whether one existed.
    pub fn clear(&mut self) -> Result<bool, PersistError> {
        Ok(self.storage.remove(&self.key)?)
    }
}
