use persistence::PersistedSnapshot;
use state::{LayerName, StateStore, key};

use crate::url_sync::UrlOverrides;

/// Fills whatever the URL did not supply from the saved snapshot.
pub struct BootstrapMerger;

impl BootstrapMerger {
    /// Returns whether any field was taken from the snapshot.
    pub fn apply(
        store: &StateStore,
        overrides: &UrlOverrides,
        snapshot: Option<&PersistedSnapshot>,
    ) -> bool {
        let Some(snap) = snapshot else {
            return false;
        };
        let mut applied: Vec<&str> = Vec::new();

        if !overrides.timestamp && !snap.is_realtime {
            store.set_current_time(snap.current_time);
            applied.push("timestamp");
        }

        if let Some(lon) = snap.lon.filter(|_| !overrides.lon) {
            store.set::<key::Lon>(lon);
            applied.push("lon");
        }
        if let Some(lat) = snap.lat.filter(|_| !overrides.lat) {
            store.set::<key::Lat>(lat);
            applied.push("lat");
        }
        if let Some(zoom) = snap.zoom.filter(|_| !overrides.zoom) {
            store.set::<key::Zoom>(zoom);
            applied.push("zoom");
        }

        for layer in LayerName::ALL {
            if overrides.has_layer(layer) {
                continue;
            }
            if let Some(&visible) = snap.stored_layers.get(layer.as_str()) {
                store.set_layer_visibility(layer.as_str(), visible);
                applied.push(layer.as_str());
            }
        }

        if !overrides.rwis_label {
            if let Some(label) = &snap.rwis_label {
                store.set_rwis_label(Some(label.clone()));
                applied.push("rwisobs_label");
            }
        }

        // Never URL-supplied.
        if snap.active_phenomena != store.get_active_phenomena() {
            store.set::<key::ActivePhenomena>(snap.active_phenomena.clone());
            applied.push("activePhenomena");
        }
        if let Some(base) = &snap.base_layer {
            if *base != store.get::<key::BaseLayer>() {
                store.set_base_layer(base.clone());
                applied.push("baseLayer");
            }
        }

        tracing::debug!(?applied, "applied saved state");
        !applied.is_empty()
    }
}
