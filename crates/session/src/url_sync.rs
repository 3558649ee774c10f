use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use foundation::{Instant, format_url_timestamp, parse_url_timestamp};
use state::{LayerName, LayerVisibility, StateStore, key};

use crate::location::UrlLocation;
use crate::query::QueryParams;

pub const TIMESTAMP_PARAM: &str = "timestamp";
pub const LON_PARAM: &str = "lon";
pub const LAT_PARAM: &str = "lat";
pub const ZOOM_PARAM: &str = "zoom";
pub const RWIS_LABEL_PARAM: &str = "rwisobs_label";

/// Which fields the initial URL supplied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UrlOverrides {
    pub timestamp: bool,
    /// Set when the param is present and non-empty, even if the view as a
    /// whole was not applied.
    pub lon: bool,
    pub lat: bool,
    pub zoom: bool,
    pub layers: BTreeSet<LayerName>,
    pub rwis_label: bool,
}

impl UrlOverrides {
    pub fn has_layer(&self, layer: LayerName) -> bool {
        self.layers.contains(&layer)
    }

    pub fn is_empty(&self) -> bool {
        !self.timestamp
            && !self.lon
            && !self.lat
            && !self.zoom
            && self.layers.is_empty()
            && !self.rwis_label
    }
}

/// Mirrors the store into the query string and reads the initial query.
pub struct UrlSynchronizer {
    store: Rc<StateStore>,
    location: Rc<dyn UrlLocation>,
}

impl UrlSynchronizer {
    pub fn new(store: Rc<StateStore>, location: Rc<dyn UrlLocation>) -> Self {
        Self { store, location }
    }

    /// Applies the startup query to the store. Call once, before [`install`].
    ///
    /// [`install`]: UrlSynchronizer::install
    pub fn apply_initial(&self) -> UrlOverrides {
        let params = QueryParams::parse(&self.location.search());
        let mut overrides = UrlOverrides::default();

        if let Some(raw) = params.get(TIMESTAMP_PARAM) {
            match parse_url_timestamp(raw) {
                Some(t) => {
                    self.store.set_current_time(t);
                    overrides.timestamp = true;
                }
                None => tracing::warn!(timestamp = raw, "ignoring malformed URL timestamp"),
            }
        }

        let present = |name: &str| params.get(name).is_some_and(|raw| !raw.is_empty());
        overrides.lon = present(LON_PARAM);
        overrides.lat = present(LAT_PARAM);
        overrides.zoom = present(ZOOM_PARAM);

        // The view is applied only as a complete group.
        let coord = |name: &str| {
            params
                .get(name)
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        match (coord(LON_PARAM), coord(LAT_PARAM), coord(ZOOM_PARAM)) {
            (Some(lon), Some(lat), Some(zoom)) => self.store.set_view(lon, lat, zoom),
            (None, None, None) => {}
            _ => tracing::debug!("ignoring partial lon/lat/zoom in URL"),
        }

        for layer in LayerName::ALL {
            if let Some(raw) = params.get(layer.as_str()) {
                self.store
                    .set_layer_visibility(layer.as_str(), raw == "1" || raw == "true");
                overrides.layers.insert(layer);
            }
        }

        if let Some(label) = params.get(RWIS_LABEL_PARAM).filter(|s| !s.is_empty()) {
            self.store.set_rwis_label(Some(label.to_string()));
            overrides.rwis_label = true;
        }

        tracing::debug!(?overrides, "applied initial URL");
        overrides
    }

    /// Writes every mirrored parameter from the current state in one replacement.
    pub fn resync_all(&self) {
        let state = self.store.snapshot();
        rewrite(self.location.as_ref(), |params| {
            write_timestamp(params, state.is_realtime, state.current_time);
            params.set(LON_PARAM, format_coord(state.lon));
            params.set(LAT_PARAM, format_coord(state.lat));
            params.set(ZOOM_PARAM, state.zoom.to_string());
            write_layers(params, &state.layer_visibility);
            write_rwis_label(params, state.rwis_label.as_deref());
        });
    }

    /// Registers the subscriptions that keep the URL in step with the store.
    pub fn install(&self) {
        let store = &self.store;

        let (weak, loc) = self.handles();
        store.subscribe::<key::CurrentTime>(move |t| {
            if let Some(store) = weak.upgrade() {
                let live = store.get_is_realtime();
                rewrite(loc.as_ref(), |p| write_timestamp(p, live, *t));
            }
        });

        let (weak, loc) = self.handles();
        store.subscribe::<key::IsRealtime>(move |live| {
            if let Some(store) = weak.upgrade() {
                let t = store.get_current_time();
                rewrite(loc.as_ref(), |p| write_timestamp(p, *live, t));
            }
        });

        let (_, loc) = self.handles();
        store.subscribe::<key::Lon>(move |lon| {
            rewrite(loc.as_ref(), |p| p.set(LON_PARAM, format_coord(*lon)));
        });

        let (_, loc) = self.handles();
        store.subscribe::<key::Lat>(move |lat| {
            rewrite(loc.as_ref(), |p| p.set(LAT_PARAM, format_coord(*lat)));
        });

        let (_, loc) = self.handles();
        store.subscribe::<key::Zoom>(move |zoom| {
            rewrite(loc.as_ref(), |p| p.set(ZOOM_PARAM, zoom.to_string()));
        });

        let (_, loc) = self.handles();
        store.subscribe::<key::RwisLabel>(move |label| {
            rewrite(loc.as_ref(), |p| write_rwis_label(p, label.as_deref()));
        });

        let (_, loc) = self.handles();
        store.subscribe::<key::LayerVisibility>(move |layers| {
            rewrite(loc.as_ref(), |p| write_layers(p, layers));
        });
    }

    pub fn location(&self) -> &Rc<dyn UrlLocation> {
        &self.location
    }

    fn handles(&self) -> (Weak<StateStore>, Rc<dyn UrlLocation>) {
        (Rc::downgrade(&self.store), Rc::clone(&self.location))
    }
}

/// Applies `edit` to the current query; replaces the URL only if it changed.
fn rewrite(location: &dyn UrlLocation, edit: impl FnOnce(&mut QueryParams)) {
    let before = QueryParams::parse(&location.search());
    let mut after = before.clone();
    edit(&mut after);
    if after != before {
        let query = after.to_query_string();
        tracing::debug!(query = %query, "rewriting URL");
        location.replace_query(&query);
    }
}

fn write_timestamp(params: &mut QueryParams, live: bool, t: Instant) {
    if live {
        params.delete(TIMESTAMP_PARAM);
    } else {
        params.set(TIMESTAMP_PARAM, format_url_timestamp(t));
    }
}

fn format_coord(v: f64) -> String {
    format!("{v:.4}")
}

/// Layers at their default visibility are left out of the URL.
fn write_layers(params: &mut QueryParams, layers: &LayerVisibility) {
    for layer in LayerName::ALL {
        let visible = layers.is_visible(layer.as_str());
        if visible == layer.default_visible() {
            params.delete(layer.as_str());
        } else {
            params.set(layer.as_str(), if visible { "1" } else { "0" });
        }
    }
}

fn write_rwis_label(params: &mut QueryParams, label: Option<&str>) {
    match label {
        Some(label) => params.set(RWIS_LABEL_PARAM, label),
        None => params.delete(RWIS_LABEL_PARAM),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::InMemoryLocation;
    use chrono::{Duration, TimeZone, Utc};
    use foundation::ManualClock;
    use pretty_assertions::assert_eq;
    use state::DashboardConfig;

    struct Rig {
        clock: Rc<ManualClock>,
        store: Rc<StateStore>,
        loc: Rc<InMemoryLocation>,
        sync: UrlSynchronizer,
    }

    fn rig(search: &str) -> Rig {
        let clock = Rc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 15, 0, 0).unwrap(),
        ));
        let store = Rc::new(StateStore::new(&DashboardConfig::default(), clock.clone()));
        let loc = Rc::new(InMemoryLocation::new(search));
        let sync = UrlSynchronizer::new(Rc::clone(&store), loc.clone());
        Rig {
            clock,
            store,
            loc,
            sync,
        }
    }

    #[test]
    fn timestamp_param_pins_time() {
        let r = rig("?timestamp=202501011230");
        let overrides = r.sync.apply_initial();
        assert!(overrides.timestamp);
        assert_eq!(
            r.store.get_current_time(),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap()
        );
        assert!(!r.store.get_is_realtime());
    }

    #[test]
    fn malformed_timestamp_is_not_supplied() {
        let r = rig("?timestamp=2025010112");
        let overrides = r.sync.apply_initial();
        assert!(!overrides.timestamp);
        assert!(r.store.get_is_realtime());
    }

    #[test]
    fn view_applies_only_as_a_group() {
        let r = rig("?lon=-93.5&lat=42.0&zoom=");
        let overrides = r.sync.apply_initial();
        assert!(overrides.lon && overrides.lat);
        assert!(!overrides.zoom);
        assert_eq!(r.store.get::<key::Lon>(), -98.5795);
        assert_eq!(r.store.get::<key::Lat>(), 39.8283);

        let r = rig("?lon=-93.5&lat=42.0&zoom=9");
        let overrides = r.sync.apply_initial();
        assert!(overrides.lon && overrides.lat && overrides.zoom);
        assert_eq!(r.store.get::<key::Lon>(), -93.5);
        assert_eq!(r.store.get::<key::Lat>(), 42.0);
        assert_eq!(r.store.get::<key::Zoom>(), 9.0);
    }

    #[test]
    fn layer_params_and_label() {
        let r = rig("?rwisobs=1&radar=0&webcam=true&dashcam=yes&rwisobs_label=tmpf");
        let overrides = r.sync.apply_initial();
        assert!(r.store.get_layer_visibility("rwisobs"));
        assert!(!r.store.get_layer_visibility("radar"));
        assert!(r.store.get_layer_visibility("webcam"));
        assert!(!r.store.get_layer_visibility("dashcam"));
        assert_eq!(overrides.layers.len(), 4);
        assert!(overrides.has_layer(LayerName::Dashcam));
        assert!(!overrides.has_layer(LayerName::Sps));
        assert!(overrides.rwis_label);
        assert_eq!(r.store.get::<key::RwisLabel>().as_deref(), Some("tmpf"));
    }

    #[test]
    fn empty_url_overrides_nothing() {
        let r = rig("");
        assert!(r.sync.apply_initial().is_empty());
        assert_eq!(r.loc.replacement_count(), 0);
    }

    #[test]
    fn time_changes_are_mirrored() {
        let r = rig("");
        r.sync.install();

        r.store
            .set_current_time(Utc.with_ymd_and_hms(2024, 7, 4, 9, 5, 0).unwrap());
        assert_eq!(r.loc.params().get(TIMESTAMP_PARAM), Some("202407040905"));

        r.clock.advance(Duration::minutes(1));
        r.store.set_is_realtime(true);
        assert_eq!(r.loc.params().get(TIMESTAMP_PARAM), None);
    }

    #[test]
    fn live_ticks_do_not_rewrite() {
        let r = rig("");
        r.sync.install();
        r.store.set_is_realtime(true);
        r.store.set::<key::IsRealtime>(true);
        assert_eq!(r.loc.replacement_count(), 0);
    }

    #[test]
    fn view_changes_use_fixed_precision() {
        let r = rig("");
        r.sync.install();
        r.store.set_view(-93.123456, 41.5, 6.5);
        let params = r.loc.params();
        assert_eq!(params.get(LON_PARAM), Some("-93.1235"));
        assert_eq!(params.get(LAT_PARAM), Some("41.5000"));
        assert_eq!(params.get(ZOOM_PARAM), Some("6.5"));
        assert_eq!(r.loc.replacement_count(), 3);
    }

    #[test]
    fn default_layers_stay_out_of_the_url() {
        let r = rig("");
        r.sync.install();

        r.store.set_layer_visibility("webcam", true);
        assert_eq!(r.loc.search(), "?webcam=1");
        r.store.set_layer_visibility("radar", false);
        assert_eq!(r.loc.params().get("radar"), Some("0"));

        r.store.set_layer_visibility("webcam", false);
        r.store.set_layer_visibility("radar", true);
        assert_eq!(r.loc.search(), "");
    }

    #[test]
    fn label_is_written_and_deleted() {
        let r = rig("");
        r.sync.install();
        r.store.set_rwis_label(Some("road temp".to_string()));
        assert_eq!(r.loc.search(), "?rwisobs_label=road+temp");
        r.store.set_rwis_label(None);
        assert_eq!(r.loc.search(), "");
    }

    #[test]
    fn resync_writes_everything_in_one_replacement() {
        let r = rig("?foo=bar");
        r.store.set_current_time(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 0).unwrap());
        r.store.set_layer_visibility("rwis", true);
        r.sync.resync_all();
        assert_eq!(r.loc.replacement_count(), 1);
        assert_eq!(
            r.loc.search(),
            "?foo=bar&timestamp=202501020304&lon=-98.5795&lat=39.8283&zoom=4&rwis=1"
        );
    }
}
