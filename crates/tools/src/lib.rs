//! Operator helpers behind the `dashctl` binary.

use std::env;
use std::rc::Rc;

use foundation::{Instant, ManualClock};
use persistence::SnapshotStorage;
use runtime::{ManualScheduler, ManualVisibility};
use serde::Serialize;
use session::{InMemoryLocation, Session, SessionEnv};
use state::{DashboardConfig, DashboardState};

/// Compiled-in config with `DASHBOARD_*` environment overrides.
pub fn config_from_env() -> DashboardConfig {
    config_with(|key| env::var(key).ok())
}

/// Like [`config_from_env`], reading variables through `var`.
/// Absent or unparseable values keep the default.
pub fn config_with(var: impl Fn(&str) -> Option<String>) -> DashboardConfig {
    let defaults = DashboardConfig::default();
    let env_var_string = |key: &str, default: String| var(key).unwrap_or(default);
    let env_var_u32 = |key: &str, default: u32| {
        var(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };
    let env_var_f64 = |key: &str, default: f64| {
        var(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };

    DashboardConfig {
        storage_key: env_var_string("DASHBOARD_STORAGE_KEY", defaults.storage_key),
        tick_period_ms: env_var_u32("DASHBOARD_TICK_MS", defaults.tick_period_ms),
        home_lat: env_var_f64("DASHBOARD_HOME_LAT", defaults.home_lat),
        home_lon: env_var_f64("DASHBOARD_HOME_LON", defaults.home_lon),
        home_zoom: env_var_f64("DASHBOARD_HOME_ZOOM", defaults.home_zoom),
        base_layer: env_var_string("DASHBOARD_BASE_LAYER", defaults.base_layer),
    }
}

/// What a browser opening `query` against the stored snapshot would start with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub state: DashboardState,
    /// Query after startup mirroring, including its `?` when non-empty.
    pub share_query: String,
    pub restored_from_storage: bool,
}

/// Runs a full session startup headlessly, frozen at `now`.
///
/// With `save`, the resolved state is written back to `storage`.
pub fn resolve(
    config: &DashboardConfig,
    query: &str,
    storage: Box<dyn SnapshotStorage>,
    now: Instant,
    save: bool,
) -> Result<Resolution, persistence::PersistError> {
    let clock = Rc::new(ManualClock::new(now));
    let session = Session::start(
        config,
        SessionEnv {
            clock: clock.clone(),
            scheduler: Rc::new(ManualScheduler::new(clock)),
            visibility: Rc::new(ManualVisibility::new()),
            location: Rc::new(InMemoryLocation::new(query)),
            storage,
        },
    );
    if save {
        session.save_state()?;
    }
    Ok(Resolution {
        state: session.store().snapshot(),
        share_query: session.share_query(),
        restored_from_storage: session.restored_from_storage(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use persistence::InMemoryStorage;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn now() -> Instant {
        Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn env_overrides_and_fallbacks() {
        let vars: HashMap<&str, &str> = [
            ("DASHBOARD_HOME_ZOOM", "6.5"),
            ("DASHBOARD_TICK_MS", "not-a-number"),
            ("DASHBOARD_STORAGE_KEY", "alt_state"),
        ]
        .into_iter()
        .collect();
        let cfg = config_with(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.home_zoom, 6.5);
        assert_eq!(cfg.tick_period_ms, 60_000);
        assert_eq!(cfg.storage_key, "alt_state");
        assert_eq!(cfg.base_layer, "esri-hybrid");
    }

    #[test]
    fn resolves_url_over_storage() {
        let storage = InMemoryStorage::with_item(
            "iemone_state",
            r#"{"longitude":-90.0,"latitude":40.0,"zoom":5,"layerVisibility":{"webcam":true}}"#,
        );
        let res = resolve(
            &DashboardConfig::default(),
            "?lon=-93.5000&lat=42.0000&zoom=7",
            Box::new(storage),
            now(),
            false,
        )
        .unwrap();
        assert_eq!(res.state.lon, -93.5);
        assert!(res.state.layer_visibility.is_visible("webcam"));
        assert!(res.restored_from_storage);
        assert_eq!(res.share_query, "?lon=-93.5000&lat=42.0000&zoom=7&webcam=1");
    }

    #[test]
    fn cold_resolve_is_live_at_now() {
        let res = resolve(
            &DashboardConfig::default(),
            "",
            Box::new(InMemoryStorage::new()),
            now(),
            false,
        )
        .unwrap();
        assert!(res.state.is_realtime);
        assert_eq!(res.state.current_time, now());
        assert_eq!(res.share_query, "");
    }
}
