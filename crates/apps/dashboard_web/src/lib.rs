use console_error_panic_hook::set_once;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use foundation::{SystemClock, format_iso, parse_iso};
use persistence::{InMemoryStorage, LocalStorageBackend, SnapshotStorage};
use session::{BrowserLocation, Session, SessionEnv};
use state::{DashboardConfig, StateKey, StateStore, StateValue};

mod browser;
use browser::{BrowserIntervalScheduler, ConsoleWriter, DocumentVisibility};

struct App {
    session: Session,
}

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleWriter::new)
        .without_time()
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .try_init();
    Ok(())
}

/// Builds the session from the page URL and `localStorage`.
///
/// `config_json` may be omitted or partial; missing fields use defaults.
#[wasm_bindgen]
pub fn init_dashboard(config_json: Option<String>) -> Result<(), JsValue> {
    let config = DashboardConfig::from_json(config_json.as_deref().unwrap_or_default())
        .map_err(to_js)?;

    let env = SessionEnv {
        clock: Rc::new(SystemClock),
        scheduler: Rc::new(BrowserIntervalScheduler::new()),
        visibility: Rc::new(DocumentVisibility::new()),
        location: Rc::new(BrowserLocation::new()),
        storage: open_storage(),
    };
    let session = Session::start(&config, env);
    APP.with(|app| *app.borrow_mut() = Some(App { session }));
    tracing::info!(storage_key = %config.storage_key, "dashboard initialized");
    Ok(())
}

fn open_storage() -> Box<dyn SnapshotStorage> {
    match LocalStorageBackend::new() {
        Ok(storage) => Box::new(storage),
        Err(err) => {
            tracing::warn!(error = %err, "localStorage unavailable; state will not survive reloads");
            Box::new(InMemoryStorage::new())
        }
    }
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Clones the store out so callbacks can re-enter the API.
fn store() -> Result<Rc<StateStore>, JsValue> {
    APP.with(|app| {
        app.borrow()
            .as_ref()
            .map(|a| Rc::clone(a.session.store()))
            .ok_or_else(|| JsValue::from_str("dashboard not initialized"))
    })
}

fn to_js_value(value: &StateValue) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(&value.to_json().to_string())
}

fn from_js_value(value: &JsValue) -> Result<serde_json::Value, JsValue> {
    let Some(raw) = js_sys::JSON::stringify(value)?.as_string() else {
        return Ok(serde_json::Value::Null);
    };
    serde_json::from_str(&raw).map_err(to_js)
}

#[wasm_bindgen]
pub fn get_state(key: &str) -> Result<JsValue, JsValue> {
    let value = store()?.get_value(key).map_err(to_js)?;
    to_js_value(&value)
}

/// Unknown keys are ignored; a value of the wrong shape is an error.
#[wasm_bindgen]
pub fn set_state(key: &str, value: JsValue) -> Result<(), JsValue> {
    let store = store()?;
    let Ok(state_key) = key.parse::<StateKey>() else {
        tracing::debug!(key, "ignoring set for unknown state key");
        return Ok(());
    };
    let value = StateValue::from_json(state_key, &from_js_value(&value)?).map_err(to_js)?;
    store.set_value(key, value).map_err(to_js)
}

/// Returns a subscription id for [`unsubscribe`].
#[wasm_bindgen]
pub fn subscribe(key: &str, callback: js_sys::Function) -> Result<f64, JsValue> {
    let id = store()?
        .subscribe_value(key, move |value| {
            let result = to_js_value(value).and_then(|v| callback.call1(&JsValue::NULL, &v));
            if let Err(err) = result {
                tracing::warn!(?err, "state subscriber threw");
            }
        })
        .map_err(to_js)?;
    Ok(id.0 as f64)
}

#[wasm_bindgen]
pub fn unsubscribe(key: &str, id: f64) -> Result<bool, JsValue> {
    store()?
        .unsubscribe_value(key, runtime::SubscriptionId(id as u64))
        .map_err(to_js)
}

#[wasm_bindgen]
pub fn get_current_time() -> Result<String, JsValue> {
    Ok(format_iso(store()?.get_current_time()))
}

/// Pins the displayed time (leaves live mode).
#[wasm_bindgen]
pub fn set_current_time(iso: &str) -> Result<(), JsValue> {
    let t = parse_iso(iso).ok_or_else(|| JsValue::from_str("invalid ISO-8601 time"))?;
    store()?.set_current_time(t);
    Ok(())
}

#[wasm_bindgen]
pub fn get_is_realtime() -> Result<bool, JsValue> {
    Ok(store()?.get_is_realtime())
}

#[wasm_bindgen]
pub fn set_is_realtime(live: bool) -> Result<(), JsValue> {
    store()?.set_is_realtime(live);
    Ok(())
}

#[wasm_bindgen]
pub fn toggle_active_phenomenon(code: &str) -> Result<bool, JsValue> {
    Ok(store()?.toggle_active_phenomenon(code))
}

#[wasm_bindgen]
pub fn get_layer_visibility(layer: &str) -> Result<bool, JsValue> {
    Ok(store()?.get_layer_visibility(layer))
}

#[wasm_bindgen]
pub fn set_layer_visibility(layer: &str, visible: bool) -> Result<(), JsValue> {
    store()?.set_layer_visibility(layer, visible);
    Ok(())
}

#[wasm_bindgen]
pub fn set_view(lon: f64, lat: f64, zoom: f64) -> Result<(), JsValue> {
    store()?.set_view(lon, lat, zoom);
    Ok(())
}

/// Explicit persistence trigger; nothing is saved automatically.
#[wasm_bindgen]
pub fn save_state() -> Result<(), JsValue> {
    APP.with(|app| {
        let app = app.borrow();
        let app = app
            .as_ref()
            .ok_or_else(|| JsValue::from_str("dashboard not initialized"))?;
        app.session.save_state().map(|_| ()).map_err(to_js)
    })
}

/// Rounds an ISO instant down to its 5-minute boundary, for time-based tile requests.
#[wasm_bindgen]
pub fn rectify_to_five_minutes(iso: &str) -> Result<String, JsValue> {
    let t = parse_iso(iso).ok_or_else(|| JsValue::from_str("invalid ISO-8601 time"))?;
    Ok(format_iso(foundation::rectify_to_five_minutes(t)))
}
