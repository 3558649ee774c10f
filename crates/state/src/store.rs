use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::str::FromStr;

use foundation::{Clock, Instant};
use runtime::{Channel, SubscriptionId};
use serde::Serialize;

use crate::config::DashboardConfig;
use crate::error::StateError;
use crate::key::{self, Field, StateKey, StateValue};
use crate::layers::{LayerVisibility, default_phenomena};

/// The full set of session values. Keys are fixed; only values change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub current_time: Instant,
    pub is_realtime: bool,
    pub lat: f64,
    pub lon: f64,
    pub zoom: f64,
    pub active_phenomena: BTreeSet<String>,
    pub layer_visibility: LayerVisibility,
    pub base_layer: String,
    pub rwis_label: Option<String>,
}

impl DashboardState {
    /// Compiled-in defaults: live mode at `now`, home viewport.
    pub fn initial(config: &DashboardConfig, now: Instant) -> Self {
        Self {
            current_time: now,
            is_realtime: true,
            lat: config.home_lat,
            lon: config.home_lon,
            zoom: config.home_zoom,
            active_phenomena: default_phenomena(),
            layer_visibility: LayerVisibility::defaults(),
            base_layer: config.base_layer.clone(),
            rwis_label: None,
        }
    }
}

/// One subscriber list per key.
#[derive(Debug, Default)]
pub struct Channels {
    pub(crate) current_time: Channel<Instant>,
    pub(crate) is_realtime: Channel<bool>,
    pub(crate) lat: Channel<f64>,
    pub(crate) lon: Channel<f64>,
    pub(crate) zoom: Channel<f64>,
    pub(crate) active_phenomena: Channel<BTreeSet<String>>,
    pub(crate) layer_visibility: Channel<LayerVisibility>,
    pub(crate) base_layer: Channel<String>,
    pub(crate) rwis_label: Channel<Option<String>>,
}

/// Upper bound on re-deliveries after subscribers change the key they are
/// being notified for.
const MAX_REDELIVERIES: usize = 8;

/// Clears a key's "notifying" bit when delivery ends, even on unwind.
struct NotifyGuard<'a> {
    flags: &'a Cell<u16>,
    bit: u16,
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.flags.set(self.flags.get() & !self.bit);
    }
}

/// Central session state with synchronous, per-key change notification.
///
/// Coupling rules owned here:
/// - setting [`key::CurrentTime`] pins the time (`is_realtime` becomes false
///   in the same transition);
/// - switching [`key::IsRealtime`] from false to true snaps the time to the
///   clock's "now" and notifies time subscribers before returning.
///
/// Subscribers run synchronously inside `set`. A subscriber that sets the
/// same key it is being notified for updates the value without recursing;
/// once the current pass ends every subscriber is handed the latest value,
/// repeated until it settles.
pub struct StateStore {
    clock: Rc<dyn Clock>,
    values: RefCell<DashboardState>,
    channels: Channels,
    notifying: Cell<u16>,
    dirty: Cell<u16>,
}

impl StateStore {
    pub fn new(config: &DashboardConfig, clock: Rc<dyn Clock>) -> Self {
        let initial = DashboardState::initial(config, clock.now());
        Self::with_state(initial, clock)
    }

    pub fn with_state(state: DashboardState, clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            values: RefCell::new(state),
            channels: Channels::default(),
            notifying: Cell::new(0),
            dirty: Cell::new(0),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn get<F: Field>(&self) -> F::Value {
        F::slot(&self.values.borrow()).clone()
    }

    pub fn set<F: Field>(&self, value: F::Value) {
        F::apply(self, value);
    }

    /// Callbacks receive the new value only.
    pub fn subscribe<F: Field>(&self, callback: impl Fn(&F::Value) + 'static) -> SubscriptionId {
        F::channel(&self.channels).subscribe(callback)
    }

    pub fn unsubscribe<F: Field>(&self, id: SubscriptionId) -> bool {
        F::channel(&self.channels).unsubscribe(id)
    }

    pub fn subscriber_count<F: Field>(&self) -> usize {
        F::channel(&self.channels).len()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.values.borrow().clone()
    }

    /// String-keyed read. Unknown keys are an error.
    pub fn get_value(&self, name: &str) -> Result<StateValue, StateError> {
        Ok(match StateKey::from_str(name)? {
            StateKey::CurrentTime => self.get_as_value::<key::CurrentTime>(),
            StateKey::IsRealtime => self.get_as_value::<key::IsRealtime>(),
            StateKey::Lat => self.get_as_value::<key::Lat>(),
            StateKey::Lon => self.get_as_value::<key::Lon>(),
            StateKey::Zoom => self.get_as_value::<key::Zoom>(),
            StateKey::ActivePhenomena => self.get_as_value::<key::ActivePhenomena>(),
            StateKey::LayerVisibility => self.get_as_value::<key::LayerVisibility>(),
            StateKey::BaseLayer => self.get_as_value::<key::BaseLayer>(),
            StateKey::RwisLabel => self.get_as_value::<key::RwisLabel>(),
        })
    }

    /// String-keyed write. An empty or unknown key is silently ignored;
    /// a value of the wrong shape is rejected.
    pub fn set_value(&self, name: &str, value: StateValue) -> Result<(), StateError> {
        let Ok(state_key) = StateKey::from_str(name) else {
            tracing::debug!(name, "ignoring set for unknown state key");
            return Ok(());
        };
        match state_key {
            StateKey::CurrentTime => self.set_from_value::<key::CurrentTime>(value),
            StateKey::IsRealtime => self.set_from_value::<key::IsRealtime>(value),
            StateKey::Lat => self.set_from_value::<key::Lat>(value),
            StateKey::Lon => self.set_from_value::<key::Lon>(value),
            StateKey::Zoom => self.set_from_value::<key::Zoom>(value),
            StateKey::ActivePhenomena => self.set_from_value::<key::ActivePhenomena>(value),
            StateKey::LayerVisibility => self.set_from_value::<key::LayerVisibility>(value),
            StateKey::BaseLayer => self.set_from_value::<key::BaseLayer>(value),
            StateKey::RwisLabel => self.set_from_value::<key::RwisLabel>(value),
        }
    }

    /// String-keyed subscribe; the callback sees each new value as a [`StateValue`].
    pub fn subscribe_value(
        &self,
        name: &str,
        callback: impl Fn(&StateValue) + 'static,
    ) -> Result<SubscriptionId, StateError> {
        Ok(match StateKey::from_str(name)? {
            StateKey::CurrentTime => self.subscribe_as_value::<key::CurrentTime>(callback),
            StateKey::IsRealtime => self.subscribe_as_value::<key::IsRealtime>(callback),
            StateKey::Lat => self.subscribe_as_value::<key::Lat>(callback),
            StateKey::Lon => self.subscribe_as_value::<key::Lon>(callback),
            StateKey::Zoom => self.subscribe_as_value::<key::Zoom>(callback),
            StateKey::ActivePhenomena => self.subscribe_as_value::<key::ActivePhenomena>(callback),
            StateKey::LayerVisibility => self.subscribe_as_value::<key::LayerVisibility>(callback),
            StateKey::BaseLayer => self.subscribe_as_value::<key::BaseLayer>(callback),
            StateKey::RwisLabel => self.subscribe_as_value::<key::RwisLabel>(callback),
        })
    }

    pub fn unsubscribe_value(&self, name: &str, id: SubscriptionId) -> Result<bool, StateError> {
        Ok(match StateKey::from_str(name)? {
            StateKey::CurrentTime => self.unsubscribe::<key::CurrentTime>(id),
            StateKey::IsRealtime => self.unsubscribe::<key::IsRealtime>(id),
            StateKey::Lat => self.unsubscribe::<key::Lat>(id),
            StateKey::Lon => self.unsubscribe::<key::Lon>(id),
            StateKey::Zoom => self.unsubscribe::<key::Zoom>(id),
            StateKey::ActivePhenomena => self.unsubscribe::<key::ActivePhenomena>(id),
            StateKey::LayerVisibility => self.unsubscribe::<key::LayerVisibility>(id),
            StateKey::BaseLayer => self.unsubscribe::<key::BaseLayer>(id),
            StateKey::RwisLabel => self.unsubscribe::<key::RwisLabel>(id),
        })
    }

    fn subscribe_as_value<F: Field>(
        &self,
        callback: impl Fn(&StateValue) + 'static,
    ) -> SubscriptionId {
        self.subscribe::<F>(move |v| callback(&F::into_value(v.clone())))
    }

    fn get_as_value<F: Field>(&self) -> StateValue {
        F::into_value(self.get::<F>())
    }

    fn set_from_value<F: Field>(&self, value: StateValue) -> Result<(), StateError> {
        let value = F::from_value(value).ok_or(StateError::TypeMismatch {
            key: F::KEY,
            expected: F::KEY.expected(),
        })?;
        self.set::<F>(value);
        Ok(())
    }

    pub fn get_current_time(&self) -> Instant {
        self.get::<key::CurrentTime>()
    }

    /// Pins the displayed time; leaves live mode.
    pub fn set_current_time(&self, t: Instant) {
        self.set::<key::CurrentTime>(t);
    }

    pub fn get_is_realtime(&self) -> bool {
        self.get::<key::IsRealtime>()
    }

    pub fn set_is_realtime(&self, live: bool) {
        self.set::<key::IsRealtime>(live);
    }

    pub fn get_active_phenomena(&self) -> BTreeSet<String> {
        self.get::<key::ActivePhenomena>()
    }

    /// Flips membership of `code`; returns whether it is now active.
    pub fn toggle_active_phenomenon(&self, code: &str) -> bool {
        let active = {
            let mut values = self.values.borrow_mut();
            if values.active_phenomena.remove(code) {
                false
            } else {
                values.active_phenomena.insert(code.to_string());
                true
            }
        };
        self.notify::<key::ActivePhenomena>();
        active
    }

    pub fn get_layer_visibility(&self, layer: &str) -> bool {
        self.values.borrow().layer_visibility.is_visible(layer)
    }

    pub fn set_layer_visibility(&self, layer: &str, visible: bool) {
        self.values
            .borrow_mut()
            .layer_visibility
            .set(layer, visible);
        self.notify::<key::LayerVisibility>();
    }

    /// Sets the viewport center and zoom, notifying each key in turn.
    pub fn set_view(&self, lon: f64, lat: f64, zoom: f64) {
        self.set::<key::Lon>(lon);
        self.set::<key::Lat>(lat);
        self.set::<key::Zoom>(zoom);
    }

    pub fn set_base_layer(&self, id: impl Into<String>) {
        self.set::<key::BaseLayer>(id.into());
    }

    pub fn set_rwis_label(&self, label: Option<String>) {
        self.set::<key::RwisLabel>(label);
    }

    /// Moves the displayed time to `now` without leaving live mode.
    pub(crate) fn advance_live_time(&self, now: Instant) {
        self.replace::<key::CurrentTime>(now);
        self.notify::<key::CurrentTime>();
    }

    pub(crate) fn replace<F: Field>(&self, value: F::Value) {
        *F::slot_mut(&mut self.values.borrow_mut()) = value;
    }

    pub(crate) fn notify<F: Field>(&self) {
        let bit = F::KEY.bit();
        if self.notifying.get() & bit != 0 {
            tracing::debug!(key = %F::KEY, "deferring reentrant notification");
            self.dirty.set(self.dirty.get() | bit);
            return;
        }
        self.notifying.set(self.notifying.get() | bit);
        let _guard = NotifyGuard {
            flags: &self.notifying,
            bit,
        };

        let mut delivered = self.get::<F>();
        F::channel(&self.channels).emit(&delivered);
        for _ in 0..MAX_REDELIVERIES {
            if self.dirty.get() & bit == 0 {
                return;
            }
            self.dirty.set(self.dirty.get() & !bit);
            let latest = self.get::<F>();
            if latest == delivered {
                return;
            }
            delivered = latest;
            F::channel(&self.channels).emit(&delivered);
        }
        if self.dirty.get() & bit != 0 {
            self.dirty.set(self.dirty.get() & !bit);
            tracing::warn!(
                key = %F::KEY,
                passes = MAX_REDELIVERIES,
                "subscribers kept changing the value; giving up on redelivery"
            );
        }
    }

    pub(crate) fn pin_time(&self, t: Instant) {
        {
            let mut values = self.values.borrow_mut();
            values.current_time = t;
            values.is_realtime = false;
        }
        self.notify::<key::CurrentTime>();
        self.notify::<key::IsRealtime>();
    }

    pub(crate) fn switch_realtime(&self, live: bool) {
        let snapped = {
            let mut values = self.values.borrow_mut();
            let snapped = live && !values.is_realtime;
            values.is_realtime = live;
            if snapped {
                values.current_time = self.clock.now();
            }
            snapped
        };
        if snapped {
            self.notify::<key::CurrentTime>();
        }
        self.notify::<key::IsRealtime>();
    }
}
