//! State keys.
//!
//! Every key exists twice: as a variant of [`StateKey`] for string-keyed
//! access (host bridges, diagnostics), and as a zero-sized marker type
//! implementing [`Field`], which ties the key to its payload type so that
//! `store.set::<key::Lat>(..)` cannot be handed a `bool`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use foundation::{Instant, format_iso, parse_iso};
use runtime::Channel;
use serde_json::Value;

use crate::error::StateError;
use crate::layers::LayerVisibility as Visibility;
use crate::store::{Channels, DashboardState, StateStore};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    CurrentTime,
    IsRealtime,
    Lat,
    Lon,
    Zoom,
    ActivePhenomena,
    LayerVisibility,
    BaseLayer,
    RwisLabel,
}

impl StateKey {
    pub const ALL: [StateKey; 9] = [
        StateKey::CurrentTime,
        StateKey::IsRealtime,
        StateKey::Lat,
        StateKey::Lon,
        StateKey::Zoom,
        StateKey::ActivePhenomena,
        StateKey::LayerVisibility,
        StateKey::BaseLayer,
        StateKey::RwisLabel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::CurrentTime => "currentTime",
            StateKey::IsRealtime => "isRealtime",
            StateKey::Lat => "lat",
            StateKey::Lon => "lon",
            StateKey::Zoom => "zoom",
            StateKey::ActivePhenomena => "activePhenomena",
            StateKey::LayerVisibility => "layerVisibility",
            StateKey::BaseLayer => "baseLayer",
            StateKey::RwisLabel => "rwisLabel",
        }
    }

    /// Human-readable payload shape, used in type-mismatch errors.
    pub fn expected(self) -> &'static str {
        match self {
            StateKey::CurrentTime => "an ISO-8601 instant",
            StateKey::IsRealtime => "a boolean",
            StateKey::Lat | StateKey::Lon | StateKey::Zoom => "a number",
            StateKey::ActivePhenomena => "an array of strings",
            StateKey::LayerVisibility => "an object of booleans",
            StateKey::BaseLayer => "a string",
            StateKey::RwisLabel => "a string or null",
        }
    }

    pub(crate) fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StateError::InvalidKey(s.to_string()))
    }
}

/// Dynamically typed state value.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Time(Instant),
    Flag(bool),
    Number(f64),
    Codes(BTreeSet<String>),
    Layers(Visibility),
    Text(String),
    OptionalText(Option<String>),
}

impl StateValue {
    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Time(t) => Value::String(format_iso(*t)),
            StateValue::Flag(b) => Value::Bool(*b),
            StateValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StateValue::Codes(codes) => {
                Value::Array(codes.iter().cloned().map(Value::String).collect())
            }
            StateValue::Layers(v) => Value::Object(
                v.iter()
                    .map(|(name, visible)| (name.to_string(), Value::Bool(visible)))
                    .collect(),
            ),
            StateValue::Text(s) => Value::String(s.clone()),
            StateValue::OptionalText(s) => s.clone().map(Value::String).unwrap_or(Value::Null),
        }
    }

    /// Interprets `raw` as the payload shape `key` holds.
    ///
    /// A visibility object is merged over the layer defaults so no tracked
    /// layer is ever left without an entry.
    pub fn from_json(key: StateKey, raw: &Value) -> Result<Self, StateError> {
        let parsed = match key {
            StateKey::CurrentTime => raw.as_str().and_then(parse_iso).map(StateValue::Time),
            StateKey::IsRealtime => raw.as_bool().map(StateValue::Flag),
            StateKey::Lat | StateKey::Lon | StateKey::Zoom => {
                raw.as_f64().map(StateValue::Number)
            }
            StateKey::ActivePhenomena => raw
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|item| item.as_str().map(str::to_string))
                        .collect::<Option<BTreeSet<_>>>()
                })
                .map(StateValue::Codes),
            StateKey::LayerVisibility => raw
                .as_object()
                .and_then(|obj| {
                    obj.iter()
                        .map(|(name, v)| v.as_bool().map(|b| (name.clone(), b)))
                        .collect::<Option<Vec<_>>>()
                })
                .map(|pairs| StateValue::Layers(Visibility::merged_over_defaults(pairs))),
            StateKey::BaseLayer => raw.as_str().map(|s| StateValue::Text(s.to_string())),
            StateKey::RwisLabel => match raw {
                Value::Null => Some(StateValue::OptionalText(None)),
                Value::String(s) => Some(StateValue::OptionalText(Some(s.clone()))),
                _ => None,
            },
        };
        parsed.ok_or(StateError::TypeMismatch {
            key,
            expected: key.expected(),
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A statically typed state key.
pub trait Field: sealed::Sealed + Sized + 'static {
    type Value: Clone + PartialEq + fmt::Debug + 'static;
    const KEY: StateKey;

    #[doc(hidden)]
    fn slot(state: &DashboardState) -> &Self::Value;
    #[doc(hidden)]
    fn slot_mut(state: &mut DashboardState) -> &mut Self::Value;
    #[doc(hidden)]
    fn channel(channels: &Channels) -> &Channel<Self::Value>;

    fn into_value(value: Self::Value) -> StateValue;
    fn from_value(value: StateValue) -> Option<Self::Value>;

    /// Stores `value`, runs the key's coupling rule and notifies subscribers.
    fn apply(store: &StateStore, value: Self::Value) {
        store.replace::<Self>(value);
        store.notify::<Self>();
    }
}

macro_rules! state_fields {
    ($(
        $(#[$doc:meta])*
        $marker:ident => $slot:ident : $ty:ty, $variant:ident $(, apply = $apply:path)?;
    )*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Copy, Clone)]
            pub struct $marker;

            impl sealed::Sealed for $marker {}

            impl Field for $marker {
                type Value = $ty;
                const KEY: StateKey = StateKey::$marker;

                fn slot(state: &DashboardState) -> &$ty {
                    &state.$slot
                }

                fn slot_mut(state: &mut DashboardState) -> &mut $ty {
                    &mut state.$slot
                }

                fn channel(channels: &Channels) -> &Channel<$ty> {
                    &channels.$slot
                }

                fn into_value(value: $ty) -> StateValue {
                    StateValue::$variant(value)
                }

                fn from_value(value: StateValue) -> Option<$ty> {
                    match value {
                        StateValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                $(
                    fn apply(store: &StateStore, value: $ty) {
                        $apply(store, value)
                    }
                )?
            }
        )*
    };
}

state_fields! {
    /// Displayed instant. An explicit set pins the time and leaves live mode.
    CurrentTime => current_time: Instant, Time, apply = StateStore::pin_time;
    /// Live mode. Turning it on snaps the displayed instant to now.
    IsRealtime => is_realtime: bool, Flag, apply = StateStore::switch_realtime;
    /// Viewport center latitude, degrees.
    Lat => lat: f64, Number;
    /// Viewport center longitude, degrees.
    Lon => lon: f64, Number;
    Zoom => zoom: f64, Number;
    ActivePhenomena => active_phenomena: BTreeSet<String>, Codes;
    LayerVisibility => layer_visibility: Visibility, Layers;
    BaseLayer => base_layer: String, Text;
    /// Label attribute for the RWIS observation overlay.
    RwisLabel => rwis_label: Option<String>, OptionalText;
}
