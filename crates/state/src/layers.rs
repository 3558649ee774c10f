use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Warning/advisory codes shown when nothing else has been selected.
pub const DEFAULT_PHENOMENA: [&str; 11] = [
    "TO.W", "SV.W", "FF.W", "FL.W", "MA.W", "DS.W", "SQ.W", "EW.W", "FL.Y", "FA.Y", "DS.Y",
];

pub fn default_phenomena() -> BTreeSet<String> {
    DEFAULT_PHENOMENA.iter().map(|s| s.to_string()).collect()
}

/// Overlay layers whose visibility is tracked in state and mirrored to the URL.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerName {
    Radar,
    Warnings,
    Sps,
    Webcam,
    Dashcam,
    Rwis,
    RwisObs,
}

impl LayerName {
    pub const ALL: [LayerName; 7] = [
        LayerName::Radar,
        LayerName::Warnings,
        LayerName::Sps,
        LayerName::Webcam,
        LayerName::Dashcam,
        LayerName::Rwis,
        LayerName::RwisObs,
    ];

    /// Name used both as the URL parameter and as the key in persisted visibility.
    pub fn as_str(self) -> &'static str {
        match self {
            LayerName::Radar => "radar",
            LayerName::Warnings => "warnings",
            LayerName::Sps => "sps",
            LayerName::Webcam => "webcam",
            LayerName::Dashcam => "dashcam",
            LayerName::Rwis => "rwis",
            LayerName::RwisObs => "rwisobs",
        }
    }

    pub fn default_visible(self) -> bool {
        matches!(
            self,
            LayerName::Radar | LayerName::Warnings | LayerName::Sps
        )
    }
}

/// Per-layer on/off map.
///
/// Built from [`LayerVisibility::defaults`] it always holds an entry for every
/// [`LayerName`]; extra names (e.g. from an older snapshot) are carried along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerVisibility(BTreeMap<String, bool>);

impl Default for LayerVisibility {
    fn default() -> Self {
        Self::defaults()
    }
}

impl LayerVisibility {
    pub fn defaults() -> Self {
        Self(
            LayerName::ALL
                .into_iter()
                .map(|l| (l.as_str().to_string(), l.default_visible()))
                .collect(),
        )
    }

    /// Stored values win per key; missing keys keep their default.
    pub fn merged_over_defaults(stored: impl IntoIterator<Item = (String, bool)>) -> Self {
        let mut out = Self::defaults();
        out.0.extend(stored);
        out
    }

    /// Unknown layers are reported as hidden.
    pub fn is_visible(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, visible: bool) {
        self.0.insert(name.into(), visible);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_tracked_layer() {
        let v = LayerVisibility::defaults();
        assert_eq!(v.len(), LayerName::ALL.len());
        for layer in LayerName::ALL {
            assert_eq!(v.get(layer.as_str()), Some(layer.default_visible()));
        }
    }

    #[test]
    fn stored_values_win_and_gaps_keep_defaults() {
        let v = LayerVisibility::merged_over_defaults([
            ("radar".to_string(), false),
            ("legacy".to_string(), true),
        ]);
        assert!(!v.is_visible("radar"));
        assert!(v.is_visible("warnings"));
        assert!(v.is_visible("legacy"));
        assert_eq!(v.len(), LayerName::ALL.len() + 1);
    }

    #[test]
    fn unknown_layer_is_hidden() {
        assert!(!LayerVisibility::defaults().is_visible("nope"));
    }

    #[test]
    fn default_phenomena_has_eleven_codes() {
        let set = default_phenomena();
        assert_eq!(set.len(), 11);
        assert!(set.contains("TO.W"));
        assert!(set.contains("DS.Y"));
    }
}
