use std::cell::{Cell, RefCell};

use crate::query::QueryParams;

/// The page's query string, rewritable without navigation.
pub trait UrlLocation {
    /// Current query, including the leading `?` when non-empty.
    fn search(&self) -> String;
    /// Replaces the query in place (history replacement, no new entry).
    /// `query` carries no leading `?`; empty clears it.
    fn replace_query(&self, query: &str);
}

/// Location held in memory, for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryLocation {
    search: RefCell<String>,
    replacements: Cell<usize>,
}

impl InMemoryLocation {
    pub fn new(search: &str) -> Self {
        let search = match search.strip_prefix('?').unwrap_or(search) {
            "" => String::new(),
            raw => format!("?{raw}"),
        };
        Self {
            search: RefCell::new(search),
            replacements: Cell::new(0),
        }
    }

    pub fn params(&self) -> QueryParams {
        QueryParams::parse(&self.search.borrow())
    }

    /// Number of history replacements performed so far.
    pub fn replacement_count(&self) -> usize {
        self.replacements.get()
    }
}

impl UrlLocation for InMemoryLocation {
    fn search(&self) -> String {
        self.search.borrow().clone()
    }

    fn replace_query(&self, query: &str) {
        *self.search.borrow_mut() = if query.is_empty() {
            String::new()
        } else {
            format!("?{query}")
        };
        self.replacements.set(self.replacements.get() + 1);
    }
}

/// Same-document URL for a history replacement. An empty query falls back to
/// the bare path; the fragment is kept either way.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) fn replacement_url(pathname: &str, query: &str, hash: &str) -> String {
    if query.is_empty() {
        format!("{pathname}{hash}")
    } else {
        format!("{pathname}?{query}{hash}")
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::{UrlLocation, replacement_url};
    use wasm_bindgen::JsValue;

    /// `window.location` read, `history.replaceState` write.
    #[derive(Debug, Default)]
    pub struct BrowserLocation;

    impl BrowserLocation {
        pub fn new() -> Self {
            Self
        }
    }

    impl UrlLocation for BrowserLocation {
        fn search(&self) -> String {
            web_sys::window()
                .and_then(|w| w.location().search().ok())
                .unwrap_or_default()
        }

        fn replace_query(&self, query: &str) {
            let Some(window) = web_sys::window() else {
                return;
            };
            let location = window.location();
            let pathname = location.pathname().unwrap_or_else(|_| "/".to_string());
            let hash = location.hash().unwrap_or_default();
            let url = replacement_url(&pathname, query, &hash);
            let result = window
                .history()
                .and_then(|h| h.replace_state_with_url(&JsValue::NULL, "", Some(&url)));
            if let Err(err) = result {
                tracing::warn!(?err, "history.replaceState failed");
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserLocation;

/// Native builds have no page; the query is always empty and rewrites are dropped.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct BrowserLocation;

#[cfg(not(target_arch = "wasm32"))]
impl BrowserLocation {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl UrlLocation for BrowserLocation {
    fn search(&self) -> String {
        String::new()
    }

    fn replace_query(&self, query: &str) {
        tracing::debug!(query, "no browser location; dropping URL rewrite");
    }
}
