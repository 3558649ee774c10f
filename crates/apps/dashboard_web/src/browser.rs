//! Browser adapters for the host-service traits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;

use foundation::Duration;
use runtime::{IntervalScheduler, TimerHandle, Visibility, VisibilitySource};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// `window.setInterval` / `window.clearInterval`.
#[derive(Default)]
pub struct BrowserIntervalScheduler {
    next_id: Cell<u64>,
    active: RefCell<BTreeMap<TimerHandle, (i32, Closure<dyn FnMut()>)>>,
    // A cleared closure may still be on the JS stack; dropped on the next set.
    retired: RefCell<Vec<Closure<dyn FnMut()>>>,
}

impl BrowserIntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntervalScheduler for BrowserIntervalScheduler {
    fn set_interval(&self, period: Duration, callback: Box<dyn FnMut()>) -> TimerHandle {
        self.retired.borrow_mut().clear();

        let handle = TimerHandle(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let closure = Closure::wrap(callback);
        let timeout = i32::try_from(period.num_milliseconds().max(1)).unwrap_or(i32::MAX);
        let id = web_sys::window().map(|w| {
            w.set_interval_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                timeout,
            )
        });
        match id {
            Some(Ok(id)) => {
                self.active.borrow_mut().insert(handle, (id, closure));
            }
            Some(Err(err)) => tracing::warn!(?err, "setInterval failed"),
            None => tracing::warn!("no window; interval not scheduled"),
        }
        handle
    }

    fn clear_interval(&self, handle: TimerHandle) {
        let Some((id, closure)) = self.active.borrow_mut().remove(&handle) else {
            return;
        };
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(id);
        }
        self.retired.borrow_mut().push(closure);
    }
}

/// `document.visibilityState` via the `visibilitychange` event.
#[derive(Default)]
pub struct DocumentVisibility {
    listeners: RefCell<Vec<Closure<dyn FnMut()>>>,
}

impl DocumentVisibility {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisibilitySource for DocumentVisibility {
    fn on_change(&self, callback: Box<dyn Fn(Visibility)>) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            tracing::warn!("no document; visibility changes will not be observed");
            return;
        };
        let doc = document.clone();
        let closure = Closure::wrap(Box::new(move || {
            let visibility = match doc.visibility_state() {
                web_sys::VisibilityState::Visible => Visibility::Visible,
                _ => Visibility::Hidden,
            };
            callback(visibility);
        }) as Box<dyn FnMut()>);
        if let Err(err) = document
            .add_event_listener_with_callback("visibilitychange", closure.as_ref().unchecked_ref())
        {
            tracing::warn!(?err, "failed to listen for visibilitychange");
            return;
        }
        self.listeners.borrow_mut().push(closure);
    }
}

/// Line-buffered `io::Write` that forwards to `console.log`.
#[derive(Default)]
pub struct ConsoleWriter {
    buf: Vec<u8>,
}

impl ConsoleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        if !line.is_empty() {
            web_sys::console::log_1(&JsValue::from_str(line));
        }
        self.buf.clear();
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        self.emit();
    }
}
