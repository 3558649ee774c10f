use crate::event_bus::Channel;

/// Page visibility as reported by the host (e.g. `document.visibilityState`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Injected source of visibility-change events.
pub trait VisibilitySource {
    fn on_change(&self, callback: Box<dyn Fn(Visibility)>);
}

/// Visibility source fired by hand, for tests and headless hosts.
#[derive(Debug, Default)]
pub struct ManualVisibility {
    listeners: Channel<Visibility>,
}

impl ManualVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, visibility: Visibility) {
        self.listeners.emit(&visibility);
    }
}

impl VisibilitySource for ManualVisibility {
    fn on_change(&self, callback: Box<dyn Fn(Visibility)>) {
        self.listeners.subscribe(move |v| callback(*v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn forwards_every_change() {
        let src = ManualVisibility::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        src.on_change(Box::new(move |v| s.borrow_mut().push(v)));

        src.emit(Visibility::Hidden);
        src.emit(Visibility::Visible);
        assert_eq!(*seen.borrow(), vec![Visibility::Hidden, Visibility::Visible]);
    }
}
