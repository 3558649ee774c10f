use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

type Callback<T> = Rc<dyn Fn(&T)>;

/// Typed, synchronous notification channel.
///
/// Delivery is in registration order. The subscriber list is snapshotted
/// before delivery, so callbacks may subscribe or unsubscribe while being
/// notified; such changes take effect from the next `emit`.
pub struct Channel<T> {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));
        self.subscribers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `value` to every subscriber. Returns the number of callbacks invoked.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for cb in &snapshot {
            cb(value);
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Channel;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn delivers_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let ch: Channel<u32> = Channel::new();
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            ch.subscribe(move |v| seen.borrow_mut().push(format!("{tag}{v}")));
        }
        assert_eq!(ch.emit(&7), 2);
        assert_eq!(*seen.borrow(), vec!["a7", "b7"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let hits = Rc::new(RefCell::new(0));
        let ch: Channel<()> = Channel::new();
        let h = Rc::clone(&hits);
        let first = ch.subscribe(move |_| *h.borrow_mut() += 1);
        let h = Rc::clone(&hits);
        ch.subscribe(move |_| *h.borrow_mut() += 10);

        assert!(ch.unsubscribe(first));
        assert!(!ch.unsubscribe(first));
        ch.emit(&());
        assert_eq!(*hits.borrow(), 10);
    }

    #[test]
    fn subscribing_during_emit_takes_effect_next_time() {
        let ch: Rc<Channel<u8>> = Rc::new(Channel::new());
        let hits = Rc::new(RefCell::new(0));
        let inner = Rc::clone(&ch);
        let h = Rc::clone(&hits);
        ch.subscribe(move |_| {
            let h = Rc::clone(&h);
            inner.subscribe(move |_| *h.borrow_mut() += 1);
        });

        assert_eq!(ch.emit(&0), 1);
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(ch.emit(&0), 2);
        assert_eq!(*hits.borrow(), 1);
    }
}
