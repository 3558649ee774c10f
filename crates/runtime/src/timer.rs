use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::{Clock, Duration, Instant, ManualClock};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

/// Repeating timers on a cooperative, single-threaded event loop.
///
/// Callbacks run to completion; nothing else interleaves with them.
pub trait IntervalScheduler {
    fn set_interval(&self, period: Duration, callback: Box<dyn FnMut()>) -> TimerHandle;

    /// Clearing an unknown or already-cleared handle is a no-op.
    fn clear_interval(&self, handle: TimerHandle);
}

/// Browsers clamp interval periods; we clamp to at least 1 ms so `advance` always terminates.
const MIN_PERIOD_MS: i64 = 1;

struct Interval {
    period: Duration,
    next_due: Instant,
    callback: Rc<RefCell<Box<dyn FnMut()>>>,
}

/// Deterministic scheduler driven by a [`ManualClock`].
///
/// Due intervals fire in chronological order; equal due times resolve by
/// handle (oldest first), so replays are stable.
pub struct ManualScheduler {
    clock: Rc<ManualClock>,
    next_id: Cell<u64>,
    timers: RefCell<BTreeMap<TimerHandle, Interval>>,
}

impl ManualScheduler {
    pub fn new(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: Cell::new(0),
            timers: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn active_count(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.borrow().contains_key(&handle)
    }

    /// Moves the clock forward by `by`, firing every interval that comes due
    /// on the way. Returns the number of callbacks invoked.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.now() + by;
        let mut fired = 0usize;
        loop {
            let next = self
                .timers
                .borrow()
                .iter()
                .filter(|(_, t)| t.next_due <= target)
                .min_by(|(ha, a), (hb, b)| a.next_due.cmp(&b.next_due).then_with(|| ha.cmp(hb)))
                .map(|(h, t)| (*h, t.next_due));
            let Some((handle, due)) = next else {
                break;
            };

            self.clock.set(due);
            let callback = {
                let mut timers = self.timers.borrow_mut();
                let Some(timer) = timers.get_mut(&handle) else {
                    continue;
                };
                timer.next_due = due + timer.period;
                Rc::clone(&timer.callback)
            };
            (callback.borrow_mut())();
            fired += 1;
        }
        self.clock.set(target);
        fired
    }
}

impl IntervalScheduler for ManualScheduler {
    fn set_interval(&self, period: Duration, callback: Box<dyn FnMut()>) -> TimerHandle {
        let period = period.max(Duration::milliseconds(MIN_PERIOD_MS));
        let handle = TimerHandle(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));
        self.timers.borrow_mut().insert(
            handle,
            Interval {
                period,
                next_due: self.clock.now() + period,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        tracing::trace!(handle = handle.0, period_ms = period.num_milliseconds(), "interval set");
        handle
    }

    fn clear_interval(&self, handle: TimerHandle) {
        self.timers.borrow_mut().remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn setup() -> (Rc<ManualClock>, ManualScheduler) {
        let clock = Rc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let sched = ManualScheduler::new(Rc::clone(&clock));
        (clock, sched)
    }

    #[test]
    fn fires_once_per_period() {
        let (clock, sched) = setup();
        let start = clock.now();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let h = Rc::clone(&hits);
        let c = Rc::clone(&clock);
        sched.set_interval(
            Duration::seconds(60),
            Box::new(move || h.borrow_mut().push(c.now())),
        );

        assert_eq!(sched.advance(Duration::seconds(59)), 0);
        assert_eq!(sched.advance(Duration::seconds(1)), 1);
        assert_eq!(sched.advance(Duration::seconds(150)), 2);
        assert_eq!(
            *hits.borrow(),
            vec![
                start + Duration::seconds(60),
                start + Duration::seconds(120),
                start + Duration::seconds(180),
            ]
        );
        assert_eq!(clock.now(), start + Duration::seconds(210));
    }

    #[test]
    fn cleared_interval_never_fires() {
        let (_clock, sched) = setup();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let handle = sched.set_interval(Duration::seconds(1), Box::new(move || h.set(h.get() + 1)));
        sched.clear_interval(handle);
        sched.clear_interval(handle);

        assert_eq!(sched.advance(Duration::seconds(10)), 0);
        assert_eq!(hits.get(), 0);
        assert!(!sched.is_active(handle));
    }

    #[test]
    fn equal_due_times_fire_in_handle_order() {
        let (_clock, sched) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let o = Rc::clone(&order);
            sched.set_interval(Duration::seconds(5), Box::new(move || o.borrow_mut().push(tag)));
        }
        sched.advance(Duration::seconds(5));
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn zero_period_is_clamped() {
        let (_clock, sched) = setup();
        sched.set_interval(Duration::zero(), Box::new(|| {}));
        assert_eq!(sched.advance(Duration::milliseconds(3)), 3);
    }
}
