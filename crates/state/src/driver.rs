use std::cell::Cell;
use std::rc::{Rc, Weak};

use foundation::Duration;
use runtime::{IntervalScheduler, TimerHandle, Visibility, VisibilitySource};

use crate::key;
use crate::store::StateStore;

/// Keeps `current_time` following the clock while live mode is on.
///
/// - live mode turning on starts a repeating tick (the store has already
///   snapped the time to now);
/// - each tick re-reads the clock and updates the time only if it moved;
/// - live mode turning off cancels the tick;
/// - the page becoming visible again while live forces an immediate update
///   and restarts the tick, so a backgrounded tab catches up at once.
///
/// At most one interval is registered at any time.
pub struct ClockDriver {
    inner: Rc<DriverInner>,
}

struct DriverInner {
    store: Rc<StateStore>,
    scheduler: Rc<dyn IntervalScheduler>,
    period: Duration,
    handle: Cell<Option<TimerHandle>>,
}

impl ClockDriver {
    /// Wires the driver to the store and the visibility source, and starts
    /// ticking right away if the store is already live.
    pub fn install(
        store: Rc<StateStore>,
        scheduler: Rc<dyn IntervalScheduler>,
        visibility: &dyn VisibilitySource,
        period: Duration,
    ) -> Self {
        let inner = Rc::new(DriverInner {
            store,
            scheduler,
            period,
            handle: Cell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        inner.store.subscribe::<key::IsRealtime>(move |live| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if *live {
                if inner.handle.get().is_none() {
                    restart(&inner);
                }
            } else {
                inner.stop();
            }
        });

        let weak = Rc::downgrade(&inner);
        visibility.on_change(Box::new(move |visibility| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if visibility == Visibility::Visible && inner.store.get_is_realtime() {
                inner.store.advance_live_time(inner.store.now());
                restart(&inner);
            }
        }));

        if inner.store.get_is_realtime() {
            restart(&inner);
        }
        Self { inner }
    }

    pub fn is_running(&self) -> bool {
        self.inner.handle.get().is_some()
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }
}

fn restart(inner: &Rc<DriverInner>) {
    inner.stop();
    let weak: Weak<DriverInner> = Rc::downgrade(inner);
    let handle = inner.scheduler.set_interval(
        inner.period,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.tick();
            }
        }),
    );
    inner.handle.set(Some(handle));
    tracing::debug!(
        handle = handle.0,
        period_ms = inner.period.num_milliseconds(),
        "live clock started"
    );
}

impl DriverInner {
    fn stop(&self) {
        if let Some(handle) = self.handle.take() {
            self.scheduler.clear_interval(handle);
            tracing::debug!(handle = handle.0, "live clock stopped");
        }
    }

    fn tick(&self) {
        if !self.store.get_is_realtime() {
            self.stop();
            return;
        }
        let now = self.store.now();
        if now != self.store.get_current_time() {
            self.store.advance_live_time(now);
        }
    }
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use chrono::{TimeZone, Utc};
    use foundation::{Clock, Instant, ManualClock};
    use runtime::{ManualScheduler, ManualVisibility};
    use std::cell::RefCell;

    struct Rig {
        clock: Rc<ManualClock>,
        sched: Rc<ManualScheduler>,
        visibility: ManualVisibility,
        store: Rc<StateStore>,
        driver: ClockDriver,
    }

    fn t0() -> Instant {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn rig() -> Rig {
        let clock = Rc::new(ManualClock::new(t0()));
        let sched = Rc::new(ManualScheduler::new(Rc::clone(&clock)));
        let visibility = ManualVisibility::new();
        let store = Rc::new(StateStore::new(&DashboardConfig::default(), clock.clone()));
        let driver = ClockDriver::install(
            Rc::clone(&store),
            sched.clone(),
            &visibility,
            Duration::seconds(60),
        );
        Rig {
            clock,
            sched,
            visibility,
            store,
            driver,
        }
    }

    fn record_times(store: &StateStore) -> Rc<RefCell<Vec<Instant>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        store.subscribe::<key::CurrentTime>(move |t| s.borrow_mut().push(*t));
        seen
    }

    #[test]
    fn starts_when_store_is_live() {
        let r = rig();
        assert!(r.driver.is_running());
        assert_eq!(r.sched.active_count(), 1);
        assert_eq!(r.driver.period(), Duration::seconds(60));
    }

    #[test]
    fn tick_fires_exactly_once_per_period() {
        let r = rig();
        let seen = record_times(&r.store);

        r.sched.advance(Duration::milliseconds(60_000));

        assert_eq!(*seen.borrow(), vec![t0() + Duration::seconds(60)]);
        assert_eq!(r.store.get_current_time(), r.clock.now());
    }

    #[test]
    fn pinned_time_does_not_move() {
        let r = rig();
        r.store.set_is_realtime(false);
        assert!(!r.driver.is_running());
        assert_eq!(r.sched.active_count(), 0);

        let seen = record_times(&r.store);
        r.sched.advance(Duration::seconds(60));
        assert!(seen.borrow().is_empty());
        assert_eq!(r.store.get_current_time(), t0());
    }

    #[test]
    fn explicit_time_stops_the_tick() {
        let r = rig();
        let pinned = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        r.store.set_current_time(pinned);
        assert!(!r.driver.is_running());
        r.sched.advance(Duration::minutes(10));
        assert_eq!(r.store.get_current_time(), pinned);
    }

    #[test]
    fn going_live_again_restarts_with_single_interval() {
        let r = rig();
        r.store.set_is_realtime(false);
        r.clock.advance(Duration::minutes(30));
        r.store.set_is_realtime(true);

        assert!(r.driver.is_running());
        assert_eq!(r.sched.active_count(), 1);
        assert_eq!(r.store.get_current_time(), t0() + Duration::minutes(30));

        let seen = record_times(&r.store);
        r.sched.advance(Duration::seconds(60));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn visible_again_catches_up_immediately() {
        let r = rig();
        let seen = record_times(&r.store);

        // Backgrounded tab: the clock moved but no tick has been delivered yet.
        r.clock.advance(Duration::seconds(45));
        r.visibility.emit(Visibility::Hidden);
        assert!(seen.borrow().is_empty());

        r.visibility.emit(Visibility::Visible);
        assert_eq!(*seen.borrow(), vec![t0() + Duration::seconds(45)]);
        assert_eq!(r.sched.active_count(), 1);

        // The restarted interval counts from the visibility change.
        r.sched.advance(Duration::seconds(59));
        assert_eq!(seen.borrow().len(), 1);
        r.sched.advance(Duration::seconds(1));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn visibility_is_ignored_when_pinned() {
        let r = rig();
        r.store.set_is_realtime(false);
        let seen = record_times(&r.store);
        r.clock.advance(Duration::minutes(2));
        r.visibility.emit(Visibility::Visible);
        assert!(seen.borrow().is_empty());
        assert_eq!(r.sched.active_count(), 0);
    }

    #[test]
    fn dropping_the_driver_clears_its_interval() {
        let r = rig();
        let sched = Rc::clone(&r.sched);
        drop(r.driver);
        assert_eq!(sched.active_count(), 0);
    }
}
