use std::cell::RefCell;
use std::rc::Rc;

use foundation::Clock;
use persistence::{PersistError, SnapshotStorage, StatePersistence};
use runtime::{IntervalScheduler, VisibilitySource};
use state::{ClockDriver, DashboardConfig, StateStore};

use crate::bootstrap::BootstrapMerger;
use crate::location::UrlLocation;
use crate::url_sync::{UrlOverrides, UrlSynchronizer};

/// Host services a session runs against.
pub struct SessionEnv {
    pub clock: Rc<dyn Clock>,
    pub scheduler: Rc<dyn IntervalScheduler>,
    pub visibility: Rc<dyn VisibilitySource>,
    pub location: Rc<dyn UrlLocation>,
    pub storage: Box<dyn SnapshotStorage>,
}

/// The dashboard session: one store plus everything that keeps it in sync.
///
/// Collaborators get the store through [`Session::store`] and call
/// [`Session::save_state`] after mutations worth keeping.
pub struct Session {
    store: Rc<StateStore>,
    persistence: RefCell<StatePersistence>,
    url: UrlSynchronizer,
    driver: ClockDriver,
    overrides: UrlOverrides,
    restored: bool,
}

impl Session {
    /// Startup order: defaults, saved snapshot, URL, merge, one resync if
    /// anything was restored, then URL mirroring and the live clock.
    pub fn start(config: &DashboardConfig, env: SessionEnv) -> Self {
        let SessionEnv {
            clock,
            scheduler,
            visibility,
            location,
            storage,
        } = env;

        let store = Rc::new(StateStore::new(config, Rc::clone(&clock)));
        let persistence = StatePersistence::new(storage, config.storage_key.clone());
        let saved = persistence.load(clock.now());

        let url = UrlSynchronizer::new(Rc::clone(&store), location);
        let overrides = url.apply_initial();
        let restored = BootstrapMerger::apply(&store, &overrides, saved.as_ref());

        let session_persistence = RefCell::new(persistence);
        if restored {
            url.resync_all();
            if let Err(err) = session_persistence.borrow_mut().save(&store.snapshot()) {
                tracing::warn!(error = %err, "failed to save merged state");
            }
        }
        url.install();

        let driver = ClockDriver::install(
            Rc::clone(&store),
            scheduler,
            visibility.as_ref(),
            config.tick_period(),
        );

        tracing::debug!(
            restored,
            live = store.get_is_realtime(),
            "session started"
        );
        Self {
            store,
            persistence: session_persistence,
            url,
            driver,
            overrides,
            restored,
        }
    }

    pub fn store(&self) -> &Rc<StateStore> {
        &self.store
    }

    /// Persists the current state; returns the stored JSON.
    pub fn save_state(&self) -> Result<String, PersistError> {
        self.persistence.borrow_mut().save(&self.store.snapshot())
    }

    /// Removes the saved snapshot.
    pub fn clear_saved_state(&self) -> Result<bool, PersistError> {
        self.persistence.borrow_mut().clear()
    }

    /// Current share query, including its leading `?` when non-empty.
    pub fn share_query(&self) -> String {
        self.url.location().search()
    }

    pub fn url_overrides(&self) -> &UrlOverrides {
        &self.overrides
    }

    /// Whether startup took anything from the saved snapshot.
    pub fn restored_from_storage(&self) -> bool {
        self.restored
    }

    pub fn clock_driver(&self) -> &ClockDriver {
        &self.driver
    }
}
