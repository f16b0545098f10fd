use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::audit::{IndexAuditEventBuilder, IndexAuditStage};
use crate::error::{PoolError, Result};
use crate::events::{DEFAULT_PRIORITY, EventHub, INDEX_PRIORITY, Subscription, SubscriptionTable};
use crate::logging::{LogLevel, META_TARGET, json_kv, json_str};
use crate::pool::Pool;
use crate::resource::{Lookup, Resource, ResourceKey};

use super::{ManagerConfig, PoolEvent, PoolIndex, PoolManager};

/// Identifier of a registered library. The empty id stands for "the default
/// library" wherever a library is addressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The unqualified id, resolved through the default library.
    pub fn unqualified() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LibraryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LibraryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&LibraryId> for LibraryId {
    fn from(id: &LibraryId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for LibraryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A library manager's pool event, tagged with the library it came from.
#[derive(Debug, Clone)]
pub struct LibraryPoolEvent<I: Resource> {
    pub library: LibraryId,
    pub event: PoolEvent<I>,
}

struct MetaState<I: Resource> {
    libraries: RefCell<IndexMap<LibraryId, PoolManager<I>>>,
    default: RefCell<Option<LibraryId>>,
    seeded_default: Cell<bool>,
    links: RefCell<SubscriptionTable<LibraryId>>,
    events: EventHub<LibraryPoolEvent<I>>,
    config: ManagerConfig,
}

impl<I: Resource> MetaState<I> {
    fn resolve(&self, lib: LibraryId) -> Result<LibraryId> {
        let lib = if lib.is_empty() {
            self.default
                .borrow()
                .clone()
                .ok_or(PoolError::NoDefaultLibrary)?
        } else {
            lib
        };
        if self.libraries.borrow().contains_key(&lib) {
            Ok(lib)
        } else {
            Err(PoolError::UnknownLibrary(lib))
        }
    }

    fn manager(&self, lib: LibraryId) -> Result<(LibraryId, PoolManager<I>)> {
        let lib = self.resolve(lib)?;
        let manager = self
            .libraries
            .borrow()
            .get(&lib)
            .cloned()
            .ok_or_else(|| PoolError::UnknownLibrary(lib.clone()))?;
        Ok((lib, manager))
    }

    /// Registered managers in registration order, cloned out so no borrow is
    /// held while they run.
    fn snapshot(&self) -> Vec<(LibraryId, PoolManager<I>)> {
        self.libraries
            .borrow()
            .iter()
            .map(|(lib, manager)| (lib.clone(), manager.clone()))
            .collect()
    }

    fn set_default(&self, lib: Option<LibraryId>) {
        let stage = match &lib {
            Some(_) => IndexAuditStage::DefaultLibraryChanged,
            None => IndexAuditStage::DefaultLibraryCleared,
        };
        let label = lib.as_ref().map(LibraryId::to_string).unwrap_or_default();
        *self.default.borrow_mut() = lib;

        self.config.record(
            IndexAuditEventBuilder::new(stage)
                .detail("library", label.clone())
                .finish(),
        );
        self.config
            .log(LogLevel::Info, "default_library", [json_str("library", label)]);
    }

    fn reject(&self, err: &PoolError) {
        self.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::MutationRejected)
                .detail("error", err.kind())
                .finish(),
        );
        self.config.log(
            LogLevel::Warn,
            "mutation_rejected",
            [json_str("error", err.to_string()), json_str("kind", err.kind())],
        );
    }
}

/// Composes independent [`PoolManager`]s, one per library, behind one
/// facade.
///
/// Libraries are separate uniqueness domains: the same item key may live in
/// several of them and no cross-library index is kept. Item queries fan out
/// to every library in registration order. Library-addressed calls accept
/// the empty [`LibraryId`], which resolves to the default library.
///
/// The first library ever registered becomes the default. Unregistering the
/// default clears it and it stays unset until
/// [`set_default_library`](Self::set_default_library) is called.
pub struct MetaPoolManager<I: Resource> {
    state: Rc<MetaState<I>>,
}

impl<I: Resource> MetaPoolManager<I> {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default().with_target(META_TARGET))
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            state: Rc::new(MetaState {
                libraries: RefCell::new(IndexMap::new()),
                default: RefCell::new(None),
                seeded_default: Cell::new(false),
                links: RefCell::new(SubscriptionTable::new()),
                events: EventHub::new(),
                config,
            }),
        }
    }

    pub fn register_library(
        &self,
        lib: impl Into<LibraryId>,
        manager: PoolManager<I>,
    ) -> Result<()> {
        let lib = lib.into();
        if lib.is_empty() {
            let err = PoolError::InvalidLibraryId;
            self.state.reject(&err);
            return Err(err);
        }
        if self.state.libraries.borrow().contains_key(&lib) {
            let err = PoolError::DuplicateLibrary(lib);
            self.state.reject(&err);
            return Err(err);
        }

        let weak: Weak<MetaState<I>> = Rc::downgrade(&self.state);
        let tag = lib.clone();
        let forward = manager.subscribe_with_priority(INDEX_PRIORITY, move |event| {
            if let Some(state) = weak.upgrade() {
                state.events.emit(&LibraryPoolEvent {
                    library: tag.clone(),
                    event: event.clone(),
                });
            }
        });
        let pools = manager.pool_count();
        self.state.links.borrow_mut().attach(lib.clone(), [forward]);
        self.state
            .libraries
            .borrow_mut()
            .insert(lib.clone(), manager);

        self.state.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::LibraryRegistered)
                .detail("library", lib.to_string())
                .detail("pools", pools)
                .finish(),
        );
        self.state.config.log(
            LogLevel::Info,
            "library_registered",
            [json_str("library", lib.to_string())],
        );

        if !self.state.seeded_default.replace(true) {
            self.state.set_default(Some(lib));
        }
        Ok(())
    }

    /// Removes a library and its forwarding handlers. Absence is not an
    /// error. Unregistering the default library leaves no default.
    pub fn unregister_library(&self, lib: impl Into<LibraryId>) -> Option<PoolManager<I>> {
        let lib = lib.into();
        let manager = self.state.libraries.borrow_mut().shift_remove(&lib)?;
        self.state.links.borrow_mut().detach(&lib);

        self.state.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::LibraryUnregistered)
                .detail("library", lib.to_string())
                .finish(),
        );
        self.state.config.log(
            LogLevel::Info,
            "library_unregistered",
            [json_str("library", lib.to_string())],
        );

        let was_default = self.state.default.borrow().as_ref() == Some(&lib);
        if was_default {
            self.state.set_default(None);
        }
        Some(manager)
    }

    pub fn set_default_library(&self, lib: impl Into<LibraryId>) -> Result<()> {
        let lib = lib.into();
        if !self.state.libraries.borrow().contains_key(&lib) {
            let err = PoolError::UnknownLibrary(lib);
            self.state.reject(&err);
            return Err(err);
        }
        self.state.set_default(Some(lib));
        Ok(())
    }

    pub fn default_library(&self) -> Option<LibraryId> {
        self.state.default.borrow().clone()
    }

    /// Substitutes the default for the empty id and checks registration.
    pub fn resolve(&self, lib: impl Into<LibraryId>) -> Result<LibraryId> {
        self.state.resolve(lib.into())
    }

    pub fn manager(&self, lib: impl Into<LibraryId>) -> Result<PoolManager<I>> {
        self.state.manager(lib.into()).map(|(_, manager)| manager)
    }

    /// Registered library ids in registration order.
    pub fn libraries(&self) -> Vec<LibraryId> {
        self.state.libraries.borrow().keys().cloned().collect()
    }

    pub fn contains_library(&self, lib: &LibraryId) -> bool {
        self.state.libraries.borrow().contains_key(lib)
    }

    pub fn library_count(&self) -> usize {
        self.state.libraries.borrow().len()
    }

    /// First pool owning `key`, visiting libraries in registration order.
    pub fn pool_from_item_key(&self, key: &ResourceKey) -> Option<Pool<I>> {
        self.locate_item(key).map(|(_, pool)| pool)
    }

    /// Like [`pool_from_item_key`](Self::pool_from_item_key), also naming
    /// the library that answered.
    pub fn locate_item(&self, key: &ResourceKey) -> Option<(LibraryId, Pool<I>)> {
        self.state
            .snapshot()
            .into_iter()
            .find_map(|(lib, manager)| manager.pool_from_item_key(key).map(|pool| (lib, pool)))
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.state
            .snapshot()
            .iter()
            .any(|(_, manager)| manager.contains(key))
    }

    /// Every indexed item key, library by library. A key indexed in two
    /// libraries is listed twice.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.state
            .snapshot()
            .iter()
            .flat_map(|(_, manager)| manager.keys())
            .collect()
    }

    /// Resets every library manager. Registrations and the default stay.
    pub fn reset(&self) {
        let libraries = self.state.snapshot();
        for (_, manager) in &libraries {
            manager.reset();
        }
        self.state.config.log(
            LogLevel::Info,
            "libraries_reset",
            [json_kv("libraries", libraries.len())],
        );
    }

    /// The merged pool facade.
    pub fn pools(&self) -> MergedPools<'_, I> {
        MergedPools { meta: self }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LibraryPoolEvent<I>) + 'static,
    {
        self.state.events.subscribe_with_priority(DEFAULT_PRIORITY, handler)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.state.config
    }
}

impl<I: Resource> Clone for MetaPoolManager<I> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<I: Resource> Default for MetaPoolManager<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Resource> PoolIndex<I> for MetaPoolManager<I> {
    fn pool_from_item_key(&self, key: &ResourceKey) -> Option<Pool<I>> {
        MetaPoolManager::pool_from_item_key(self, key)
    }

    fn contains(&self, key: &ResourceKey) -> bool {
        MetaPoolManager::contains(self, key)
    }

    fn keys(&self) -> Vec<ResourceKey> {
        MetaPoolManager::keys(self)
    }

    fn reset(&self) {
        MetaPoolManager::reset(self)
    }
}

/// Every library's pools behind one collection-like surface. Pools are
/// addressed by library plus key or name; the empty library resolves to the
/// default.
pub struct MergedPools<'a, I: Resource> {
    meta: &'a MetaPoolManager<I>,
}

impl<I: Resource> MergedPools<'_, I> {
    pub fn get(&self, lib: impl Into<LibraryId>, lookup: impl Into<Lookup>) -> Result<Option<Pool<I>>> {
        let manager = self.meta.manager(lib)?;
        Ok(manager.pool(lookup))
    }

    pub fn contains(&self, lib: impl Into<LibraryId>, lookup: impl Into<Lookup>) -> Result<bool> {
        let manager = self.meta.manager(lib)?;
        Ok(manager.pools().contains(lookup))
    }

    pub fn add(&self, lib: impl Into<LibraryId>, pool: Pool<I>) -> Result<()> {
        self.meta.manager(lib)?.add_pool(pool)
    }

    pub fn remove(&self, lib: impl Into<LibraryId>, lookup: impl Into<Lookup>) -> Result<Option<Pool<I>>> {
        let manager = self.meta.manager(lib)?;
        Ok(manager.remove_pool(lookup))
    }

    /// Every pool, tagged with its library, in registration then insertion
    /// order.
    pub fn to_vec(&self) -> Vec<(LibraryId, Pool<I>)> {
        self.meta
            .state
            .snapshot()
            .into_iter()
            .flat_map(|(lib, manager)| {
                manager
                    .pools()
                    .to_vec()
                    .into_iter()
                    .map(move |pool| (lib.clone(), pool))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.meta
            .state
            .snapshot()
            .iter()
            .map(|(_, manager)| manager.pool_count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
