use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::json;

use crate::audit::{IndexAuditEventBuilder, IndexAuditStage};
use crate::error::{PoolError, Result};
use crate::events::{DEFAULT_PRIORITY, EventHub, INDEX_PRIORITY, Subscription, SubscriptionTable};
use crate::logging::{LogLevel, json_kv, json_str};
use crate::metrics::MetricSnapshot;
use crate::pool::Pool;
use crate::resource::{Lookup, Resource, ResourceCollection, ResourceEvent, ResourceKey};

use super::{ManagerConfig, PoolIndex};

/// Pool level notification re-emitted by a manager to its subscribers.
#[derive(Debug, Clone)]
pub enum PoolEvent<I: Resource> {
    Added(Pool<I>),
    Removed(Pool<I>),
    Modified(Pool<I>),
}

impl<I: Resource> PoolEvent<I> {
    pub fn pool(&self) -> &Pool<I> {
        match self {
            PoolEvent::Added(pool) | PoolEvent::Removed(pool) | PoolEvent::Modified(pool) => pool,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            PoolEvent::Added(_) => "pool_added",
            PoolEvent::Removed(_) => "pool_removed",
            PoolEvent::Modified(_) => "pool_modified",
        }
    }
}

struct ManagerState<I: Resource> {
    pools: ResourceCollection<Pool<I>>,
    /// Item key -> key of the owning pool.
    index: RefCell<HashMap<ResourceKey, ResourceKey>>,
    /// Handlers installed on each managed pool, keyed by pool key.
    links: RefCell<SubscriptionTable<ResourceKey>>,
    events: EventHub<PoolEvent<I>>,
    config: ManagerConfig,
    own: RefCell<Vec<Subscription>>,
}

impl<I: Resource> ManagerState<I> {
    fn check_pool_items(&self, pool: &Pool<I>) -> Result<()> {
        let index = self.index.borrow();
        match pool.item_keys().into_iter().find(|key| index.contains_key(key)) {
            Some(key) => Err(PoolError::DuplicateItemKey(key)),
            None => Ok(()),
        }
    }

    fn check_item_key(&self, pool_key: ResourceKey, item: &I) -> Result<()> {
        let key = item.key();
        if !self.index.borrow().contains_key(&key) {
            return Ok(());
        }
        let err = PoolError::DuplicateItemKey(key);
        self.reject(&err, [json_str("pool", pool_key.to_string())]);
        Err(err)
    }

    fn reject<F>(&self, err: &PoolError, fields: F)
    where
        F: IntoIterator<Item = (String, serde_json::Value)>,
    {
        self.config.update_metrics(|metrics| metrics.record_rejection());
        self.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::MutationRejected)
                .detail("error", err.kind())
                .finish(),
        );
        let fields = fields
            .into_iter()
            .chain([json_str("error", err.to_string()), json_kv("kind", err.kind())]);
        self.config.log(LogLevel::Warn, "mutation_rejected", fields);
    }

    fn on_pool_event(self: &Rc<Self>, event: &ResourceEvent<Pool<I>>) {
        match event {
            ResourceEvent::Added { resource, .. } => self.on_pool_added(resource),
            ResourceEvent::Removed { resource, .. } => self.on_pool_removed(resource),
            ResourceEvent::Modified { resource, .. } => self.on_pool_modified(resource),
        }
    }

    fn on_pool_added(self: &Rc<Self>, pool: &Pool<I>) {
        let pool_key = pool.key();
        let item_keys = pool.item_keys();
        {
            let mut index = self.index.borrow_mut();
            for key in &item_keys {
                index.insert(*key, pool_key);
            }
        }

        let weak = Rc::downgrade(self);
        let guard = pool
            .items()
            .guard_adding_with_priority(INDEX_PRIORITY, move |item: &I| {
                match weak.upgrade() {
                    Some(state) => state.check_item_key(pool_key, item),
                    None => Ok(()),
                }
            });
        let weak = Rc::downgrade(self);
        let tracker = pool
            .items()
            .subscribe_with_priority(INDEX_PRIORITY, move |event: &ResourceEvent<I>| {
                if let Some(state) = weak.upgrade() {
                    state.on_item_event(pool_key, event);
                }
            });
        self.links.borrow_mut().attach(pool_key, [guard, tracker]);

        self.config
            .update_metrics(|metrics| metrics.record_pool_added(item_keys.len()));
        self.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::PoolAdded)
                .detail("pool", pool_key.to_string())
                .detail("items", item_keys.len())
                .finish(),
        );
        self.config.log(
            LogLevel::Info,
            "pool_added",
            [
                json_str("pool", pool.name()),
                json_str("key", pool_key.to_string()),
                json_kv("items", json!(item_keys.len())),
            ],
        );
        self.events.emit(&PoolEvent::Added(pool.clone()));
    }

    fn on_pool_removed(&self, pool: &Pool<I>) {
        let pool_key = pool.key();
        self.links.borrow_mut().detach(&pool_key);

        // Item keys are independent of pool keys, so filter by owner.
        let dropped = {
            let mut index = self.index.borrow_mut();
            let before = index.len();
            index.retain(|_, owner| *owner != pool_key);
            before - index.len()
        };

        self.config
            .update_metrics(|metrics| metrics.record_pool_removed(dropped));
        self.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::PoolRemoved)
                .detail("pool", pool_key.to_string())
                .detail("items", dropped)
                .finish(),
        );
        self.config.log(
            LogLevel::Info,
            "pool_removed",
            [
                json_str("pool", pool.name()),
                json_str("key", pool_key.to_string()),
                json_kv("items", json!(dropped)),
            ],
        );
        self.events.emit(&PoolEvent::Removed(pool.clone()));
    }

    fn on_pool_modified(&self, pool: &Pool<I>) {
        self.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::PoolModified)
                .detail("pool", pool.key().to_string())
                .finish(),
        );
        self.config.log(
            LogLevel::Debug,
            "pool_modified",
            [json_str("pool", pool.name())],
        );
        self.events.emit(&PoolEvent::Modified(pool.clone()));
    }

    fn on_item_event(&self, pool_key: ResourceKey, event: &ResourceEvent<I>) {
        match event {
            ResourceEvent::Added { key, .. } => {
                self.index.borrow_mut().insert(*key, pool_key);
                self.config
                    .update_metrics(|metrics| metrics.record_items_indexed(1));
                self.config.log(
                    LogLevel::Trace,
                    "item_indexed",
                    [
                        json_str("item", key.to_string()),
                        json_str("pool", pool_key.to_string()),
                    ],
                );
            }
            ResourceEvent::Removed { key, .. } => {
                let removed = {
                    let mut index = self.index.borrow_mut();
                    match index.get(key) {
                        Some(owner) if *owner == pool_key => index.remove(key).is_some(),
                        _ => false,
                    }
                };
                if removed {
                    self.config
                        .update_metrics(|metrics| metrics.record_items_unindexed(1));
                    self.config.log(
                        LogLevel::Trace,
                        "item_unindexed",
                        [
                            json_str("item", key.to_string()),
                            json_str("pool", pool_key.to_string()),
                        ],
                    );
                }
            }
            ResourceEvent::Modified { .. } => {}
        }
    }
}

/// Owns a collection of pools and keeps an item key -> pool index current.
///
/// The index is maintained purely from collection events: adding a pool
/// (through [`add_pool`](Self::add_pool) or directly on
/// [`pools`](Self::pools)) indexes its items and subscribes to the pool's
/// item events, removing it unsubscribes and drops its entries. Item keys are
/// unique across every pool of one manager; a colliding pool or item is
/// rejected before anything changes.
///
/// `PoolManager` is a shared handle; clones address the same manager.
pub struct PoolManager<I: Resource> {
    state: Rc<ManagerState<I>>,
}

impl<I: Resource> PoolManager<I> {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let state = Rc::new(ManagerState {
            pools: ResourceCollection::new(),
            index: RefCell::new(HashMap::new()),
            links: RefCell::new(SubscriptionTable::new()),
            events: EventHub::new(),
            config,
            own: RefCell::new(Vec::new()),
        });

        let weak: Weak<ManagerState<I>> = Rc::downgrade(&state);
        let guard = state
            .pools
            .guard_adding_with_priority(INDEX_PRIORITY, move |pool: &Pool<I>| {
                match weak.upgrade() {
                    Some(state) => state.check_pool_items(pool),
                    None => Ok(()),
                }
            });
        let weak = Rc::downgrade(&state);
        let tracker = state.pools.subscribe_with_priority(
            INDEX_PRIORITY,
            move |event: &ResourceEvent<Pool<I>>| {
                if let Some(state) = weak.upgrade() {
                    state.on_pool_event(event);
                }
            },
        );
        state.own.borrow_mut().extend([guard, tracker]);

        Self { state }
    }

    /// The owned pool collection. Mutating it directly is equivalent to the
    /// manager level operations. Dropping everything at once goes through
    /// [`reset`](Self::reset):
    ///
    /// ```compile_fail
    /// use pool_registry::{Item, PoolManager};
    ///
    /// let manager: PoolManager<Item> = PoolManager::new();
    /// manager.pools().clear();
    /// ```
    pub fn pools(&self) -> &ResourceCollection<Pool<I>> {
        &self.state.pools
    }

    pub fn add_pool(&self, pool: Pool<I>) -> Result<()> {
        let name = pool.name();
        self.state.pools.add(pool).inspect_err(|err| {
            self.state.reject(err, [json_str("pool", name)]);
        })
    }

    /// Removes a pool and everything indexed under it. Absence is not an
    /// error.
    pub fn remove_pool(&self, lookup: impl Into<Lookup>) -> Option<Pool<I>> {
        self.state.pools.remove(lookup)
    }

    pub fn rename_pool(&self, lookup: impl Into<Lookup>, name: impl Into<String>) -> Result<()> {
        let lookup = lookup.into();
        let label = lookup.to_string();
        self.state.pools.rename(lookup, name).inspect_err(|err| {
            self.state.reject(err, [json_str("pool", label)]);
        })
    }

    pub fn pool(&self, lookup: impl Into<Lookup>) -> Option<Pool<I>> {
        self.state.pools.get(lookup)
    }

    pub fn pool_count(&self) -> usize {
        self.state.pools.len()
    }

    /// Returns the pool owning `key`, or `None` when no pool does.
    pub fn pool_from_item_key(&self, key: &ResourceKey) -> Option<Pool<I>> {
        let pool_key = *self.state.index.borrow().get(key)?;
        self.state.pools.get(pool_key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.state.index.borrow().contains_key(key)
    }

    /// Every indexed item key, sorted.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.state.index.borrow().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn item_count(&self) -> usize {
        self.state.index.borrow().len()
    }

    /// Drops every pool, index entry and per-pool handler in one step.
    ///
    /// No per-pool or per-item removal events are emitted; a reset is a
    /// single bulk transition.
    pub fn reset(&self) {
        let pools = self.state.pools.clear();
        self.state.links.borrow_mut().clear();
        let items = {
            let mut index = self.state.index.borrow_mut();
            let count = index.len();
            index.clear();
            count
        };

        self.state.config.update_metrics(|metrics| metrics.record_reset());
        self.state.config.record(
            IndexAuditEventBuilder::new(IndexAuditStage::IndexReset)
                .detail("pools", pools)
                .detail("items", items)
                .finish(),
        );
        self.state.config.log(
            LogLevel::Info,
            "index_reset",
            [json_kv("pools", json!(pools)), json_kv("items", json!(items))],
        );
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PoolEvent<I>) + 'static,
    {
        self.state.events.subscribe_with_priority(DEFAULT_PRIORITY, handler)
    }

    pub fn subscribe_with_priority<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&PoolEvent<I>) + 'static,
    {
        self.state.events.subscribe_with_priority(priority, handler)
    }

    /// Digest of the index contents. Managers with equal fingerprints map the
    /// same item keys to the same pool keys.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut pairs: Vec<(ResourceKey, ResourceKey)> = self
            .state
            .index
            .borrow()
            .iter()
            .map(|(item, pool)| (*item, *pool))
            .collect();
        pairs.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for (item, pool) in pairs {
            hasher.update(item.as_bytes());
            hasher.update(pool.as_bytes());
        }
        hasher.finalize()
    }

    /// Rescans every pool and compares the result with the maintained index.
    pub fn is_consistent(&self) -> bool {
        let mut scanned = HashMap::new();
        for pool in self.state.pools.to_vec() {
            for key in pool.item_keys() {
                if scanned.insert(key, pool.key()).is_some() {
                    return false;
                }
            }
        }
        *self.state.index.borrow() == scanned
            && self.state.links.borrow().len() == self.state.pools.len()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.state.config.metrics.as_ref()?;
        let guard = metrics.lock().ok()?;
        Some(guard.snapshot(self.pool_count(), self.item_count()))
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.state.config
    }

    pub fn same_manager(&self, other: &PoolManager<I>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<I: Resource> Clone for PoolManager<I> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<I: Resource> Default for PoolManager<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Resource> PoolIndex<I> for PoolManager<I> {
    fn pool_from_item_key(&self, key: &ResourceKey) -> Option<Pool<I>> {
        PoolManager::pool_from_item_key(self, key)
    }

    fn contains(&self, key: &ResourceKey) -> bool {
        PoolManager::contains(self, key)
    }

    fn keys(&self) -> Vec<ResourceKey> {
        PoolManager::keys(self)
    }

    fn reset(&self) {
        PoolManager::reset(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::BufferedIndexAudit;
    use crate::logging::{Logger, MemorySink};
    use crate::resource::Item;
    use std::cell::Cell;

    fn pool_of(name: &str, items: &[&str]) -> (Pool<Item>, Vec<Item>) {
        let items: Vec<Item> = items.iter().map(|name| Item::new(*name)).collect();
        let pool = Pool::with_items(name, items.clone()).unwrap();
        (pool, items)
    }

    fn event_log(manager: &PoolManager<Item>) -> (Rc<RefCell<Vec<(String, String)>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = manager.subscribe(move |event| {
            sink.borrow_mut()
                .push((event.describe().to_string(), event.pool().name()));
        });
        (log, sub)
    }

    #[test]
    fn add_pool_indexes_existing_items() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass", "water"]);
        manager.add_pool(terrain.clone()).unwrap();

        assert_eq!(manager.pool_from_item_key(&items[0].key()), Some(terrain.clone()));
        assert_eq!(manager.pool_from_item_key(&items[1].key()), Some(terrain));
        assert_eq!(manager.item_count(), 2);
        assert!(manager.is_consistent());
    }

    #[test]
    fn item_mutations_after_add_keep_index_current() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass"]);
        manager.add_pool(terrain.clone()).unwrap();

        let sand = Item::new("sand");
        terrain.add_item(sand.clone()).unwrap();
        assert!(manager.contains(&sand.key()));

        terrain.remove_item(items[0].key());
        assert!(!manager.contains(&items[0].key()));
        assert_eq!(manager.keys(), vec![sand.key()]);
        assert!(manager.is_consistent());
    }

    #[test]
    fn duplicate_item_key_across_pools_rejects_pool() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass"]);
        manager.add_pool(terrain).unwrap();
        let (log, _sub) = event_log(&manager);

        let clash = Pool::with_items("decor", [Item::with_key(items[0].key(), "flower")]).unwrap();
        assert_eq!(
            manager.add_pool(clash.clone()).unwrap_err(),
            PoolError::DuplicateItemKey(items[0].key())
        );

        assert_eq!(manager.pool_count(), 1);
        assert!(!manager.pools().contains("decor"));
        assert_eq!(manager.pool_from_item_key(&items[0].key()).unwrap().name(), "terrain");
        assert!(log.borrow().is_empty());

        // The rejected pool was never wired into the index.
        let stray = Item::new("stray");
        clash.add_item(stray.clone()).unwrap();
        assert!(!manager.contains(&stray.key()));
        assert!(manager.is_consistent());
    }

    #[test]
    fn duplicate_item_key_added_to_managed_pool_is_rejected() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass"]);
        let (decor, _) = pool_of("decor", &[]);
        manager.add_pool(terrain).unwrap();
        manager.add_pool(decor.clone()).unwrap();

        let err = decor
            .add_item(Item::with_key(items[0].key(), "flower"))
            .unwrap_err();
        assert_eq!(err, PoolError::DuplicateItemKey(items[0].key()));
        assert!(decor.is_empty());
        assert!(manager.is_consistent());
    }

    #[test]
    fn duplicate_pool_key_or_name_leaves_manager_unchanged() {
        let manager = PoolManager::new();
        let (terrain, _) = pool_of("terrain", &["grass"]);
        manager.add_pool(terrain.clone()).unwrap();

        let same_key: Pool<Item> = Pool::with_key(terrain.key(), "other");
        assert_eq!(
            manager.add_pool(same_key).unwrap_err(),
            PoolError::DuplicateKey(terrain.key())
        );
        let (same_name, extra) = pool_of("terrain", &["rock"]);
        assert_eq!(
            manager.add_pool(same_name).unwrap_err(),
            PoolError::DuplicateName("terrain".to_string())
        );

        assert_eq!(manager.pool_count(), 1);
        assert!(!manager.contains(&extra[0].key()));
        assert!(manager.is_consistent());
    }

    #[test]
    fn remove_pool_unindexes_and_unsubscribes() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass", "water"]);
        let (decor, decor_items) = pool_of("decor", &["flower"]);
        manager.add_pool(terrain.clone()).unwrap();
        manager.add_pool(decor).unwrap();

        assert_eq!(manager.remove_pool("terrain"), Some(terrain.clone()));
        assert!(!manager.contains(&items[0].key()));
        assert!(!manager.contains(&items[1].key()));
        assert!(manager.contains(&decor_items[0].key()));

        // The detached pool no longer feeds the index.
        let late = Item::new("late");
        terrain.add_item(late.clone()).unwrap();
        assert!(!manager.contains(&late.key()));
        assert!(manager.is_consistent());
        assert_eq!(manager.remove_pool("terrain"), None);
    }

    #[test]
    fn readding_equivalent_pool_restores_fingerprint() {
        let manager = PoolManager::new();
        let (terrain, _) = pool_of("terrain", &["grass"]);
        manager.add_pool(terrain.clone()).unwrap();
        let baseline = manager.fingerprint();

        let (decor, _) = pool_of("decor", &["flower", "bush"]);
        manager.add_pool(decor.clone()).unwrap();
        assert_ne!(manager.fingerprint(), baseline);

        manager.remove_pool(decor.key());
        assert_eq!(manager.fingerprint(), baseline);

        let fresh = PoolManager::new();
        fresh.add_pool(terrain.clone()).unwrap();
        assert_eq!(fresh.fingerprint(), baseline);
    }

    #[test]
    fn events_are_reemitted_with_consistent_index() {
        let manager = PoolManager::new();
        let observed = Rc::new(Cell::new(0usize));
        let view = manager.clone();
        let counter = Rc::clone(&observed);
        let _sub = manager.subscribe(move |event| {
            assert!(view.is_consistent());
            if let PoolEvent::Added(pool) = event {
                counter.set(counter.get() + pool.len());
            }
        });
        let (log, _log_sub) = event_log(&manager);

        let (terrain, _) = pool_of("terrain", &["grass", "water"]);
        manager.add_pool(terrain.clone()).unwrap();
        manager.rename_pool("terrain", "ground").unwrap();
        manager.remove_pool(terrain.key());

        assert_eq!(observed.get(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                ("pool_added".to_string(), "terrain".to_string()),
                ("pool_modified".to_string(), "ground".to_string()),
                ("pool_removed".to_string(), "ground".to_string()),
            ]
        );
    }

    #[test]
    fn user_item_handlers_see_index_first() {
        let manager = PoolManager::new();
        let (terrain, _) = pool_of("terrain", &[]);
        let view = manager.clone();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        // Subscribed before the pool joins the manager.
        let _sub = terrain.items().subscribe(move |event| {
            assert_eq!(
                view.contains(&event.key()),
                matches!(event, ResourceEvent::Added { .. })
            );
            counter.set(counter.get() + 1);
        });
        manager.add_pool(terrain.clone()).unwrap();

        let grass = Item::new("grass");
        terrain.add_item(grass.clone()).unwrap();
        terrain.remove_item("grass");
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn direct_collection_mutation_is_tracked() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass"]);
        manager.pools().add(terrain).unwrap();
        assert!(manager.contains(&items[0].key()));

        manager.pools().remove("terrain");
        assert!(!manager.contains(&items[0].key()));
    }

    #[test]
    fn every_public_removal_path_keeps_index_current() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass", "water", "sand", "rock"]);
        let (decor, decor_items) = pool_of("decor", &["flower"]);
        let (ruins, ruin_items) = pool_of("ruins", &["pillar"]);
        manager.add_pool(terrain.clone()).unwrap();
        manager.add_pool(decor.clone()).unwrap();
        manager.add_pool(ruins).unwrap();

        terrain.remove_item("grass");
        terrain.items().remove(items[1].key());
        terrain.items().try_remove("sand").unwrap();
        terrain.rename_item("rock", "stone").unwrap();
        terrain
            .items()
            .modify("stone", |item| {
                item.properties.insert("solid".into(), "true".into());
            })
            .unwrap();
        for item in &items[..3] {
            assert!(!manager.contains(&item.key()));
        }
        assert_eq!(manager.pool_from_item_key(&items[3].key()), Some(terrain.clone()));
        assert!(manager.is_consistent());

        manager.pools().try_remove("decor").unwrap();
        assert!(!manager.contains(&decor_items[0].key()));
        manager.pools().remove("ruins");
        assert!(!manager.contains(&ruin_items[0].key()));

        // Neither removed pool feeds the index any longer.
        decor.add_item(Item::new("bush")).unwrap();
        assert_eq!(manager.keys(), vec![items[3].key()]);
        assert!(manager.is_consistent());
    }

    #[test]
    fn reset_clears_silently() {
        let manager = PoolManager::new();
        let (terrain, items) = pool_of("terrain", &["grass"]);
        manager.add_pool(terrain.clone()).unwrap();
        let (log, _sub) = event_log(&manager);

        manager.reset();

        assert!(log.borrow().is_empty());
        assert_eq!(manager.pool_count(), 0);
        assert_eq!(manager.item_count(), 0);
        assert!(manager.pool_from_item_key(&items[0].key()).is_none());

        // Handlers on the old pool were dropped with the reset.
        terrain.add_item(Item::new("sand")).unwrap();
        assert_eq!(manager.item_count(), 0);
        assert!(manager.is_consistent());

        // The manager stays usable.
        manager.add_pool(terrain).unwrap();
        assert_eq!(manager.item_count(), 2);
    }

    #[test]
    fn observability_hooks_record_transitions() {
        let sink = MemorySink::new();
        let audit = BufferedIndexAudit::new();
        let mut config = ManagerConfig::default()
            .with_logger(Logger::new(sink.clone()))
            .with_audit(audit.clone());
        config.enable_metrics();
        let manager = PoolManager::with_config(config);

        let (terrain, items) = pool_of("terrain", &["grass", "water"]);
        manager.add_pool(terrain.clone()).unwrap();
        let _ = manager.add_pool(Pool::with_items("clash", [items[0].clone()]).unwrap());
        terrain.remove_item("water");
        manager.reset();

        assert_eq!(
            audit.stages(),
            vec![
                IndexAuditStage::PoolAdded,
                IndexAuditStage::MutationRejected,
                IndexAuditStage::IndexReset,
            ]
        );
        let messages = sink.messages();
        assert!(messages.contains(&"pool_added".to_string()));
        assert!(messages.contains(&"mutation_rejected".to_string()));
        assert!(messages.contains(&"item_unindexed".to_string()));
        assert!(messages.contains(&"index_reset".to_string()));

        let snapshot = manager.metrics_snapshot().unwrap();
        assert_eq!(snapshot.pools_added, 1);
        assert_eq!(snapshot.items_indexed, 2);
        assert_eq!(snapshot.items_unindexed, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.resets, 1);
    }

    #[test]
    fn random_mutations_keep_index_equal_to_scan() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let manager: PoolManager<Item> = PoolManager::new();
        let mut detached: Vec<Pool<Item>> = Vec::new();
        let mut seen: Vec<Item> = Vec::new();

        for step in 0..400 {
            let pools = manager.pools().to_vec();
            match rng.gen_range(0..6) {
                0 => {
                    let pool = Pool::new(format!("pool-{step}"));
                    manager.add_pool(pool).unwrap();
                }
                1 if !pools.is_empty() => {
                    let victim = &pools[rng.gen_range(0..pools.len())];
                    detached.extend(manager.remove_pool(victim.key()));
                }
                2 | 3 if !pools.is_empty() => {
                    let target = &pools[rng.gen_range(0..pools.len())];
                    let item = Item::new(format!("item-{step}"));
                    target.add_item(item.clone()).unwrap();
                    seen.push(item);
                }
                4 if !pools.is_empty() && !seen.is_empty() => {
                    // Reusing a key is rejected while it is still indexed.
                    let reused = seen[rng.gen_range(0..seen.len())].clone();
                    let target = &pools[rng.gen_range(0..pools.len())];
                    let indexed = manager.contains(&reused.key());
                    let renamed = Item::with_key(reused.key(), format!("again-{step}"));
                    assert_eq!(target.add_item(renamed).is_err(), indexed);
                }
                5 if !pools.is_empty() => {
                    let target = &pools[rng.gen_range(0..pools.len())];
                    let names: Vec<String> = target.items().names();
                    if let Some(name) = names.first() {
                        target.remove_item(name.as_str());
                    }
                }
                _ => {
                    if let Some(pool) = detached.pop() {
                        let _ = manager.add_pool(pool);
                    }
                }
            }

            if rng.gen_bool(0.01) {
                manager.reset();
            }
            assert!(manager.is_consistent(), "diverged at step {step}");
        }
    }
}
