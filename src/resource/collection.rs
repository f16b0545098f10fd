use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{PoolError, Result};
use crate::events::{DEFAULT_PRIORITY, EventHub, GuardHub, Subscription};

use super::{Lookup, RenameToken, Resource, ResourceKey};

/// Membership change announced by a [`ResourceCollection`].
#[derive(Debug, Clone)]
pub enum ResourceEvent<T> {
    Added { key: ResourceKey, resource: T },
    Removed { key: ResourceKey, resource: T },
    Modified { key: ResourceKey, resource: T },
}

impl<T> ResourceEvent<T> {
    pub fn key(&self) -> ResourceKey {
        match self {
            ResourceEvent::Added { key, .. }
            | ResourceEvent::Removed { key, .. }
            | ResourceEvent::Modified { key, .. } => *key,
        }
    }

    pub fn resource(&self) -> &T {
        match self {
            ResourceEvent::Added { resource, .. }
            | ResourceEvent::Removed { resource, .. }
            | ResourceEvent::Modified { resource, .. } => resource,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ResourceEvent::Added { .. } => "added",
            ResourceEvent::Removed { .. } => "removed",
            ResourceEvent::Modified { .. } => "modified",
        }
    }
}

/// Payload of both rename phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEvent {
    pub key: ResourceKey,
    pub old_name: String,
    pub new_name: String,
}

struct Members<T> {
    by_key: IndexMap<ResourceKey, T>,
    by_name: HashMap<String, ResourceKey>,
}

impl<T> Members<T> {
    fn resolve(&self, lookup: &Lookup) -> Option<ResourceKey> {
        match lookup {
            Lookup::Key(key) => self.by_key.contains_key(key).then_some(*key),
            Lookup::Name(name) => self.by_name.get(name).copied(),
        }
    }
}

/// Insertion ordered resources indexed by key and by name.
///
/// All methods take `&self`. No internal borrow is held while handlers run,
/// so a handler may query the collection that notified it. Guards installed
/// with [`guard_adding`](Self::guard_adding) and
/// [`guard_renaming`](Self::guard_renaming) are validators and must not
/// mutate the collection.
pub struct ResourceCollection<T: Resource> {
    members: RefCell<Members<T>>,
    events: EventHub<ResourceEvent<T>>,
    adding: GuardHub<T>,
    renaming: GuardHub<RenameEvent>,
    renamed: EventHub<RenameEvent>,
}

impl<T: Resource> ResourceCollection<T> {
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Members {
                by_key: IndexMap::new(),
                by_name: HashMap::new(),
            }),
            events: EventHub::new(),
            adding: GuardHub::new(),
            renaming: GuardHub::new(),
            renamed: EventHub::new(),
        }
    }

    pub fn add(&self, item: T) -> Result<()> {
        let key = item.key();
        let name = item.name();
        {
            let members = self.members.borrow();
            if members.by_key.contains_key(&key) {
                return Err(PoolError::DuplicateKey(key));
            }
            if members.by_name.contains_key(&name) {
                return Err(PoolError::DuplicateName(name));
            }
        }

        self.adding.check(&item)?;

        {
            let mut members = self.members.borrow_mut();
            members.by_name.insert(name, key);
            members.by_key.insert(key, item.clone());
        }

        self.events.emit(&ResourceEvent::Added {
            key,
            resource: item,
        });
        Ok(())
    }

    /// Removes a member if present. Absence is not an error here.
    pub fn remove(&self, lookup: impl Into<Lookup>) -> Option<T> {
        let lookup = lookup.into();
        let (key, resource) = {
            let mut members = self.members.borrow_mut();
            let key = members.resolve(&lookup)?;
            let resource = members.by_key.shift_remove(&key)?;
            members.by_name.remove(&resource.name());
            (key, resource)
        };

        self.events.emit(&ResourceEvent::Removed {
            key,
            resource: resource.clone(),
        });
        Some(resource)
    }

    /// Like [`remove`](Self::remove) but reports absence as `NotFound`.
    pub fn try_remove(&self, lookup: impl Into<Lookup>) -> Result<T> {
        let lookup = lookup.into();
        let label = lookup.to_string();
        self.remove(lookup).ok_or(PoolError::NotFound(label))
    }

    /// Renames a member in two phases. Renaming guards may veto the change
    /// during the "changing" phase; a veto leaves the collection untouched and
    /// suppresses the "changed" notification.
    pub fn rename(&self, lookup: impl Into<Lookup>, new_name: impl Into<String>) -> Result<()> {
        let lookup = lookup.into();
        let new_name = new_name.into();

        let event = {
            let members = self.members.borrow();
            let key = members
                .resolve(&lookup)
                .ok_or_else(|| PoolError::NotFound(lookup.to_string()))?;
            let old_name = members.by_key[&key].name();
            if old_name == new_name {
                return Ok(());
            }
            if members.by_name.contains_key(&new_name) {
                return Err(PoolError::NameConflict(new_name));
            }
            RenameEvent {
                key,
                old_name,
                new_name,
            }
        };

        self.renaming.check(&event)?;

        let resource = {
            let mut members = self.members.borrow_mut();
            let members = &mut *members;
            let member = members
                .by_key
                .get_mut(&event.key)
                .ok_or_else(|| PoolError::NotFound(event.key.to_string()))?;
            member.set_name(event.new_name.clone(), RenameToken::new());
            let resource = member.clone();
            members.by_name.remove(&event.old_name);
            members.by_name.insert(event.new_name.clone(), event.key);
            resource
        };

        self.renamed.emit(&event);
        self.events.emit(&ResourceEvent::Modified {
            key: event.key,
            resource,
        });
        Ok(())
    }

    /// Applies `update` to a member and announces the change. The update may
    /// not change the member's key or name.
    pub fn modify<F>(&self, lookup: impl Into<Lookup>, update: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        let lookup = lookup.into();
        let (key, mut copy) = {
            let members = self.members.borrow();
            let key = members
                .resolve(&lookup)
                .ok_or_else(|| PoolError::NotFound(lookup.to_string()))?;
            (key, members.by_key[&key].clone())
        };
        let old_name = copy.name();

        update(&mut copy);

        if copy.key() != key || copy.name() != old_name {
            // Shared handles see the update through the copy; undo the name.
            copy.set_name(old_name, RenameToken::new());
            return Err(PoolError::IdentityChanged(key));
        }

        {
            let mut members = self.members.borrow_mut();
            match members.by_key.get_mut(&key) {
                Some(slot) => *slot = copy.clone(),
                None => return Err(PoolError::NotFound(key.to_string())),
            }
        }

        self.events.emit(&ResourceEvent::Modified {
            key,
            resource: copy,
        });
        Ok(())
    }

    /// Drops every member at once without announcing individual removals.
    /// Returns how many members were dropped. Only an owner that resets its
    /// own derived state alongside may call this.
    pub(crate) fn clear(&self) -> usize {
        let drained = {
            let mut members = self.members.borrow_mut();
            members.by_name.clear();
            std::mem::take(&mut members.by_key)
        };
        drained.len()
    }

    pub fn get(&self, lookup: impl Into<Lookup>) -> Option<T> {
        let lookup = lookup.into();
        let members = self.members.borrow();
        members
            .resolve(&lookup)
            .and_then(|key| members.by_key.get(&key).cloned())
    }

    pub fn contains(&self, lookup: impl Into<Lookup>) -> bool {
        self.members.borrow().resolve(&lookup.into()).is_some()
    }

    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.members.borrow().by_key.contains_key(key)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.members.borrow().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.borrow().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().by_key.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.members.borrow().by_key.keys().copied().collect()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.members
            .borrow()
            .by_key
            .values()
            .map(Resource::name)
            .collect()
    }

    /// Snapshot of the members in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.members.borrow().by_key.values().cloned().collect()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ResourceEvent<T>) + 'static,
    {
        self.events.subscribe_with_priority(DEFAULT_PRIORITY, handler)
    }

    pub fn subscribe_with_priority<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&ResourceEvent<T>) + 'static,
    {
        self.events.subscribe_with_priority(priority, handler)
    }

    /// Installs a validator that runs before a new member is stored.
    pub fn guard_adding<F>(&self, guard: F) -> Subscription
    where
        F: Fn(&T) -> Result<()> + 'static,
    {
        self.adding.subscribe(guard)
    }

    pub fn guard_adding_with_priority<F>(&self, priority: i32, guard: F) -> Subscription
    where
        F: Fn(&T) -> Result<()> + 'static,
    {
        self.adding.subscribe_with_priority(priority, guard)
    }

    /// Installs a handler for the "changing" phase of a rename. Returning an
    /// error vetoes the rename.
    pub fn guard_renaming<F>(&self, guard: F) -> Subscription
    where
        F: Fn(&RenameEvent) -> Result<()> + 'static,
    {
        self.renaming.subscribe(guard)
    }

    /// Installs a handler for the "changed" phase of a rename.
    pub fn subscribe_renamed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RenameEvent) + 'static,
    {
        self.renamed.subscribe(handler)
    }
}

impl<T: Resource> Default for ResourceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource + std::fmt::Debug> std::fmt::Debug for ResourceCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}
