use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::error::Result;
use crate::resource::{Lookup, RenameToken, Resource, ResourceCollection, ResourceKey};

struct PoolInner<I: Resource> {
    key: ResourceKey,
    name: RefCell<String>,
    items: ResourceCollection<I>,
}

/// A named resource that exclusively owns a collection of items.
///
/// `Pool` is a shared handle: clones refer to the same pool, and equality is
/// identity. Cross-pool key uniqueness is not checked here; a
/// [`PoolManager`](crate::PoolManager) enforces it for the pools it owns.
pub struct Pool<I: Resource> {
    inner: Rc<PoolInner<I>>,
}

impl<I: Resource> Pool<I> {
    /// Creates an empty pool with a freshly generated key.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_key(Uuid::new_v4(), name)
    }

    pub fn with_key(key: ResourceKey, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(PoolInner {
                key,
                name: RefCell::new(name.into()),
                items: ResourceCollection::new(),
            }),
        }
    }

    /// Builds a pool pre-populated with `items`.
    pub fn with_items(name: impl Into<String>, items: impl IntoIterator<Item = I>) -> Result<Self> {
        let pool = Self::new(name);
        for item in items {
            pool.add_item(item)?;
        }
        Ok(pool)
    }

    /// The owned item collection, for subscribing to item level events.
    ///
    /// Every public mutation on it is announced, so a managing index stays
    /// current. There is no silent bulk clear:
    ///
    /// ```compile_fail
    /// use pool_registry::{Item, Pool};
    ///
    /// let terrain = Pool::with_items("terrain", [Item::new("grass")]).unwrap();
    /// terrain.items().clear();
    /// ```
    pub fn items(&self) -> &ResourceCollection<I> {
        &self.inner.items
    }

    pub fn add_item(&self, item: I) -> Result<()> {
        self.inner.items.add(item)
    }

    pub fn remove_item(&self, lookup: impl Into<Lookup>) -> Option<I> {
        self.inner.items.remove(lookup)
    }

    pub fn rename_item(&self, lookup: impl Into<Lookup>, name: impl Into<String>) -> Result<()> {
        self.inner.items.rename(lookup, name)
    }

    pub fn item(&self, lookup: impl Into<Lookup>) -> Option<I> {
        self.inner.items.get(lookup)
    }

    pub fn contains_item(&self, lookup: impl Into<Lookup>) -> bool {
        self.inner.items.contains(lookup)
    }

    pub fn item_keys(&self) -> Vec<ResourceKey> {
        self.inner.items.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    pub fn same_pool(&self, other: &Pool<I>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<I: Resource> Clone for Pool<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I: Resource> PartialEq for Pool<I> {
    fn eq(&self, other: &Self) -> bool {
        self.same_pool(other)
    }
}

impl<I: Resource> Eq for Pool<I> {}

impl<I: Resource> Resource for Pool<I> {
    fn key(&self) -> ResourceKey {
        self.inner.key
    }

    fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    fn set_name(&mut self, name: String, _token: RenameToken) {
        *self.inner.name.borrow_mut() = name;
    }
}

impl<I: Resource> fmt::Debug for Pool<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("key", &self.inner.key)
            .field("name", &*self.inner.name.borrow())
            .field("items", &self.inner.items.len())
            .finish()
    }
}
