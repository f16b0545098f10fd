use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a resource. Never changes once assigned.
pub type ResourceKey = Uuid;

/// A uniquely keyed, named object that can live in a [`ResourceCollection`].
///
/// Names change only through [`ResourceCollection::rename`], which checks
/// sibling names and runs the renaming guards first. `set_name` is the hook
/// the collection uses to commit the change; it requires a [`RenameToken`],
/// which only this crate can construct.
///
/// [`ResourceCollection`]: super::ResourceCollection
/// [`ResourceCollection::rename`]: super::ResourceCollection::rename
pub trait Resource: Clone + 'static {
    fn key(&self) -> ResourceKey;
    fn name(&self) -> String;
    fn set_name(&mut self, name: String, token: RenameToken);
}

/// Permission to commit a rename, issued by a collection.
///
/// Shared handles such as [`Pool`](crate::Pool) would otherwise let any
/// clone change a name behind its collection's back:
///
/// ```compile_fail
/// use pool_registry::{Item, Pool, RenameToken, Resource};
///
/// let mut terrain: Pool<Item> = Pool::new("terrain");
/// terrain.set_name("water".to_string(), RenameToken(()));
/// ```
#[derive(Debug)]
pub struct RenameToken(());

impl RenameToken {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// Addresses a collection member either by key or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    Key(ResourceKey),
    Name(String),
}

impl From<ResourceKey> for Lookup {
    fn from(key: ResourceKey) -> Self {
        Lookup::Key(key)
    }
}

impl From<&ResourceKey> for Lookup {
    fn from(key: &ResourceKey) -> Self {
        Lookup::Key(*key)
    }
}

impl From<&str> for Lookup {
    fn from(name: &str) -> Self {
        Lookup::Name(name.to_string())
    }
}

impl From<String> for Lookup {
    fn from(name: String) -> Self {
        Lookup::Name(name)
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Key(key) => write!(f, "{key}"),
            Lookup::Name(name) => f.write_str(name),
        }
    }
}

/// Plain leaf resource: a key, a name and free-form string properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    key: ResourceKey,
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Item {
    /// Creates an item with a freshly generated key.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_key(Uuid::new_v4(), name)
    }

    pub fn with_key(key: ResourceKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Resource for Item {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_name(&mut self, name: String, _token: RenameToken) {
        self.name = name;
    }
}
