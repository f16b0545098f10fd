use thiserror::Error;

use crate::registry::LibraryId;
use crate::resource::ResourceKey;

/// Unified result type for the pool registry crate.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by collections, pool managers and the library layer.
///
/// Every variant is a synchronous precondition failure reported to the
/// immediate caller. A failed call leaves the target untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("a resource with key `{0}` already exists")]
    DuplicateKey(ResourceKey),
    #[error("a resource named `{0}` already exists")]
    DuplicateName(String),
    #[error("cannot rename to `{0}`: the name is held by another resource")]
    NameConflict(String),
    #[error("item key `{0}` is already registered with another pool")]
    DuplicateItemKey(ResourceKey),
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error("update to `{0}` changed its key or name")]
    IdentityChanged(ResourceKey),
    #[error("rename of `{name}` rejected: {reason}")]
    RenameRejected { name: String, reason: String },
    #[error("library id must be non-empty")]
    InvalidLibraryId,
    #[error("library `{0}` is already registered")]
    DuplicateLibrary(LibraryId),
    #[error("library `{0}` is not registered")]
    UnknownLibrary(LibraryId),
    #[error("no default library has been set")]
    NoDefaultLibrary,
}

impl PoolError {
    /// Short machine friendly label used in log fields and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::DuplicateKey(_) => "duplicate_key",
            PoolError::DuplicateName(_) => "duplicate_name",
            PoolError::NameConflict(_) => "name_conflict",
            PoolError::DuplicateItemKey(_) => "duplicate_item_key",
            PoolError::NotFound(_) => "not_found",
            PoolError::IdentityChanged(_) => "identity_changed",
            PoolError::RenameRejected { .. } => "rename_rejected",
            PoolError::InvalidLibraryId => "invalid_library_id",
            PoolError::DuplicateLibrary(_) => "duplicate_library",
            PoolError::UnknownLibrary(_) => "unknown_library",
            PoolError::NoDefaultLibrary => "no_default_library",
        }
    }
}
