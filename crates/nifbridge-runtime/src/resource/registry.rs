//! Resource-type registry
//!
//! Maps a type name to the Rust type it was opened with, its destructor
//! hook and a count of live objects. Opening follows the host's
//! create/takeover rules.

use super::handle::ResourceType;
use crate::error::{BridgeError, BridgeResult};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hook run on the native object right before it is dropped
pub type Destructor<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Flags accepted by [`ResourceRegistry::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtFlags(u8);

impl RtFlags {
    /// Register the name if it does not exist yet
    pub const CREATE: RtFlags = RtFlags(0b01);
    /// Replace the destructor hook of an existing registration
    pub const TAKEOVER: RtFlags = RtFlags(0b10);

    pub fn contains(self, other: RtFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RtFlags {
    type Output = RtFlags;

    fn bitor(self, rhs: RtFlags) -> RtFlags {
        RtFlags(self.0 | rhs.0)
    }
}

/// One registered resource type
pub(crate) struct TypeEntry {
    name: String,
    type_id: TypeId,
    /// Holds a `Destructor<T>` for the registered `T`
    dtor: RwLock<Option<Box<dyn Any + Send + Sync>>>,
    live: AtomicUsize,
}

impl TypeEntry {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn destructor<T: 'static>(&self) -> Option<Destructor<T>> {
        self.dtor
            .read()
            .as_ref()
            .and_then(|hook| hook.downcast_ref::<Destructor<T>>())
            .cloned()
    }

    pub(crate) fn object_created(&self) {
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn object_destroyed(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("live", &self.live_count())
            .finish()
    }
}

/// Name-keyed table of resource types
#[derive(Default)]
pub struct ResourceRegistry {
    types: RwLock<HashMap<String, Arc<TypeEntry>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a resource type by name.
    ///
    /// - name unknown: requires `CREATE`, registers `T` with `dtor`
    /// - name known: requires `TAKEOVER`, which swaps in `dtor`
    /// - name known for another Rust type: always an error
    pub fn open<T: Send + Sync + 'static>(
        &self,
        name: &str,
        flags: RtFlags,
        dtor: Option<Destructor<T>>,
    ) -> BridgeResult<ResourceType<T>> {
        let mut types = self.types.write();

        if let Some(entry) = types.get(name) {
            if entry.type_id != TypeId::of::<T>() {
                return Err(BridgeError::TypeRegistration {
                    name: name.to_string(),
                    reason: format!(
                        "already registered for a different type than {}",
                        std::any::type_name::<T>()
                    ),
                });
            }
            if !flags.contains(RtFlags::TAKEOVER) {
                return Err(BridgeError::TypeRegistration {
                    name: name.to_string(),
                    reason: "already registered".to_string(),
                });
            }

            *entry.dtor.write() = dtor.map(|d| Box::new(d) as Box<dyn Any + Send + Sync>);
            tracing::debug!(resource_type = name, "resource type taken over");
            return Ok(ResourceType::new(Arc::clone(entry)));
        }

        if !flags.contains(RtFlags::CREATE) {
            return Err(BridgeError::TypeRegistration {
                name: name.to_string(),
                reason: "not registered and CREATE not requested".to_string(),
            });
        }

        let entry = Arc::new(TypeEntry {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            dtor: RwLock::new(dtor.map(|d| Box::new(d) as Box<dyn Any + Send + Sync>)),
            live: AtomicUsize::new(0),
        });
        types.insert(name.to_string(), Arc::clone(&entry));

        tracing::debug!(resource_type = name, "resource type created");
        Ok(ResourceType::new(entry))
    }

    /// Check whether a type name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self.types.read();
        let mut names: Vec<&String> = types.keys().collect();
        names.sort();
        f.debug_struct("ResourceRegistry")
            .field("types", &names)
            .finish()
    }
}
