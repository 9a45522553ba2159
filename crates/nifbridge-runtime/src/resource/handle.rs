//! Dual-counted native resources
//!
//! A native object wrapped by [`ResourceType::create`] lives under two
//! independent counts:
//!
//! - the host count, carried by `Arc` clones inside [`ResourceHandle`]s and
//!   resource [`Term`]s, which frees the storage when the last term is
//!   collected;
//! - the native count, an atomic integer starting at 1 that every
//!   [`ResourceGuard`] holds one unit of for the duration of a single
//!   operation.
//!
//! The object is destroyed exactly once: when a native release takes the
//! count from 1 to 0, or, if that never happens, when the host drops the
//! last reference. [`ResourceHandle::deallocate`] gives up the creation unit
//! early and is a one-shot operation.

use super::registry::TypeEntry;
use crate::error::{BridgeError, BridgeResult};
use crate::term::Term;
use std::any::Any;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared allocation behind every handle, guard and term of one object
pub(crate) struct ResourceCell<T: Send + Sync + 'static> {
    entry: Arc<TypeEntry>,
    refcount: AtomicUsize,
    deallocated: AtomicBool,
    object: UnsafeCell<ManuallyDrop<T>>,
}

// SAFETY: the object is only reached through `&T` while a native unit is
// held, and only mutated by `destroy`, which runs once with no guard alive.
unsafe impl<T: Send + Sync + 'static> Send for ResourceCell<T> {}
unsafe impl<T: Send + Sync + 'static> Sync for ResourceCell<T> {}

impl<T: Send + Sync + 'static> ResourceCell<T> {
    fn try_acquire(&self) -> BridgeResult<()> {
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BridgeError::Deallocated);
        }

        // Never resurrect a count that already reached zero
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(BridgeError::Deallocated);
            }
            match self.refcount.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        if self.refcount.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            // SAFETY: this thread performed the 1 -> 0 transition, so no
            // other unit is outstanding and none can be taken.
            unsafe { self.destroy() }
        }
    }

    /// # Safety
    ///
    /// Must be called at most once, with no `ResourceGuard` alive.
    unsafe fn destroy(&self) {
        let object = &mut *self.object.get();
        if let Some(hook) = self.entry.destructor::<T>() {
            hook(&**object);
        }
        ManuallyDrop::drop(object);
        self.entry.object_destroyed();
        tracing::debug!(resource_type = self.entry.name(), "resource destroyed");
    }
}

impl<T: Send + Sync + 'static> Drop for ResourceCell<T> {
    fn drop(&mut self) {
        // Host finalizer: the native count never reached zero
        if *self.refcount.get_mut() > 0 {
            tracing::trace!(
                resource_type = self.entry.name(),
                "resource finalized by host"
            );
            // SAFETY: `&mut self` means no guard or handle remains.
            unsafe { self.destroy() }
        }
    }
}

/// Type-erased view used by resource terms
pub(crate) trait ErasedResource: Send + Sync {
    fn type_name(&self) -> &str;
    fn refcount(&self) -> usize;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> ErasedResource for ResourceCell<T> {
    fn type_name(&self) -> &str {
        self.entry.name()
    }

    fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Opaque token for a native resource, as carried inside a [`Term`]
#[derive(Clone)]
pub struct ResourceTerm {
    cell: Arc<dyn ErasedResource>,
}

impl ResourceTerm {
    /// Name of the resource type this token belongs to
    pub fn type_name(&self) -> &str {
        self.cell.type_name()
    }

    /// Current native count
    pub fn refcount(&self) -> usize {
        self.cell.refcount()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.cell) as *const ()
    }
}

impl PartialEq for ResourceTerm {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for ResourceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTerm")
            .field("type", &self.type_name())
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl fmt::Display for ResourceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Resource<{}>", self.type_name())
    }
}

/// Typed handle to one native object
pub struct ResourceHandle<T: Send + Sync + 'static> {
    cell: Arc<ResourceCell<T>>,
}

impl<T: Send + Sync + 'static> ResourceHandle<T> {
    /// Take one native unit for the duration of an operation.
    ///
    /// Fails with `Deallocated` once the count has reached zero or the
    /// one-shot flag is set.
    pub fn acquire(&self) -> BridgeResult<ResourceGuard<T>> {
        self.cell.try_acquire()?;
        Ok(ResourceGuard {
            cell: Arc::clone(&self.cell),
        })
    }

    /// Give up the creation unit early.
    ///
    /// Returns `true` for the call that flipped the flag, `false` for every
    /// later call.
    pub fn deallocate(&self) -> bool {
        if self.cell.deallocated.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(
            resource_type = self.cell.entry.name(),
            refcount = self.refcount(),
            "resource deallocated"
        );
        self.cell.release();
        true
    }

    /// Current native count
    pub fn refcount(&self) -> usize {
        self.cell.refcount.load(Ordering::Acquire)
    }

    pub fn is_deallocated(&self) -> bool {
        self.cell.deallocated.load(Ordering::Acquire)
    }

    pub fn type_name(&self) -> &str {
        self.cell.entry.name()
    }

    /// Wrap this handle in a term, adding one host reference
    pub fn to_term(&self) -> Term {
        Term::Resource(ResourceTerm {
            cell: Arc::clone(&self.cell) as Arc<dyn ErasedResource>,
        })
    }
}

impl<T: Send + Sync + 'static> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + Sync + 'static> From<ResourceHandle<T>> for Term {
    fn from(handle: ResourceHandle<T>) -> Self {
        Term::Resource(ResourceTerm {
            cell: handle.cell as Arc<dyn ErasedResource>,
        })
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("type", &self.type_name())
            .field("refcount", &self.refcount())
            .field("deallocated", &self.is_deallocated())
            .finish()
    }
}

/// Scoped native reference; releases its unit on drop
pub struct ResourceGuard<T: Send + Sync + 'static> {
    cell: Arc<ResourceCell<T>>,
}

impl<T: Send + Sync + 'static> Deref for ResourceGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard holds a native unit, so the object is alive.
        unsafe { &**self.cell.object.get() }
    }
}

impl<T: Send + Sync + 'static> Drop for ResourceGuard<T> {
    fn drop(&mut self) {
        self.cell.release();
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for ResourceGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceGuard").field(&**self).finish()
    }
}

/// Capability to create and resolve resources of one registered type
pub struct ResourceType<T: Send + Sync + 'static> {
    entry: Arc<TypeEntry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ResourceType<T> {
    pub(crate) fn new(entry: Arc<TypeEntry>) -> Self {
        Self {
            entry,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn entry(&self) -> &TypeEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// Objects of this type not yet destroyed
    pub fn live_count(&self) -> usize {
        self.entry.live_count()
    }

    /// Take ownership of `object`; the native count starts at 1
    pub fn create(&self, object: T) -> ResourceHandle<T> {
        let cell = Arc::new(ResourceCell {
            entry: Arc::clone(&self.entry),
            refcount: AtomicUsize::new(1),
            deallocated: AtomicBool::new(false),
            object: UnsafeCell::new(ManuallyDrop::new(object)),
        });
        self.entry.object_created();
        tracing::debug!(resource_type = self.entry.name(), "resource created");

        ResourceHandle { cell }
    }

    /// Resolve a term to a handle of this type.
    ///
    /// Fails with `Invalid` for non-resource terms and for resources of any
    /// other type, including another registration of the same Rust type.
    pub fn resolve(&self, term: &Term) -> BridgeResult<ResourceHandle<T>> {
        let invalid = || BridgeError::Invalid {
            expected: self.entry.name().to_string(),
        };

        let Term::Resource(resource) = term else {
            return Err(invalid());
        };
        let cell = Arc::clone(&resource.cell)
            .into_any()
            .downcast::<ResourceCell<T>>()
            .map_err(|_| invalid())?;
        if !Arc::ptr_eq(&cell.entry, &self.entry) {
            return Err(invalid());
        }

        Ok(ResourceHandle { cell })
    }

    /// Resolve and acquire in one step
    pub fn acquire(&self, term: &Term) -> BridgeResult<ResourceGuard<T>> {
        self.resolve(term)?.acquire()
    }

    /// Resolve and deallocate in one step
    pub fn deallocate(&self, term: &Term) -> BridgeResult<bool> {
        Ok(self.resolve(term)?.deallocate())
    }
}

impl<T: Send + Sync + 'static> Clone for ResourceType<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.entry))
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for ResourceType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name())
            .field("live", &self.live_count())
            .finish()
    }
}
