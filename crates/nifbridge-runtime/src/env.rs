//! Isolated environments
//!
//! An `Env` is a copy arena. Terms enter it only by deep copy and leave it
//! only by copy or move, so two environments never alias the same term
//! graph and each can be freed independently of the other.
//!
//! Allocation is budgeted in heap words (see [`Term::heap_size`]): a copy
//! that would exceed the environment's capacity, or whose backing storage
//! cannot be reserved, fails with `OutOfMemory` instead of aborting the
//! process.

use crate::error::{BridgeError, BridgeResult};
use crate::term::Term;
use nifbridge_config::bridge::DEFAULT_ENV_CAPACITY;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global environment ID counter
static ENV_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle to a term stored in a specific environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermRef {
    env: u64,
    generation: u32,
    index: usize,
}

impl TermRef {
    /// ID of the environment that owns the term
    pub fn env_id(&self) -> u64 {
        self.env
    }
}

/// Copy arena with an independent lifetime
pub struct Env {
    id: u64,
    generation: u32,
    capacity: usize,
    used: usize,
    slots: Vec<Option<Term>>,
}

impl Env {
    /// Create an environment with the default word budget
    pub fn new() -> Self {
        Self {
            id: ENV_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            capacity: DEFAULT_ENV_CAPACITY,
            used: 0,
            slots: Vec::new(),
        }
    }

    /// Create an environment, reserving `reserve` term slots up front
    pub fn try_new(capacity: usize, reserve: usize) -> BridgeResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve(reserve)
            .map_err(|_| BridgeError::OutOfMemory {
                what: "environment",
            })?;

        Ok(Self {
            id: ENV_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            capacity,
            used: 0,
            slots,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Node budget
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nodes currently held
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of live terms
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Deep-copy a term into this environment
    pub fn copy(&mut self, term: &Term) -> BridgeResult<TermRef> {
        let words = term.heap_size();
        if self.used.saturating_add(words) > self.capacity {
            return Err(BridgeError::OutOfMemory {
                what: "environment",
            });
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| BridgeError::OutOfMemory {
                what: "environment",
            })?;

        self.slots.push(Some(term.clone()));
        self.used += words;

        Ok(TermRef {
            env: self.id,
            generation: self.generation,
            index: self.slots.len() - 1,
        })
    }

    /// Borrow a term owned by this environment
    pub fn get(&self, term: TermRef) -> BridgeResult<&Term> {
        if term.env != self.id || term.generation != self.generation {
            return Err(BridgeError::StaleTerm { env: term.env });
        }
        self.slots
            .get(term.index)
            .and_then(Option::as_ref)
            .ok_or(BridgeError::StaleTerm { env: term.env })
    }

    /// Move a term out of this environment, releasing its budget
    pub fn take(&mut self, term: TermRef) -> BridgeResult<Term> {
        if term.env != self.id || term.generation != self.generation {
            return Err(BridgeError::StaleTerm { env: term.env });
        }
        let taken = self
            .slots
            .get_mut(term.index)
            .and_then(Option::take)
            .ok_or(BridgeError::StaleTerm { env: term.env })?;

        self.used -= taken.heap_size();
        Ok(taken)
    }

    /// Free every term; outstanding `TermRef`s become stale
    pub fn clear(&mut self) {
        self.slots.clear();
        self.used = 0;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .finish()
    }
}
