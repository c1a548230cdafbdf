//! Opaque host handles and the capability used to resolve them.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased reference to a host-owned object.
///
/// The runner never dereferences a handle; it asks the [`HostBridge`] for
/// the script expression the handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(u64);

impl HostHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host capability the AST builder calls back into.
pub trait HostBridge: Send + Sync {
    /// Script expression denoting the object behind `handle`, e.g. the
    /// variable holding a selected point or a class name.
    fn expression_for(&self, handle: HostHandle) -> Option<String>;
}

/// Bridge that knows no handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl HostBridge for NullBridge {
    fn expression_for(&self, _handle: HostHandle) -> Option<String> {
        None
    }
}

/// Concurrent handle table for hosts that don't keep their own.
#[derive(Debug)]
pub struct HostRegistry {
    next: AtomicU64,
    entries: DashMap<HostHandle, String>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Register an expression and get a fresh handle for it.
    pub fn register(&self, expression: impl Into<String>) -> HostHandle {
        let handle = HostHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(handle, expression.into());
        handle
    }

    /// Point an existing handle at a new expression.
    pub fn rebind(&self, handle: HostHandle, expression: impl Into<String>) -> bool {
        match self.entries.get_mut(&handle) {
            Some(mut entry) => {
                *entry = expression.into();
                true
            }
            None => false,
        }
    }

    pub fn release(&self, handle: HostHandle) -> Option<String> {
        self.entries.remove(&handle).map(|(_, expr)| expr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for HostRegistry {
    fn expression_for(&self, handle: HostHandle) -> Option<String> {
        self.entries.get(&handle).map(|entry| entry.value().clone())
    }
}
