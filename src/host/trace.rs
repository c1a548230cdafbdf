//! Per-thread trace data.
//!
//! Hosts attach named data to the calling thread (for instance the element
//! a script run is bound to). Async updates run on a worker thread, so the
//! runner captures the caller's slots when the update is queued and
//! restores them on the worker while that update executes.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

pub type TraceValue = Arc<dyn Any + Send + Sync>;

/// Snapshot of every trace slot set on a thread.
#[derive(Clone, Default)]
pub struct TraceData {
    slots: HashMap<String, TraceValue>,
}

impl TraceData {
    pub fn get(&self, key: &str) -> Option<&TraceValue> {
        self.slots.get(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for TraceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.slots.keys().collect();
        keys.sort();
        f.debug_struct("TraceData").field("keys", &keys).finish()
    }
}

thread_local! {
    static SLOTS: RefCell<HashMap<String, TraceValue>> = RefCell::new(HashMap::new());
}

pub fn set_trace_data(key: impl Into<String>, value: TraceValue) {
    SLOTS.with(|slots| {
        slots.borrow_mut().insert(key.into(), value);
    });
}

pub fn trace_data(key: &str) -> Option<TraceValue> {
    SLOTS.with(|slots| slots.borrow().get(key).cloned())
}

pub fn clear_trace_data(key: &str) -> Option<TraceValue> {
    SLOTS.with(|slots| slots.borrow_mut().remove(key))
}

/// Capture the current thread's slots.
pub fn capture() -> TraceData {
    SLOTS.with(|slots| TraceData {
        slots: slots.borrow().clone(),
    })
}

/// Install `data` on the current thread until the guard drops, then put
/// back whatever was there before.
pub fn restore(data: &TraceData) -> TraceGuard {
    let previous = SLOTS.with(|slots| {
        std::mem::replace(&mut *slots.borrow_mut(), data.slots.clone())
    });
    TraceGuard {
        previous: Some(previous),
    }
}

#[must_use = "trace data is reverted when the guard drops"]
pub struct TraceGuard {
    previous: Option<HashMap<String, TraceValue>>,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            SLOTS.with(|slots| *slots.borrow_mut() = previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_restore_across_threads() {
        set_trace_data("element", Arc::new(42u32));
        let captured = capture();
        assert_eq!(captured.len(), 1);

        std::thread::spawn(move || {
            assert!(trace_data("element").is_none());
            {
                let _guard = restore(&captured);
                let value = trace_data("element").unwrap();
                assert_eq!(value.downcast_ref::<u32>(), Some(&42));
            }
            assert!(trace_data("element").is_none());
        })
        .join()
        .unwrap();

        clear_trace_data("element");
        assert!(trace_data("element").is_none());
    }
}
