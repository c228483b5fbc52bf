//! Observable key/value container for pagination parameters.
//!
//! Reads made through [`ParameterStore::get`] while an effect executes are
//! recorded as that effect's dependencies. A write that changes a value
//! queues every dependent effect, including one that is executing and has
//! already read the key. Queued effects run at the next
//! [`ParameterStore::flush`]: when the outermost [`ParameterStore::batch`]
//! closes, or when the owner of the store drains it before a read. Writes
//! in between coalesce into a single run per effect. Writes of an equal
//! value are no-ops.
//!
//! The store is single-threaded: all state lives behind `Rc`/`RefCell` and
//! effects execute cooperatively on the caller's thread.

mod effect;
mod keys;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::ParamValue;

pub use effect::{EffectHandle, EffectId};
pub use keys::ParamKey;

use effect::EffectSlot;

/// Dependencies collected by one executing effect
struct TrackingFrame {
    effect: EffectId,
    reads: HashSet<ParamKey>,
}

#[derive(Default)]
pub(crate) struct StoreInner {
    values: RefCell<HashMap<ParamKey, ParamValue>>,
    effects: RefCell<BTreeMap<EffectId, EffectSlot>>,
    pending: RefCell<BTreeSet<EffectId>>,
    tracking: RefCell<Vec<TrackingFrame>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    next_effect: Cell<u64>,
}

#[derive(Clone, Default)]
pub struct ParameterStore {
    inner: Rc<StoreInner>,
}

/// Non-owning reference to a store, handed to asynchronous callbacks.
#[derive(Clone)]
pub struct WeakParameterStore {
    inner: Weak<StoreInner>,
}

impl WeakParameterStore {
    pub fn upgrade(&self) -> Option<ParameterStore> {
        self.inner.upgrade().map(|inner| ParameterStore { inner })
    }
}

struct BatchGuard<'a>(&'a StoreInner);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.0.batch_depth.get();
        self.0.batch_depth.set(depth.saturating_sub(1));
    }
}

struct FlushGuard<'a>(&'a StoreInner);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.flushing.set(false);
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakParameterStore {
        WeakParameterStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Read a value, recording the key as a dependency of the running effect.
    pub fn get(&self, key: ParamKey) -> Option<ParamValue> {
        if let Some(frame) = self.inner.tracking.borrow_mut().last_mut() {
            frame.reads.insert(key);
        }
        self.peek(key)
    }

    /// Read a value without recording a dependency.
    pub fn peek(&self, key: ParamKey) -> Option<ParamValue> {
        self.inner.values.borrow().get(&key).cloned()
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.inner.values.borrow().contains_key(&key)
    }

    /// Store `value` under `key`, queueing dependent effects.
    ///
    /// Returns `false` without notifying anyone when the stored value is
    /// already equal to `value`, when `key` is read-only, or when the value
    /// is not acceptable for `key` (a zero page, a non-count page size).
    pub fn set(&self, key: ParamKey, value: impl Into<ParamValue>) -> bool {
        let value = value.into();
        if key.is_read_only() {
            tracing::warn!(key = key.as_str(), "refusing write to a read-only parameter");
            return false;
        }
        if !key.accepts(&value) {
            tracing::warn!(key = key.as_str(), %value, "refusing invalid parameter value");
            return false;
        }
        self.write(key, value)
    }

    /// Unchecked write used by the controller for the keys it maintains.
    pub(crate) fn write(&self, key: ParamKey, value: impl Into<ParamValue>) -> bool {
        let value = value.into();
        {
            let mut values = self.inner.values.borrow_mut();
            if values.get(&key) == Some(&value) {
                return false;
            }
            values.insert(key, value);
        }

        tracing::trace!(key = key.as_str(), "parameter changed");
        self.schedule_dependents(key);
        true
    }

    /// Run `f`, then flush once the outermost batch closes.
    ///
    /// Flushes requested inside are postponed, so any number of writes
    /// produce at most one run per dependent effect.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
            let _guard = BatchGuard(&self.inner);
            f()
        };
        self.flush();
        result
    }

    /// Run queued effects until none remain.
    ///
    /// Does nothing inside a batch or while effects are already being
    /// drained; the outer drain picks up anything queued meanwhile.
    pub fn flush(&self) {
        if self.inner.batch_depth.get() > 0 || self.inner.flushing.replace(true) {
            return;
        }
        let _guard = FlushGuard(&self.inner);
        self.drain();
    }

    /// Whether any effect is waiting for the next flush
    pub fn has_pending(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    /// Register `run` as an effect and execute it once, synchronously.
    ///
    /// Writes made by the first execution are treated like writes made
    /// during a flush: they queue dependents, including this effect.
    pub fn create_effect(&self, run: impl FnMut(&ParameterStore) + 'static) -> EffectHandle {
        let id = EffectId(self.inner.next_effect.get());
        self.inner.next_effect.set(id.0 + 1);
        self.inner
            .effects
            .borrow_mut()
            .insert(id, EffectSlot::new(Box::new(run)));

        if self.inner.flushing.replace(true) {
            // Created by another effect; the outer drain continues from here.
            self.run_effect(id);
        } else {
            let guard = FlushGuard(&self.inner);
            self.run_effect(id);
            drop(guard);
            self.flush();
        }

        EffectHandle {
            id,
            store: Rc::downgrade(&self.inner),
        }
    }

    /// Number of effects currently registered
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    fn schedule_dependents(&self, key: ParamKey) {
        let effects = self.inner.effects.borrow();
        let mut pending = self.inner.pending.borrow_mut();
        for (id, slot) in effects.iter() {
            if slot.deps.contains(&key) {
                pending.insert(*id);
            }
        }
        for frame in self.inner.tracking.borrow().iter() {
            if frame.reads.contains(&key) && effects.contains_key(&frame.effect) {
                pending.insert(frame.effect);
            }
        }
    }

    fn drain(&self) {
        loop {
            let next = self.inner.pending.borrow_mut().pop_first();
            let Some(id) = next else {
                break;
            };
            self.run_effect(id);
        }
    }

    fn run_effect(&self, id: EffectId) {
        let mut run = {
            let mut effects = self.inner.effects.borrow_mut();
            let Some(slot) = effects.get_mut(&id) else {
                return;
            };
            match slot.run.take() {
                Some(run) => run,
                None => {
                    // Already executing further up the stack.
                    slot.rerun = true;
                    return;
                }
            }
        };

        self.inner.tracking.borrow_mut().push(TrackingFrame {
            effect: id,
            reads: HashSet::new(),
        });
        run(self);
        let deps = self
            .inner
            .tracking
            .borrow_mut()
            .pop()
            .map(|frame| frame.reads)
            .unwrap_or_default();

        // The effect may have disposed itself while running.
        if let Some(slot) = self.inner.effects.borrow_mut().get_mut(&id) {
            slot.run = Some(run);
            slot.deps = deps;
            slot.runs += 1;
            if std::mem::take(&mut slot.rerun) {
                self.inner.pending.borrow_mut().insert(id);
            }
        }
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.inner.values.borrow();
        let mut map = f.debug_map();
        for key in ParamKey::ALL {
            if let Some(value) = values.get(&key) {
                map.entry(&key.as_str(), value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_effect(store: &ParameterStore, keys: &'static [ParamKey]) -> (EffectHandle, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0));
        let seen = runs.clone();
        let handle = store.create_effect(move |store| {
            for key in keys {
                store.get(*key);
            }
            seen.set(seen.get() + 1);
        });
        (handle, runs)
    }

    #[test]
    fn test_set_same_value_is_noop() {
        let store = ParameterStore::new();
        assert!(store.set(ParamKey::Page, 1u64));
        assert!(!store.set(ParamKey::Page, 1u64));
        assert!(store.set(ParamKey::Page, 2u64));
        assert_eq!(store.peek(ParamKey::Page), Some(ParamValue::Count(2)));
    }

    #[test]
    fn test_effect_runs_immediately_and_on_dependency_change() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        let (handle, runs) = counting_effect(&store, &[ParamKey::Page]);
        assert_eq!(runs.get(), 1);

        store.set(ParamKey::Page, 2u64);
        assert_eq!(runs.get(), 1);
        assert!(store.has_pending());
        store.flush();
        assert_eq!(runs.get(), 2);

        store.set(ParamKey::Page, 2u64);
        store.write(ParamKey::Ready, true);
        store.flush();
        assert_eq!(runs.get(), 2);
        assert_eq!(handle.run_count(), 2);
    }

    #[test]
    fn test_writes_between_flushes_coalesce() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        store.set(ParamKey::PerPage, 10u64);
        let (_handle, runs) = counting_effect(&store, &[ParamKey::Page, ParamKey::PerPage]);

        store.set(ParamKey::Page, 2u64);
        store.set(ParamKey::PerPage, 20u64);
        store.set(ParamKey::Page, 3u64);
        store.flush();
        store.flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_read_only_and_invalid_writes_are_refused() {
        let store = ParameterStore::new();
        assert!(!store.set(ParamKey::Ready, true));
        assert!(!store.set(ParamKey::Name, "items"));
        assert!(!store.set(ParamKey::Page, 0u64));
        assert!(!store.set(ParamKey::PerPage, true));
        assert!(store.peek(ParamKey::Ready).is_none());
        assert!(store.peek(ParamKey::Page).is_none());

        assert!(store.write(ParamKey::Ready, true));
        assert_eq!(store.peek(ParamKey::Ready), Some(ParamValue::Flag(true)));
    }

    #[test]
    fn test_first_run_write_to_own_dependency_reruns() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 5u64);
        let pages = Rc::new(RefCell::new(Vec::new()));
        let seen = pages.clone();
        let handle = store.create_effect(move |store| {
            let page = store.get(ParamKey::Page).and_then(|v| v.as_count()).unwrap_or(1);
            seen.borrow_mut().push(page);
            if page > 2 {
                store.set(ParamKey::Page, 2u64);
            }
        });

        assert_eq!(*pages.borrow(), vec![5, 2]);
        assert_eq!(handle.run_count(), 2);
        assert!(!store.has_pending());
    }

    #[test]
    fn test_flush_from_inside_an_effect_keeps_its_rerun() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        let runs = Rc::new(Cell::new(0));
        let seen = runs.clone();
        let _handle = store.create_effect(move |store| {
            seen.set(seen.get() + 1);
            let page = store.get(ParamKey::Page).and_then(|v| v.as_count()).unwrap_or(1);
            if page < 3 {
                store.set(ParamKey::Page, page + 1);
                store.flush();
            }
        });

        assert_eq!(store.peek(ParamKey::Page), Some(ParamValue::Count(3)));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn test_peek_is_not_a_dependency() {
        let store = ParameterStore::new();
        store.set(ParamKey::Debug, false);
        let runs = Rc::new(Cell::new(0));
        let seen = runs.clone();
        let handle = store.create_effect(move |store| {
            store.peek(ParamKey::Debug);
            seen.set(seen.get() + 1);
        });

        store.set(ParamKey::Debug, true);
        store.flush();
        assert_eq!(runs.get(), 1);
        assert!(handle.dependencies().is_empty());
    }

    #[test]
    fn test_batch_coalesces_runs() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        store.set(ParamKey::PerPage, 10u64);
        let (_handle, runs) = counting_effect(&store, &[ParamKey::Page, ParamKey::PerPage]);

        store.batch(|| {
            store.set(ParamKey::Page, 3u64);
            store.set(ParamKey::PerPage, 20u64);
            store.batch(|| store.set(ParamKey::Page, 4u64));
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_disposed_effect_stops_running() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        let (handle, runs) = counting_effect(&store, &[ParamKey::Page]);

        assert!(handle.dispose());
        assert!(!handle.is_active());
        assert!(!handle.dispose());

        store.set(ParamKey::Page, 5u64);
        store.flush();
        assert_eq!(runs.get(), 1);
        assert_eq!(store.effect_count(), 0);
    }

    #[test]
    fn test_write_inside_effect_requeues_dependents() {
        let store = ParameterStore::new();
        store.set(ParamKey::Page, 1u64);
        store.set(ParamKey::PerPage, 10u64);

        let (_reader, reader_runs) = counting_effect(&store, &[ParamKey::PerPage]);
        let _writer = store.create_effect(|store| {
            if let Some(page) = store.get(ParamKey::Page).and_then(|v| v.as_count()) {
                store.set(ParamKey::PerPage, page * 10);
            }
        });

        store.set(ParamKey::Page, 2u64);
        store.flush();
        assert_eq!(store.peek(ParamKey::PerPage), Some(ParamValue::Count(20)));
        assert_eq!(reader_runs.get(), 2);
    }

    #[test]
    fn test_weak_store_does_not_keep_store_alive() {
        let store = ParameterStore::new();
        let weak = store.downgrade();
        assert!(weak.upgrade().is_some());
        drop(store);
        assert!(weak.upgrade().is_none());
    }
}
