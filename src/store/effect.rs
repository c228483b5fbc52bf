// ============================================================================
// Reactive effects
// ============================================================================
//
// An effect is a closure registered against a ParameterStore. Every tracked
// read it performs is recorded; a later write to any of those keys queues
// the effect, and the queue drains at the store's next flush.
//
// ============================================================================

use std::collections::HashSet;
use std::rc::Weak;

use super::keys::ParamKey;
use super::{ParameterStore, StoreInner};

pub(super) type EffectFn = Box<dyn FnMut(&ParameterStore)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub(super) u64);

pub(super) struct EffectSlot {
    /// `None` while the effect is executing
    pub(super) run: Option<EffectFn>,
    pub(super) deps: HashSet<ParamKey>,
    pub(super) runs: u64,
    /// Requested again while executing
    pub(super) rerun: bool,
}

impl EffectSlot {
    pub(super) fn new(run: EffectFn) -> Self {
        Self {
            run: Some(run),
            deps: HashSet::new(),
            runs: 0,
            rerun: false,
        }
    }
}

/// Handle to a registered effect.
///
/// Dropping the handle does not stop the effect; call [`EffectHandle::dispose`].
#[derive(Debug, Clone)]
pub struct EffectHandle {
    pub(super) id: EffectId,
    pub(super) store: Weak<StoreInner>,
}

impl EffectHandle {
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Unregister the effect. Returns `false` if it was already gone.
    pub fn dispose(&self) -> bool {
        let Some(inner) = self.store.upgrade() else {
            return false;
        };
        inner.pending.borrow_mut().remove(&self.id);
        let removed = inner.effects.borrow_mut().remove(&self.id);
        removed.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|inner| inner.effects.borrow().contains_key(&self.id))
    }

    /// Number of completed executions
    pub fn run_count(&self) -> u64 {
        self.store
            .upgrade()
            .and_then(|inner| inner.effects.borrow().get(&self.id).map(|slot| slot.runs))
            .unwrap_or(0)
    }

    /// Keys read during the most recent execution, in key order
    pub fn dependencies(&self) -> Vec<ParamKey> {
        let mut deps: Vec<ParamKey> = self
            .store
            .upgrade()
            .and_then(|inner| {
                inner
                    .effects
                    .borrow()
                    .get(&self.id)
                    .map(|slot| slot.deps.iter().copied().collect())
            })
            .unwrap_or_default();
        deps.sort();
        deps
    }
}
