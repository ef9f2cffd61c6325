//! Disposal marking for owners of asynchronous callbacks.
//!
//! Any long-lived owner (a render context, a lifecycle hook, a tween) obtains
//! an [`OwnerToken`] on creation. Scheduled callbacks capture the token and
//! check [`is_disposed`] when they finally run; a disposed owner silences the
//! callback. Tokens are slot indices tagged with a generation counter, so a
//! slot reused for a new owner never revives a stale token.

use std::cell::RefCell;

/// Epoch-tagged handle identifying a disposable owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    slot: u32,
    generation: u32,
}

struct SlotState {
    generation: u32,
    live: bool,
}

#[derive(Default)]
struct Registry {
    slots: Vec<SlotState>,
    free: Vec<u32>,
}

impl Registry {
    fn register(&mut self) -> OwnerToken {
        if let Some(slot) = self.free.pop() {
            let state = &mut self.slots[slot as usize];
            state.live = true;
            return OwnerToken {
                slot,
                generation: state.generation,
            };
        }
        let slot = self.slots.len() as u32;
        self.slots.push(SlotState {
            generation: 0,
            live: true,
        });
        OwnerToken {
            slot,
            generation: 0,
        }
    }

    fn mark_disposed(&mut self, token: OwnerToken) {
        let Some(state) = self.slots.get_mut(token.slot as usize) else {
            return;
        };
        if state.generation != token.generation || !state.live {
            return;
        }
        state.live = false;
        state.generation = state.generation.wrapping_add(1);
        self.free.push(token.slot);
    }

    fn is_disposed(&self, token: OwnerToken) -> bool {
        match self.slots.get(token.slot as usize) {
            Some(state) => state.generation != token.generation || !state.live,
            None => true,
        }
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Registers a new live owner and returns its token.
pub fn register_owner() -> OwnerToken {
    REGISTRY.with(|registry| registry.borrow_mut().register())
}

/// Marks the owner as disposed. Idempotent; stale tokens are ignored.
pub fn mark_disposed(token: OwnerToken) {
    REGISTRY.with(|registry| registry.borrow_mut().mark_disposed(token));
}

/// Returns whether the owner behind `token` has been disposed.
pub fn is_disposed(token: OwnerToken) -> bool {
    REGISTRY.with(|registry| registry.borrow().is_disposed(token))
}
