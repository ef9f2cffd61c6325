//! Signal/watch broadcast substrate.
//!
//! A process-wide (thread-local) hub keyed by state-object identity. The
//! engine re-registers a watch on the current state of every context after
//! each pass; [`signal`] synchronously invokes all live watchers of the
//! object. Watchers whose owner has been disposed are skipped and pruned,
//! so a stale subscription can never call back into released state.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collections::HashMap;
use crate::disposal::{self, OwnerToken};
use crate::spec::StateObj;

pub type SignalHandler = Rc<dyn Fn(Option<&StateObj>)>;

struct WatchEntry {
    owner: OwnerToken,
    handler: SignalHandler,
}

thread_local! {
    static HUB: RefCell<HashMap<usize, Vec<WatchEntry>>> = RefCell::new(HashMap::default());
}

/// Registers interest in signals on `target`, owned by `owner`. One owner
/// holds at most one watch per target; re-watching replaces the handler.
pub fn watch(target: &StateObj, owner: OwnerToken, handler: SignalHandler) {
    let key = target.identity();
    HUB.with(|hub| {
        let mut hub = hub.borrow_mut();
        let entries = hub.entry(key).or_default();
        entries.retain(|entry| entry.owner != owner && !disposal::is_disposed(entry.owner));
        entries.push(WatchEntry { owner, handler });
    });
}

/// Drops the watch `owner` holds on the object with identity `target_identity`.
pub fn unwatch(target_identity: usize, owner: OwnerToken) {
    HUB.with(|hub| {
        let mut hub = hub.borrow_mut();
        if let Some(entries) = hub.get_mut(&target_identity) {
            entries.retain(|entry| entry.owner != owner);
            if entries.is_empty() {
                hub.remove(&target_identity);
            }
        }
    });
}

/// Drops every watch held by `owner`.
pub fn remove_owner(owner: OwnerToken) {
    HUB.with(|hub| {
        let mut hub = hub.borrow_mut();
        hub.retain(|_, entries| {
            entries.retain(|entry| entry.owner != owner);
            !entries.is_empty()
        });
    });
}

/// Synchronously invokes every live watcher of `target`. No ordering
/// guarantee beyond registration order; disposed-owner entries are pruned.
pub fn signal(target: &StateObj, payload: Option<&StateObj>) {
    let key = target.identity();
    let live: Vec<SignalHandler> = HUB.with(|hub| {
        let mut hub = hub.borrow_mut();
        let Some(entries) = hub.get_mut(&key) else {
            return Vec::new();
        };
        entries.retain(|entry| !disposal::is_disposed(entry.owner));
        let live = entries
            .iter()
            .map(|entry| Rc::clone(&entry.handler))
            .collect();
        if entries.is_empty() {
            hub.remove(&key);
        }
        live
    });
    for handler in live {
        handler(payload);
    }
}
