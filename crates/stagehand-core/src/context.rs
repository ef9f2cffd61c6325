//! Persistent render contexts.
//!
//! A [`RenderContext`] ties one component to one host parent and survives
//! across passes: it owns the attachments of the latest pass, the named-value
//! store its subtree resolves through, and the watch on its current state
//! object. Contexts form a tree through scope attachments; disposing a
//! context tears down its whole subtree.
//!
//! `update` is synchronous and not re-entrant: calling it from inside a
//! component or hook callback of the same context panics on the interior
//! borrow. Re-render requests made from inside a pass go through
//! [`crate::scheduler::SchedulerHandle::on_next_frame`] instead; signalling
//! the watched state does exactly that.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::attachment::Attachment;
use crate::collections::HashMap;
use crate::disposal::{self, OwnerToken};
use crate::host::{HostHandle, HostId};
use crate::phase::{self, CursorMap, RenderPhase};
use crate::scheduler::SchedulerHandle;
use crate::signals::{self, SignalHandler};
use crate::spec::{Component, StateObj};
use crate::RenderError;

pub(crate) struct ContextInner {
    host: HostHandle,
    scheduler: SchedulerHandle,
    parent_node: HostId,
    parent: Option<Weak<ContextInner>>,
    component: RefCell<Component>,
    state: RefCell<Option<StateObj>>,
    attachments: RefCell<Vec<Attachment>>,
    values: RefCell<HashMap<String, StateObj>>,
    owner: OwnerToken,
    /// Identity of the currently watched state object.
    watched: Cell<Option<usize>>,
    /// A debounced re-render is already queued for the next frame.
    pending: Cell<bool>,
    disposed: Cell<bool>,
}

#[derive(Clone)]
pub struct RenderContext {
    inner: Rc<ContextInner>,
}

impl RenderContext {
    pub(crate) fn new(
        host: HostHandle,
        scheduler: SchedulerHandle,
        parent_node: HostId,
        component: Component,
        parent: Option<Weak<ContextInner>>,
    ) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                host,
                scheduler,
                parent_node,
                parent,
                component: RefCell::new(component),
                state: RefCell::new(None),
                attachments: RefCell::new(Vec::new()),
                values: RefCell::new(HashMap::default()),
                owner: disposal::register_owner(),
                watched: Cell::new(None),
                pending: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Clears whatever this context holds, then runs a fresh pass over
    /// `state`.
    pub fn render(&self, state: StateObj) -> Result<(), RenderError> {
        if self.inner.disposed.get() {
            return Ok(());
        }
        self.clear();
        self.update(Some(state))
    }

    /// Reconciles the current specification against the previous pass.
    /// `None` clears the context instead. No-op once disposed.
    pub fn update(&self, state: Option<StateObj>) -> Result<(), RenderError> {
        self.update_with_hint(state, None)
    }

    pub(crate) fn update_with_hint(
        &self,
        state: Option<StateObj>,
        cursors: Option<CursorMap>,
    ) -> Result<(), RenderError> {
        if self.inner.disposed.get() {
            return Ok(());
        }
        let Some(state) = state else {
            self.clear();
            return Ok(());
        };
        if let Some(previous) = self.inner.watched.take() {
            signals::unwatch(previous, self.inner.owner);
        }
        *self.inner.state.borrow_mut() = Some(state.clone());
        let cursors = match cursors {
            Some(shared) => shared,
            None => self.seed_cursors(),
        };
        let mut pass = RenderPhase::new(self.clone(), cursors);
        match pass.run(&state) {
            Ok(()) => pass.commit(),
            Err(err) => {
                pass.abandon();
                return Err(err);
            }
        }
        self.subscribe(&state);
        Ok(())
    }

    /// Creates a child context sharing this context's host and scheduler,
    /// resolving named values through this context.
    pub fn derive(&self, parent_node: HostId, component: Component) -> RenderContext {
        RenderContext::new(
            Rc::clone(&self.inner.host),
            self.inner.scheduler.clone(),
            parent_node,
            component,
            Some(Rc::downgrade(&self.inner)),
        )
    }

    /// Stores a named value visible to this context and its descendants.
    pub fn set(&self, name: &str, value: StateObj) {
        self.inner.values.borrow_mut().insert(name.to_owned(), value);
    }

    /// Looks up a named value here, then up the context chain.
    pub fn get(&self, name: &str) -> Option<StateObj> {
        if let Some(value) = self.inner.values.borrow().get(name) {
            return Some(value.clone());
        }
        let mut ancestor = self.inner.parent.clone();
        while let Some(weak) = ancestor {
            let Some(inner) = weak.upgrade() else { break };
            if let Some(value) = inner.values.borrow().get(name) {
                return Some(value.clone());
            }
            ancestor = inner.parent.clone();
        }
        None
    }

    pub fn get_or(&self, name: &str, default: StateObj) -> StateObj {
        self.get(name).unwrap_or(default)
    }

    pub fn require(&self, name: &str) -> Result<StateObj, RenderError> {
        self.get(name).ok_or_else(|| RenderError::MissingNamedValue {
            name: name.to_owned(),
        })
    }

    /// Delivers `event` to every hook in this subtree, depth-first in
    /// attachment order. No-op once disposed.
    pub fn broadcast(&self, event: &str, payload: Option<&StateObj>) {
        if self.inner.disposed.get() {
            return;
        }
        enum Target {
            Scope(RenderContext),
            Hook(usize),
        }
        let plan: Vec<Target> = self
            .inner
            .attachments
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, attachment)| match attachment {
                Attachment::Scope(scope) => Some(Target::Scope(scope.context.clone())),
                Attachment::Hook(_) => Some(Target::Hook(index)),
                _ => None,
            })
            .collect();
        for target in plan {
            match target {
                Target::Scope(child) => child.broadcast(event, payload),
                Target::Hook(index) => self.fire_hook_broadcast(index, event, payload),
            }
        }
    }

    /// Releases every attachment of the latest pass, in reverse order, and
    /// drops the state watch. The context stays usable.
    pub fn clear(&self) {
        if let Some(previous) = self.inner.watched.take() {
            signals::unwatch(previous, self.inner.owner);
        }
        *self.inner.state.borrow_mut() = None;
        let attachments = std::mem::take(&mut *self.inner.attachments.borrow_mut());
        if !attachments.is_empty() {
            log::trace!("clearing {} attachment(s)", attachments.len());
        }
        for attachment in attachments.into_iter().rev() {
            attachment.release(self);
        }
    }

    /// Clears the context and marks it dead: every later `render`, `update`,
    /// or `broadcast` is a no-op, and work scheduled against its owner token
    /// is silenced.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.clear();
        signals::remove_owner(self.inner.owner);
        disposal::mark_disposed(self.inner.owner);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn host(&self) -> HostHandle {
        Rc::clone(&self.inner.host)
    }

    pub fn scheduler(&self) -> SchedulerHandle {
        self.inner.scheduler.clone()
    }

    /// Owner token for asynchronous work tied to this context's lifetime.
    pub fn owner(&self) -> OwnerToken {
        self.inner.owner
    }

    pub fn parent_node(&self) -> HostId {
        self.inner.parent_node
    }

    pub fn state(&self) -> Option<StateObj> {
        self.inner.state.borrow().clone()
    }

    pub fn attachment_count(&self) -> usize {
        self.inner.attachments.borrow().len()
    }

    pub(crate) fn component(&self) -> Component {
        Rc::clone(&self.inner.component.borrow())
    }

    pub(crate) fn set_component(&self, component: Component) {
        *self.inner.component.borrow_mut() = component;
    }

    pub(crate) fn take_attachments(&self) -> Vec<Attachment> {
        std::mem::take(&mut *self.inner.attachments.borrow_mut())
    }

    pub(crate) fn install_attachments(&self, attachments: Vec<Attachment>) {
        *self.inner.attachments.borrow_mut() = attachments;
    }

    /// Standalone updates start their cursor at this context's first direct
    /// node, so siblings rendered by other contexts before it stay put.
    fn seed_cursors(&self) -> CursorMap {
        let cursors = phase::empty_cursors();
        let host = self.inner.host.borrow();
        for attachment in self.inner.attachments.borrow().iter() {
            let placed = match attachment {
                Attachment::Node(node) => Some((node.parent, node.node)),
                Attachment::Text(text) => Some((text.parent, text.node)),
                _ => None,
            };
            if let Some((parent, node)) = placed {
                if let Some(index) = host.child_index(parent, node) {
                    cursors.borrow_mut().insert(parent, index);
                }
                break;
            }
        }
        cursors
    }

    /// Watches `state`: the first signal after a pass queues exactly one
    /// re-render on the next frame, however many more signals arrive before
    /// the frame runs.
    fn subscribe(&self, state: &StateObj) {
        let weak = Rc::downgrade(&self.inner);
        let handler: SignalHandler = Rc::new(move |_payload| {
            let Some(inner) = weak.upgrade() else { return };
            if inner.disposed.get() || inner.pending.replace(true) {
                return;
            }
            let weak = Rc::downgrade(&inner);
            inner.scheduler.on_next_frame(inner.owner, move |_now| {
                let Some(inner) = weak.upgrade() else { return };
                inner.pending.set(false);
                let state = inner.state.borrow().clone();
                let ctx = RenderContext { inner };
                if let Err(err) = ctx.update(state) {
                    log::warn!("scheduled re-render failed: {err}");
                }
            });
        });
        signals::watch(state, self.inner.owner, handler);
        self.inner.watched.set(Some(state.identity()));
    }

    pub(crate) fn fire_hook_attach(&self, index: usize) {
        let taken = {
            let mut attachments = self.inner.attachments.borrow_mut();
            match attachments.get_mut(index) {
                Some(Attachment::Hook(hook)) => {
                    hook.binding.on_attach.take().map(|cb| (cb, hook.parent))
                }
                _ => None,
            }
        };
        if let Some((mut callback, node)) = taken {
            callback(self, node);
            let mut attachments = self.inner.attachments.borrow_mut();
            if let Some(Attachment::Hook(hook)) = attachments.get_mut(index) {
                if hook.binding.on_attach.is_none() {
                    hook.binding.on_attach = Some(callback);
                }
            }
        }
    }

    pub(crate) fn fire_hook_update(&self, index: usize) {
        let taken = {
            let mut attachments = self.inner.attachments.borrow_mut();
            match attachments.get_mut(index) {
                Some(Attachment::Hook(hook)) => {
                    hook.binding.on_update.take().map(|cb| (cb, hook.parent))
                }
                _ => None,
            }
        };
        if let Some((mut callback, node)) = taken {
            callback(self, node);
            let mut attachments = self.inner.attachments.borrow_mut();
            if let Some(Attachment::Hook(hook)) = attachments.get_mut(index) {
                if hook.binding.on_update.is_none() {
                    hook.binding.on_update = Some(callback);
                }
            }
        }
    }

    fn fire_hook_broadcast(&self, index: usize, event: &str, payload: Option<&StateObj>) {
        let taken = {
            let mut attachments = self.inner.attachments.borrow_mut();
            match attachments.get_mut(index) {
                Some(Attachment::Hook(hook)) => hook.binding.on_broadcast.take(),
                _ => None,
            }
        };
        if let Some(mut callback) = taken {
            callback(self, event, payload);
            let mut attachments = self.inner.attachments.borrow_mut();
            if let Some(Attachment::Hook(hook)) = attachments.get_mut(index) {
                if hook.binding.on_broadcast.is_none() {
                    hook.binding.on_broadcast = Some(callback);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
