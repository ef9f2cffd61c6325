//! One reconciliation pass.
//!
//! A [`RenderPhase`] walks a specification tree depth-first against the
//! owning context's previous attachments, matching, creating, or discarding
//! as it goes; there is no intermediate diff tree. Matching is a linear
//! scan of the remaining prior attachments (O(n) per lookup, which is fine
//! for small-to-medium trees; an indexed composite key would be the upgrade
//! path for very long lists).
//!
//! Sibling order is kept by an order-hint cursor map: one "next expected
//! sibling index" per host parent, shared with nested sub-context updates so
//! that children produced by different scopes interleave correctly. A node
//! already at or before its cursor is left alone; anything else is moved to
//! the cursor, which keeps host-tree moves to the out-of-order minority.

use std::cell::RefCell;
use std::rc::Rc;

use crate::attachment::{
    Attachment, HookAttachment, HookBinding, ListenerAttachment, NodeAttachment, ScopeAttachment,
    TextAttachment,
};
use crate::collections::{HashMap, HashSet};
use crate::context::RenderContext;
use crate::host::{HostError, HostId};
use crate::props;
use crate::spec::{
    ComposeSpec, ElementSpec, EventHandler, HookSpec, ListenSpec, PropValue, ReuseKey, Spec,
    StateObj,
};
use crate::RenderError;

/// Host parent → next expected sibling index. Shared across the nested
/// updates of one pass.
pub(crate) type CursorMap = Rc<RefCell<HashMap<HostId, usize>>>;

pub(crate) fn empty_cursors() -> CursorMap {
    Rc::new(RefCell::new(HashMap::default()))
}

pub(crate) struct RenderPhase {
    ctx: RenderContext,
    prior: Vec<Attachment>,
    matched: Vec<Attachment>,
    fresh: Vec<bool>,
    cursors: CursorMap,
}

impl RenderPhase {
    pub(crate) fn new(ctx: RenderContext, cursors: CursorMap) -> Self {
        let prior = ctx.take_attachments();
        Self {
            ctx,
            prior,
            matched: Vec::new(),
            fresh: Vec::new(),
            cursors,
        }
    }

    /// Applies the context's specification to `state`. A sequence state
    /// switches the pass into list mode: one nested scope per item, keyed by
    /// item identity, all sharing this pass's cursor map.
    pub(crate) fn run(&mut self, state: &StateObj) -> Result<(), RenderError> {
        if let Some(items) = state.as_list() {
            let items: Vec<StateObj> = items.to_vec();
            for item in &items {
                self.apply_list_item(item)?;
            }
            return Ok(());
        }
        let component = self.ctx.component();
        let spec = component(state, &self.ctx)?;
        self.apply(spec, self.ctx.parent_node(), state)
    }

    /// Installs the pass's results: unmatched prior attachments are released
    /// in reverse order first, then `on_attach` fires for newly created
    /// attachments in creation order, then `on_update` for every current
    /// attachment in final order. An attachment therefore never observes
    /// `on_update` before its own `on_attach`.
    pub(crate) fn commit(self) {
        let RenderPhase {
            ctx,
            prior,
            matched,
            fresh,
            ..
        } = self;
        let released = prior.len();
        for unmatched in prior.into_iter().rev() {
            unmatched.release(&ctx);
        }
        let total = matched.len();
        let created = fresh.iter().filter(|is_new| **is_new).count();
        ctx.install_attachments(matched);
        for (index, is_new) in fresh.iter().enumerate() {
            if *is_new {
                ctx.fire_hook_attach(index);
            }
        }
        for index in 0..total {
            ctx.fire_hook_update(index);
        }
        log::trace!("pass committed: {total} attachment(s), {created} created, {released} released");
    }

    /// Failure path: keep every attachment owned (matched plus the untouched
    /// remainder of the prior list) without releasing or firing anything, so
    /// the tree stays structurally consistent.
    pub(crate) fn abandon(self) {
        let RenderPhase {
            ctx,
            prior,
            mut matched,
            ..
        } = self;
        matched.extend(prior);
        ctx.install_attachments(matched);
    }

    fn apply(&mut self, spec: Spec, parent: HostId, ambient: &StateObj) -> Result<(), RenderError> {
        match spec {
            Spec::Empty => Ok(()),
            Spec::Text(content) => self.apply_text(content, parent),
            Spec::Element(element) => self.apply_element(element, parent, ambient),
            Spec::Fragment(children) => {
                for child in children {
                    self.apply(child, parent, ambient)?;
                }
                Ok(())
            }
            Spec::Compose(composed) => self.apply_compose(composed, parent),
            Spec::Listen(listener) => self.apply_listen(listener, parent),
            Spec::Hook(hook) => self.apply_hook(hook, parent),
            Spec::Lazy(component) => {
                let expanded = component(ambient, &self.ctx)?;
                self.apply(expanded, parent, ambient)
            }
        }
    }

    fn apply_list_item(&mut self, item: &StateObj) -> Result<(), RenderError> {
        let parent = self.ctx.parent_node();
        let key = ReuseKey::of(item);
        let child = match self.take_match(|prior| prior.matches_scope(parent, &key)) {
            Some(Attachment::Scope(scope)) => {
                scope.context.set_component(self.ctx.component());
                let child = scope.context.clone();
                self.matched.push(Attachment::Scope(scope));
                self.fresh.push(false);
                child
            }
            Some(_) => unreachable!("scope match returned a different variant"),
            None => {
                let child = self.ctx.derive(parent, self.ctx.component());
                self.matched.push(Attachment::Scope(ScopeAttachment {
                    parent,
                    key,
                    context: child.clone(),
                }));
                self.fresh.push(true);
                child
            }
        };
        child.update_with_hint(Some(item.clone()), Some(Rc::clone(&self.cursors)))
    }

    fn apply_text(&mut self, content: String, parent: HostId) -> Result<(), RenderError> {
        let host = self.ctx.host();
        match self.take_match(|prior| prior.matches_text(parent)) {
            Some(Attachment::Text(mut text)) => {
                if text.content != content {
                    host.borrow_mut().set_text(text.node, &content)?;
                    text.content = content;
                }
                self.place_existing(parent, text.node)?;
                self.matched.push(Attachment::Text(text));
                self.fresh.push(false);
            }
            Some(_) => unreachable!("text match returned a different variant"),
            None => {
                let node = host.borrow_mut().create_text(&content)?;
                self.insert_at_cursor(parent, node)?;
                self.matched.push(Attachment::Text(TextAttachment {
                    parent,
                    node,
                    content,
                }));
                self.fresh.push(true);
            }
        }
        Ok(())
    }

    fn apply_element(
        &mut self,
        element: ElementSpec,
        parent: HostId,
        ambient: &StateObj,
    ) -> Result<(), RenderError> {
        let ElementSpec {
            kind,
            props,
            children,
        } = element;
        {
            let mut names: HashSet<&str> = HashSet::default();
            for (name, _) in &props {
                if !names.insert(name.as_str()) {
                    return Err(RenderError::MalformedSpec(format!(
                        "conflicting declarations of property `{name}` on <{kind}>"
                    )));
                }
            }
        }

        let state_id = ambient.identity();
        let node = match self.take_match(|prior| prior.matches_node(&kind, parent, state_id)) {
            Some(Attachment::Node(mut existing)) => {
                self.place_existing(parent, existing.node)?;
                self.apply_props(existing.node, &existing.props, &props)?;
                existing.props = props;
                let node = existing.node;
                self.matched.push(Attachment::Node(existing));
                self.fresh.push(false);
                node
            }
            Some(_) => unreachable!("node match returned a different variant"),
            None => {
                let node = self.ctx.host().borrow_mut().create_node(&kind)?;
                self.insert_at_cursor(parent, node)?;
                self.apply_props(node, &[], &props)?;
                self.matched.push(Attachment::Node(NodeAttachment {
                    kind,
                    parent,
                    state_id,
                    node,
                    props,
                }));
                self.fresh.push(true);
                node
            }
        };
        for child in children {
            self.apply(child, node, ambient)?;
        }
        Ok(())
    }

    fn apply_compose(&mut self, composed: ComposeSpec, parent: HostId) -> Result<(), RenderError> {
        let ComposeSpec {
            state,
            component,
            reuse_key,
        } = composed;
        let child = match self.take_match(|prior| prior.matches_scope(parent, &reuse_key)) {
            Some(Attachment::Scope(scope)) => {
                // Refresh the pending specification for the retained scope.
                scope.context.set_component(component);
                let child = scope.context.clone();
                self.matched.push(Attachment::Scope(scope));
                self.fresh.push(false);
                child
            }
            Some(_) => unreachable!("scope match returned a different variant"),
            None => {
                let child = self.ctx.derive(parent, component);
                self.matched.push(Attachment::Scope(ScopeAttachment {
                    parent,
                    key: reuse_key,
                    context: child.clone(),
                }));
                self.fresh.push(true);
                child
            }
        };
        child.update_with_hint(Some(state), Some(Rc::clone(&self.cursors)))
    }

    fn apply_listen(&mut self, listener: ListenSpec, parent: HostId) -> Result<(), RenderError> {
        let ListenSpec { event, handler } = listener;
        match self.take_match(|prior| prior.matches_listener(parent, &event)) {
            Some(Attachment::Listener(existing)) => {
                // Rebind in place; the live subscription reads through the cell.
                *existing.handler.borrow_mut() = handler;
                self.matched.push(Attachment::Listener(existing));
                self.fresh.push(false);
            }
            Some(_) => unreachable!("listener match returned a different variant"),
            None => {
                let cell = Rc::new(RefCell::new(handler));
                let read_through = Rc::clone(&cell);
                let callback: EventHandler = Rc::new(move |payload| {
                    let current = Rc::clone(&read_through.borrow());
                    current(payload);
                });
                let listener = self
                    .ctx
                    .host()
                    .borrow_mut()
                    .add_listener(parent, &event, callback)?;
                self.matched.push(Attachment::Listener(ListenerAttachment {
                    parent,
                    event,
                    handler: cell,
                    listener,
                }));
                self.fresh.push(true);
            }
        }
        Ok(())
    }

    fn apply_hook(&mut self, hook: HookSpec, parent: HostId) -> Result<(), RenderError> {
        let HookSpec {
            kind,
            configurator,
            reuse_keys,
        } = hook;
        match self.take_match(|prior| prior.matches_hook(parent, &kind, &reuse_keys)) {
            Some(existing @ Attachment::Hook(_)) => {
                self.matched.push(existing);
                self.fresh.push(false);
            }
            Some(_) => unreachable!("hook match returned a different variant"),
            None => {
                let mut binding = HookBinding::new();
                configurator(&mut binding);
                self.matched.push(Attachment::Hook(HookAttachment {
                    parent,
                    kind,
                    keys: reuse_keys,
                    binding,
                }));
                self.fresh.push(true);
            }
        }
        Ok(())
    }

    fn apply_props(
        &self,
        node: HostId,
        previous: &[(String, PropValue)],
        next: &[(String, PropValue)],
    ) -> Result<(), RenderError> {
        for (name, value) in next {
            let changed = match previous.iter().find(|(prior, _)| prior == name) {
                Some((_, old)) => old != value,
                None => true,
            };
            if !changed {
                continue;
            }
            match props::lookup(name) {
                Some(handler) => handler(&self.ctx, node, name, value)?,
                None => self.ctx.host().borrow_mut().set_property(node, name, value)?,
            }
        }
        Ok(())
    }

    /// Cursor rule for a matched node: a position at or before the cursor
    /// only advances the cursor (no host-tree move); anything later is
    /// relocated to the cursor.
    fn place_existing(&self, parent: HostId, node: HostId) -> Result<(), RenderError> {
        let host = self.ctx.host();
        let index = host
            .borrow()
            .child_index(parent, node)
            .ok_or(RenderError::Host(HostError::NotAChild { parent, child: node }))?;
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors.get(&parent).copied().unwrap_or(0);
        if index <= cursor {
            cursors.insert(parent, cursor.max(index + 1));
        } else {
            host.borrow_mut().move_child(parent, node, cursor)?;
            cursors.insert(parent, cursor + 1);
        }
        Ok(())
    }

    fn insert_at_cursor(&self, parent: HostId, node: HostId) -> Result<(), RenderError> {
        let host = self.ctx.host();
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors.get(&parent).copied().unwrap_or(0);
        host.borrow_mut().insert_child(parent, node, cursor)?;
        cursors.insert(parent, cursor + 1);
        Ok(())
    }

    fn take_match(&mut self, matches: impl Fn(&Attachment) -> bool) -> Option<Attachment> {
        let index = self.prior.iter().position(matches)?;
        Some(self.prior.remove(index))
    }
}

#[cfg(test)]
#[path = "tests/phase_tests.rs"]
mod tests;
