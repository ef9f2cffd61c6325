//! Live attachments.
//!
//! Every pass instantiates (or re-matches) one attachment per live thing it
//! reconciled: a host node, a text node, an event subscription, a lifecycle
//! hook, or a nested render scope. An attachment has exactly one owner, the
//! context whose pass created it, and is released exactly once, either when
//! a later pass fails to match it or when its owning context is disposed.
//!
//! Listener and hook identity keys notionally include the owning context;
//! because attachments are stored per context, that component of the key is
//! implicit here.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::RenderContext;
use crate::disposal::{self, OwnerToken};
use crate::host::{HostId, ListenerId};
use crate::spec::{EventHandler, PropValue, ReuseKey};

/// Callback slots of one lifecycle hook, populated once by the user
/// configurator when the hook attachment is first created.
pub struct HookBinding {
    owner: OwnerToken,
    pub(crate) on_attach: Option<Box<dyn FnMut(&RenderContext, HostId)>>,
    pub(crate) on_update: Option<Box<dyn FnMut(&RenderContext, HostId)>>,
    pub(crate) on_remove: Option<Box<dyn FnMut(&RenderContext, HostId)>>,
    pub(crate) on_broadcast: Option<Box<dyn FnMut(&RenderContext, &str, Option<&crate::spec::StateObj>)>>,
    disposers: Vec<Box<dyn FnOnce()>>,
}

impl HookBinding {
    pub(crate) fn new() -> Self {
        Self {
            owner: disposal::register_owner(),
            on_attach: None,
            on_update: None,
            on_remove: None,
            on_broadcast: None,
            disposers: Vec::new(),
        }
    }

    /// Owner token for asynchronous work started by this hook. Work scheduled
    /// against it is silenced once the hook is removed.
    pub fn owner(&self) -> OwnerToken {
        self.owner
    }

    pub fn on_attach(&mut self, f: impl FnMut(&RenderContext, HostId) + 'static) {
        self.on_attach = Some(Box::new(f));
    }

    pub fn on_update(&mut self, f: impl FnMut(&RenderContext, HostId) + 'static) {
        self.on_update = Some(Box::new(f));
    }

    pub fn on_remove(&mut self, f: impl FnMut(&RenderContext, HostId) + 'static) {
        self.on_remove = Some(Box::new(f));
    }

    pub fn on_broadcast(
        &mut self,
        f: impl FnMut(&RenderContext, &str, Option<&crate::spec::StateObj>) + 'static,
    ) {
        self.on_broadcast = Some(Box::new(f));
    }

    /// Registers a sub-disposable released with the hook, after `on_remove`,
    /// in reverse registration order.
    pub fn on_dispose(&mut self, f: impl FnOnce() + 'static) {
        self.disposers.push(Box::new(f));
    }
}

pub(crate) struct NodeAttachment {
    pub kind: String,
    pub parent: HostId,
    pub state_id: usize,
    pub node: HostId,
    pub props: Vec<(String, PropValue)>,
}

pub(crate) struct TextAttachment {
    pub parent: HostId,
    pub node: HostId,
    pub content: String,
}

pub(crate) struct ListenerAttachment {
    pub parent: HostId,
    pub event: String,
    /// The subscribed closure reads through this cell, so a later pass can
    /// rebind the handler without resubscribing.
    pub handler: Rc<RefCell<EventHandler>>,
    pub listener: ListenerId,
}

pub(crate) struct HookAttachment {
    pub parent: HostId,
    pub kind: String,
    pub keys: Vec<ReuseKey>,
    pub binding: HookBinding,
}

pub(crate) struct ScopeAttachment {
    pub parent: HostId,
    pub key: ReuseKey,
    pub context: RenderContext,
}

pub(crate) enum Attachment {
    Node(NodeAttachment),
    Text(TextAttachment),
    Listener(ListenerAttachment),
    Hook(HookAttachment),
    Scope(ScopeAttachment),
}

impl Attachment {
    pub(crate) fn matches_node(&self, kind: &str, parent: HostId, state_id: usize) -> bool {
        matches!(self, Attachment::Node(node)
            if node.kind == kind && node.parent == parent && node.state_id == state_id)
    }

    pub(crate) fn matches_text(&self, parent: HostId) -> bool {
        matches!(self, Attachment::Text(text) if text.parent == parent)
    }

    pub(crate) fn matches_listener(&self, parent: HostId, event: &str) -> bool {
        matches!(self, Attachment::Listener(listener)
            if listener.parent == parent && listener.event == event)
    }

    pub(crate) fn matches_hook(&self, parent: HostId, kind: &str, keys: &[ReuseKey]) -> bool {
        matches!(self, Attachment::Hook(hook)
            if hook.parent == parent && hook.kind == kind && hook.keys == keys)
    }

    pub(crate) fn matches_scope(&self, parent: HostId, key: &ReuseKey) -> bool {
        matches!(self, Attachment::Scope(scope)
            if scope.parent == parent && scope.key == *key)
    }

    /// Releases the one resource this attachment owns. Host failures here are
    /// logged rather than propagated: release must complete so that ownership
    /// never dangles.
    pub(crate) fn release(self, ctx: &RenderContext) {
        match self {
            Attachment::Node(node) => {
                let host = ctx.host();
                let removed = host.borrow_mut().remove_child(node.parent, node.node);
                if let Err(err) = removed {
                    log::warn!("releasing <{}> node {}: {err}", node.kind, node.node);
                }
            }
            Attachment::Text(text) => {
                let host = ctx.host();
                let removed = host.borrow_mut().remove_child(text.parent, text.node);
                if let Err(err) = removed {
                    log::warn!("releasing text node {}: {err}", text.node);
                }
            }
            Attachment::Listener(listener) => {
                let host = ctx.host();
                let removed = host.borrow_mut().remove_listener(
                    listener.parent,
                    &listener.event,
                    listener.listener,
                );
                if let Err(err) = removed {
                    log::warn!("releasing `{}` listener: {err}", listener.event);
                }
            }
            Attachment::Hook(mut hook) => {
                if let Some(mut on_remove) = hook.binding.on_remove.take() {
                    on_remove(ctx, hook.parent);
                }
                while let Some(disposer) = hook.binding.disposers.pop() {
                    disposer();
                }
                disposal::mark_disposed(hook.binding.owner);
            }
            Attachment::Scope(scope) => {
                scope.context.dispose();
            }
        }
    }
}
