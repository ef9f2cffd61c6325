//! Stagehand: a retained-mode reconciliation engine.
//!
//! Components are plain functions from a state object to an immutable
//! [`Spec`] tree. A [`RenderContext`] owns one component instance over one
//! host parent; each pass reconciles the freshly produced specification
//! against the live attachments of the previous pass, reusing host nodes by
//! reference identity of the state flowing through each tree position.
//! Signalling a watched state object queues a debounced re-render on the
//! next frame of the shared [`Scheduler`].
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use stagehand_core::{
//!     component, element, text, MemoryHost, ManualPump, Scheduler, StateObj,
//! };
//!
//! let memory = Rc::new(RefCell::new(MemoryHost::new()));
//! let root = memory.borrow().root();
//! let host: stagehand_core::HostHandle = memory;
//! let scheduler = Scheduler::new(Arc::new(ManualPump::default()));
//! let greet = component(|state: &StateObj, _ctx| {
//!     let name = state.downcast_ref::<String>().cloned().unwrap_or_default();
//!     element("div").child(text(name)).into()
//! });
//! let ctx = stagehand_core::render(
//!     Rc::clone(&host),
//!     scheduler.handle(),
//!     root,
//!     StateObj::new("hello".to_string()),
//!     greet,
//! )
//! .unwrap();
//! # let _ = ctx;
//! ```

pub mod attachment;
mod collections;
pub mod context;
pub mod disposal;
pub mod host;
mod phase;
pub mod props;
pub mod scheduler;
pub mod signals;
pub mod spec;
pub mod tween;

use std::error::Error;
use std::fmt;

pub use attachment::HookBinding;
pub use context::RenderContext;
pub use disposal::OwnerToken;
pub use host::{HostError, HostHandle, HostId, HostTree, ListenerId, MemoryHost};
pub use props::{clear_property_handler, install_default_handlers, set_property_handler};
pub use scheduler::{FramePump, ManualPump, NoopPump, Scheduler, SchedulerHandle};
pub use signals::{signal, unwatch, watch};
pub use spec::{
    component, compose, compose_keyed, element, fragment, hook, hook_keyed, lazy, listen, text,
    try_component, Component, ComposeSpec, ElementSpec, EventHandler, HookSpec, ListenSpec,
    PropValue, ReuseKey, Spec, StateObj,
};
pub use tween::Tween;

#[derive(Debug)]
pub enum RenderError {
    /// The produced specification is invalid as written.
    MalformedSpec(String),
    /// `require` found no value under `name` in the context chain.
    MissingNamedValue { name: String },
    Host(HostError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MalformedSpec(reason) => {
                write!(f, "malformed specification: {reason}")
            }
            RenderError::MissingNamedValue { name } => {
                write!(f, "missing named value `{name}`")
            }
            RenderError::Host(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}

/// Creates a root context under `parent` and runs its first pass.
pub fn render(
    host: HostHandle,
    scheduler: SchedulerHandle,
    parent: HostId,
    state: StateObj,
    component: Component,
) -> Result<RenderContext, RenderError> {
    let ctx = RenderContext::new(host, scheduler, parent, component, None);
    ctx.render(state)?;
    Ok(ctx)
}

/// Like [`render`], seeding the root context's named-value store first.
pub fn render_with_values(
    host: HostHandle,
    scheduler: SchedulerHandle,
    parent: HostId,
    state: StateObj,
    component: Component,
    values: impl IntoIterator<Item = (String, StateObj)>,
) -> Result<RenderContext, RenderError> {
    let ctx = RenderContext::new(host, scheduler, parent, component, None);
    for (name, value) in values {
        ctx.set(&name, value);
    }
    ctx.render(state)?;
    Ok(ctx)
}
