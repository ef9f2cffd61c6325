//! The immutable specification model.
//!
//! A component produces a fresh [`Spec`] tree on every pass; the engine
//! matches it against the live attachments of the previous pass. Reuse is
//! decided by *reference identity* of the ambient state object flowing
//! through a tree position, never by structural equality: two different
//! allocations with equal contents are different identities on purpose.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::attachment::HookBinding;
use crate::context::RenderContext;
use crate::RenderError;

/// A reference-counted, reference-identified application state value.
///
/// Cloning a `StateObj` preserves its identity; constructing a new one from
/// equal contents does not. Callers who want list items to keep their
/// per-item scopes across renders must hand the engine the *same* `StateObj`
/// clones, not rebuilt ones.
#[derive(Clone)]
pub struct StateObj {
    inner: Rc<dyn Any>,
}

struct StateList(Vec<StateObj>);

impl StateObj {
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
        }
    }

    pub fn from_rc<T: 'static>(value: Rc<T>) -> Self {
        Self { inner: value }
    }

    /// Wraps a sequence. A context whose state is a list renders in list
    /// mode: one nested scope per item, keyed by item identity.
    pub fn list(items: impl IntoIterator<Item = StateObj>) -> Self {
        Self::new(StateList(items.into_iter().collect()))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_ref().downcast_ref()
    }

    pub fn as_list(&self) -> Option<&[StateObj]> {
        self.downcast_ref::<StateList>().map(|list| list.0.as_slice())
    }

    /// Stable identity for the lifetime of the underlying allocation.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn same(&self, other: &StateObj) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for StateObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateObj({:#x})", self.identity())
    }
}

/// Key deciding whether a new specification may take over a prior attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReuseKey {
    /// Identity of a state object.
    Object(usize),
    Str(String),
    Int(i64),
}

impl ReuseKey {
    pub fn of(state: &StateObj) -> Self {
        ReuseKey::Object(state.identity())
    }
}

impl From<&StateObj> for ReuseKey {
    fn from(state: &StateObj) -> Self {
        ReuseKey::of(state)
    }
}

impl From<&str> for ReuseKey {
    fn from(value: &str) -> Self {
        ReuseKey::Str(value.to_owned())
    }
}

impl From<String> for ReuseKey {
    fn from(value: String) -> Self {
        ReuseKey::Str(value)
    }
}

impl From<i64> for ReuseKey {
    fn from(value: i64) -> Self {
        ReuseKey::Int(value)
    }
}

/// Value of a declared element property.
#[derive(Clone, Debug)]
pub enum PropValue {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Opaque value compared by identity.
    Obj(StateObj),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Num(a), PropValue::Num(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Obj(a), PropValue::Obj(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Num(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Num(value as f64)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<StateObj> for PropValue {
    fn from(value: StateObj) -> Self {
        PropValue::Obj(value)
    }
}

/// A component: state in, specification out. Fallible so that assembly
/// errors (missing ambient values, malformed specs) surface to the caller of
/// `render`/`update` instead of being swallowed.
pub type Component = Rc<dyn Fn(&StateObj, &RenderContext) -> Result<Spec, RenderError>>;

/// Wraps an infallible component function.
pub fn component(f: impl Fn(&StateObj, &RenderContext) -> Spec + 'static) -> Component {
    Rc::new(move |state, ctx| Ok(f(state, ctx)))
}

/// Wraps a fallible component function.
pub fn try_component(
    f: impl Fn(&StateObj, &RenderContext) -> Result<Spec, RenderError> + 'static,
) -> Component {
    Rc::new(f)
}

/// Handler for a host event subscription. The payload is whatever the host
/// dispatched, if anything.
pub type EventHandler = Rc<dyn Fn(Option<&StateObj>)>;

/// What should exist at one tree position for one pass.
pub enum Spec {
    /// Nothing; ignored by the pass.
    Empty,
    /// A host text node.
    Text(String),
    /// A host node descriptor.
    Element(ElementSpec),
    /// A flattened sequence of specifications.
    Fragment(Vec<Spec>),
    /// A nested render scope over its own state.
    Compose(ComposeSpec),
    /// A host event subscription on the enclosing node.
    Listen(ListenSpec),
    /// A generic attach/update/remove/broadcast lifecycle hook.
    Hook(HookSpec),
    /// A derived component expanded in place, with no attachment of its own.
    Lazy(Component),
}

pub struct ElementSpec {
    pub kind: String,
    pub props: Vec<(String, PropValue)>,
    pub children: Vec<Spec>,
}

impl ElementSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Spec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Spec>) -> Self {
        self.children.extend(children);
        self
    }
}

impl From<ElementSpec> for Spec {
    fn from(el: ElementSpec) -> Self {
        Spec::Element(el)
    }
}

pub struct ComposeSpec {
    pub state: StateObj,
    pub component: Component,
    pub reuse_key: ReuseKey,
}

pub struct ListenSpec {
    pub event: String,
    pub handler: EventHandler,
}

pub struct HookSpec {
    pub kind: String,
    pub configurator: Rc<dyn Fn(&mut HookBinding)>,
    pub reuse_keys: Vec<ReuseKey>,
}

pub fn text(content: impl Into<String>) -> Spec {
    Spec::Text(content.into())
}

pub fn element(kind: impl Into<String>) -> ElementSpec {
    ElementSpec::new(kind)
}

pub fn fragment(children: impl IntoIterator<Item = Spec>) -> Spec {
    Spec::Fragment(children.into_iter().collect())
}

/// Composes `component` over `state` in a nested scope keyed by the state
/// object itself.
pub fn compose(state: StateObj, component: Component) -> Spec {
    let reuse_key = ReuseKey::of(&state);
    Spec::Compose(ComposeSpec {
        state,
        component,
        reuse_key,
    })
}

/// Like [`compose`], with an explicit reuse key. Needed when sibling
/// compositions share one state object, or when the state wrapper is rebuilt
/// every render.
pub fn compose_keyed(state: StateObj, component: Component, key: impl Into<ReuseKey>) -> Spec {
    Spec::Compose(ComposeSpec {
        state,
        component,
        reuse_key: key.into(),
    })
}

pub fn listen(event: impl Into<String>, handler: impl Fn(Option<&StateObj>) + 'static) -> Spec {
    Spec::Listen(ListenSpec {
        event: event.into(),
        handler: Rc::new(handler),
    })
}

pub fn hook(kind: impl Into<String>, configurator: impl Fn(&mut HookBinding) + 'static) -> Spec {
    Spec::Hook(HookSpec {
        kind: kind.into(),
        configurator: Rc::new(configurator),
        reuse_keys: Vec::new(),
    })
}

pub fn hook_keyed(
    kind: impl Into<String>,
    reuse_keys: Vec<ReuseKey>,
    configurator: impl Fn(&mut HookBinding) + 'static,
) -> Spec {
    Spec::Hook(HookSpec {
        kind: kind.into(),
        configurator: Rc::new(configurator),
        reuse_keys,
    })
}

pub fn lazy(f: impl Fn(&StateObj, &RenderContext) -> Spec + 'static) -> Spec {
    Spec::Lazy(component(f))
}
