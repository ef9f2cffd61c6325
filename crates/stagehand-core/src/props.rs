//! Per-property override hooks.
//!
//! A global, mutable name→handler registry consulted while applying element
//! properties. A registered handler fully replaces the default behavior
//! (direct `HostTree::set_property` assignment) for that property name.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collections::{HashMap, HashSet};
use crate::context::RenderContext;
use crate::host::HostId;
use crate::spec::{PropValue, StateObj};
use crate::RenderError;

pub type PropertyHandler =
    Rc<dyn Fn(&RenderContext, HostId, &str, &PropValue) -> Result<(), RenderError>>;

thread_local! {
    static HANDLERS: RefCell<HashMap<String, PropertyHandler>> =
        RefCell::new(HashMap::default());
}

/// Installs (or replaces) the handler for `name`.
pub fn set_property_handler(name: &str, handler: PropertyHandler) {
    HANDLERS.with(|handlers| {
        handlers.borrow_mut().insert(name.to_owned(), handler);
    });
}

/// Removes the handler for `name`, restoring direct assignment.
pub fn clear_property_handler(name: &str) {
    HANDLERS.with(|handlers| {
        handlers.borrow_mut().remove(name);
    });
}

pub(crate) fn lookup(name: &str) -> Option<PropertyHandler> {
    HANDLERS.with(|handlers| handlers.borrow().get(name).cloned())
}

/// Installs the built-in handlers: `bind` and `classes`.
pub fn install_default_handlers() {
    set_property_handler("bind", Rc::new(bind_handler));
    set_property_handler("classes", Rc::new(classes_handler));
}

/// `bind="name"` stores the host node into the context's named-value store
/// under `name`, so ancestors and descendants can look it up.
fn bind_handler(
    ctx: &RenderContext,
    node: HostId,
    _name: &str,
    value: &PropValue,
) -> Result<(), RenderError> {
    let PropValue::Str(key) = value else {
        return Err(RenderError::MalformedSpec(
            "`bind` expects a string value".to_owned(),
        ));
    };
    ctx.set(key, StateObj::new(node));
    Ok(())
}

/// `classes="a b"` reconciles a whitespace-separated class set against the
/// node's current membership: declared classes are added, membership added
/// by other parties is preserved.
fn classes_handler(
    ctx: &RenderContext,
    node: HostId,
    name: &str,
    value: &PropValue,
) -> Result<(), RenderError> {
    let PropValue::Str(declared) = value else {
        return Err(RenderError::MalformedSpec(
            "`classes` expects a string value".to_owned(),
        ));
    };
    let host = ctx.host();
    let mut host = host.borrow_mut();
    let mut merged: Vec<String> = match host.property(node, name) {
        Some(PropValue::Str(current)) => current.split_whitespace().map(str::to_owned).collect(),
        _ => Vec::new(),
    };
    let mut seen: HashSet<String> = merged.iter().cloned().collect();
    for class in declared.split_whitespace() {
        if seen.insert(class.to_owned()) {
            merged.push(class.to_owned());
        }
    }
    host.set_property(node, name, &PropValue::Str(merged.join(" ")))?;
    Ok(())
}
