use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::host::{HostHandle, HostTree, MemoryHost};
use crate::props;
use crate::scheduler::{ManualPump, Scheduler};
use crate::spec::{
    self, component, compose, element, fragment, lazy, listen, text, PropValue, Spec, StateObj,
};
use crate::{render, RenderContext, RenderError};

struct Stage {
    memory: Rc<RefCell<MemoryHost>>,
    host: HostHandle,
    scheduler: Scheduler,
}

impl Stage {
    fn new() -> Self {
        let memory = Rc::new(RefCell::new(MemoryHost::new()));
        let host: HostHandle = memory.clone();
        Self {
            memory,
            host,
            scheduler: Scheduler::new(Arc::new(ManualPump::default())),
        }
    }

    fn render(&self, state: StateObj, component: spec::Component) -> RenderContext {
        render(
            Rc::clone(&self.host),
            self.scheduler.handle(),
            0,
            state,
            component,
        )
        .expect("render succeeds")
    }

    fn root_children(&self) -> Vec<usize> {
        self.memory.borrow().children_of(0)
    }
}

fn label_of(stage: &Stage, node: usize) -> String {
    let memory = stage.memory.borrow();
    let inner = memory.children_of(node);
    memory.text_of(inner[0]).expect("has text").to_owned()
}

#[test]
fn renders_elements_text_and_props() {
    let stage = Stage::new();
    let ctx = stage.render(
        StateObj::new(()),
        component(|_, _| {
            element("div")
                .prop("title", "greeting")
                .child(text("hello"))
                .into()
        }),
    );
    let children = stage.root_children();
    assert_eq!(children.len(), 1);
    let div = children[0];
    let memory = stage.memory.borrow();
    assert_eq!(memory.kind_of(div), Some("div"));
    assert_eq!(
        memory.property(div, "title"),
        Some(PropValue::Str("greeting".into()))
    );
    let inner = memory.children_of(div);
    assert_eq!(inner.len(), 1);
    assert_eq!(memory.text_of(inner[0]), Some("hello"));
    drop(memory);
    ctx.dispose();
}

#[test]
fn idempotent_update_touches_nothing() {
    let stage = Stage::new();
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(|_, _| {
            element("div")
                .child(text("a"))
                .child(element("span").child(text("b")))
                .into()
        }),
    );
    let before = stage.root_children();
    let created = stage.memory.borrow().created();
    ctx.update(Some(state)).expect("update succeeds");
    assert_eq!(stage.root_children(), before);
    assert_eq!(stage.memory.borrow().created(), created);
    assert_eq!(stage.memory.borrow().removed(), 0);
    ctx.dispose();
}

#[test]
fn new_state_identity_rebuilds_the_element() {
    let stage = Stage::new();
    let ctx = stage.render(
        StateObj::new(1u32),
        component(|_, _| element("div").into()),
    );
    let first = stage.root_children()[0];
    ctx.update(Some(StateObj::new(1u32))).expect("update succeeds");
    let second = stage.root_children()[0];
    assert_ne!(first, second);
    assert!(!stage.memory.borrow().exists(first));
    ctx.dispose();
}

#[test]
fn text_content_updates_in_place() {
    let stage = Stage::new();
    let content = Rc::new(RefCell::new("one".to_owned()));
    let content_in = Rc::clone(&content);
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| text(content_in.borrow().clone())),
    );
    let node = stage.root_children()[0];
    *content.borrow_mut() = "two".to_owned();
    ctx.update(Some(state)).expect("update succeeds");
    assert_eq!(stage.root_children(), vec![node]);
    assert_eq!(stage.memory.borrow().text_of(node), Some("two"));
    ctx.dispose();
}

#[test]
fn fragment_flattens_into_parent() {
    let stage = Stage::new();
    let ctx = stage.render(
        StateObj::new(()),
        component(|_, _| {
            fragment([
                text("a"),
                Spec::Empty,
                element("hr").into(),
                fragment([text("b")]),
            ])
        }),
    );
    let memory = stage.memory.borrow();
    let children = memory.children_of(0);
    assert_eq!(children.len(), 3);
    assert_eq!(memory.text_of(children[0]), Some("a"));
    assert_eq!(memory.kind_of(children[1]), Some("hr"));
    assert_eq!(memory.text_of(children[2]), Some("b"));
    drop(memory);
    ctx.dispose();
}

#[test]
fn lazy_expands_without_its_own_attachment() {
    let stage = Stage::new();
    let ctx = stage.render(
        StateObj::new("late".to_owned()),
        component(|_, _| {
            lazy(|state, _| {
                let label = state.downcast_ref::<String>().cloned().unwrap_or_default();
                element("div").child(text(label)).into()
            })
        }),
    );
    let children = stage.root_children();
    assert_eq!(children.len(), 1);
    assert_eq!(label_of(&stage, children[0]), "late");
    ctx.dispose();
}

#[test]
fn list_reorder_preserves_item_nodes() {
    let stage = Stage::new();
    let a = StateObj::new("a".to_owned());
    let b = StateObj::new("b".to_owned());
    let c = StateObj::new("c".to_owned());
    let item = component(|state: &StateObj, _: &RenderContext| {
        let label = state.downcast_ref::<String>().cloned().unwrap_or_default();
        element("item").child(text(label)).into()
    });
    let ctx = stage.render(
        StateObj::list([a.clone(), b.clone(), c.clone()]),
        item.clone(),
    );
    let before = stage.root_children();
    assert_eq!(before.len(), 3);
    let labels: Vec<String> = before.iter().map(|n| label_of(&stage, *n)).collect();
    assert_eq!(labels, ["a", "b", "c"]);
    let created = stage.memory.borrow().created();

    ctx.update(Some(StateObj::list([c, a, b]))).expect("update succeeds");
    let after = stage.root_children();
    let labels: Vec<String> = after.iter().map(|n| label_of(&stage, *n)).collect();
    assert_eq!(labels, ["c", "a", "b"]);
    // Same nodes, only repositioned.
    assert_eq!(after[0], before[2]);
    assert_eq!(after[1], before[0]);
    assert_eq!(after[2], before[1]);
    assert_eq!(stage.memory.borrow().created(), created);
    assert_eq!(stage.memory.borrow().removed(), 0);
    ctx.dispose();
}

#[test]
fn list_removal_releases_the_item_scope() {
    let stage = Stage::new();
    let a = StateObj::new("a".to_owned());
    let b = StateObj::new("b".to_owned());
    let item = component(|state: &StateObj, _: &RenderContext| {
        let label = state.downcast_ref::<String>().cloned().unwrap_or_default();
        element("item").child(text(label)).into()
    });
    let ctx = stage.render(StateObj::list([a.clone(), b.clone()]), item);
    let before = stage.root_children();
    ctx.update(Some(StateObj::list([b]))).expect("update succeeds");
    let after = stage.root_children();
    assert_eq!(after, vec![before[1]]);
    assert!(!stage.memory.borrow().exists(before[0]));
    ctx.dispose();
}

#[test]
fn sibling_scopes_interleave_through_the_shared_cursor() {
    let stage = Stage::new();
    let left = StateObj::new("left".to_owned());
    let right = StateObj::new("right".to_owned());
    let order = Rc::new(RefCell::new(vec![left.clone(), right.clone()]));
    let order_in = Rc::clone(&order);
    let item = component(|state: &StateObj, _: &RenderContext| {
        let label = state.downcast_ref::<String>().cloned().unwrap_or_default();
        element("item").child(text(label)).into()
    });
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| {
            fragment(
                order_in
                    .borrow()
                    .iter()
                    .map(|item_state| compose(item_state.clone(), item.clone()))
                    .collect::<Vec<_>>(),
            )
        }),
    );
    let before = stage.root_children();
    assert_eq!(
        before.iter().map(|n| label_of(&stage, *n)).collect::<Vec<_>>(),
        ["left", "right"]
    );

    order.borrow_mut().reverse();
    ctx.update(Some(state)).expect("update succeeds");
    let after = stage.root_children();
    assert_eq!(
        after.iter().map(|n| label_of(&stage, *n)).collect::<Vec<_>>(),
        ["right", "left"]
    );
    assert_eq!(after[0], before[1]);
    assert_eq!(after[1], before[0]);
    ctx.dispose();
}

#[test]
fn insertion_between_matched_siblings_lands_at_the_cursor() {
    let stage = Stage::new();
    let show_middle = Rc::new(Cell::new(false));
    let show_in = Rc::clone(&show_middle);
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| {
            let mut children: Vec<Spec> = vec![element("first").into()];
            if show_in.get() {
                children.push(element("middle").into());
            }
            children.push(element("last").into());
            fragment(children)
        }),
    );
    let before = stage.root_children();
    assert_eq!(before.len(), 2);

    show_middle.set(true);
    ctx.update(Some(state)).expect("update succeeds");
    let after = stage.root_children();
    assert_eq!(after.len(), 3);
    // Both neighbors are reused in place; only the new node is created.
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[1]);
    assert_eq!(stage.memory.borrow().kind_of(after[1]), Some("middle"));
    assert_eq!(stage.memory.borrow().removed(), 0);
    ctx.dispose();
}

#[test]
fn conditional_branch_releases_its_attachments() {
    let stage = Stage::new();
    let show = Rc::new(Cell::new(true));
    let show_in = Rc::clone(&show);
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| {
            if show_in.get() {
                element("panel")
                    .child(text("content"))
                    .child(listen("click", |_| {}))
                    .into()
            } else {
                Spec::Empty
            }
        }),
    );
    let panel = stage.root_children()[0];
    assert_eq!(stage.memory.borrow().listener_count(panel), 1);

    show.set(false);
    ctx.update(Some(state)).expect("update succeeds");
    assert!(stage.root_children().is_empty());
    assert!(!stage.memory.borrow().exists(panel));
    ctx.dispose();
}

#[test]
fn listener_rebinds_to_the_latest_handler() {
    let stage = Stage::new();
    let first = Rc::new(Cell::new(0u32));
    let second = Rc::new(Cell::new(0u32));
    let use_second = Rc::new(Cell::new(false));
    let (first_in, second_in, use_second_in) =
        (Rc::clone(&first), Rc::clone(&second), Rc::clone(&use_second));
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| {
            let handler: Spec = if use_second_in.get() {
                let hits = Rc::clone(&second_in);
                listen("click", move |_| hits.set(hits.get() + 1))
            } else {
                let hits = Rc::clone(&first_in);
                listen("click", move |_| hits.set(hits.get() + 1))
            };
            element("button").child(handler).into()
        }),
    );
    let button = stage.root_children()[0];
    MemoryHost::dispatch(&stage.memory, button, "click", None);
    assert_eq!((first.get(), second.get()), (1, 0));

    use_second.set(true);
    ctx.update(Some(state)).expect("update succeeds");
    assert_eq!(stage.memory.borrow().listener_count(button), 1);
    MemoryHost::dispatch(&stage.memory, button, "click", None);
    assert_eq!((first.get(), second.get()), (1, 1));
    ctx.dispose();
}

#[test]
fn duplicate_property_declaration_is_rejected() {
    let stage = Stage::new();
    let result = render(
        Rc::clone(&stage.host),
        stage.scheduler.handle(),
        0,
        StateObj::new(()),
        component(|_, _| element("div").prop("x", 1.0).prop("x", 2.0).into()),
    );
    assert!(matches!(result, Err(RenderError::MalformedSpec(_))));
}

#[test]
fn unchanged_props_are_not_reapplied() {
    let stage = Stage::new();
    let calls = Rc::new(Cell::new(0u32));
    let calls_in = Rc::clone(&calls);
    props::set_property_handler(
        "counted",
        Rc::new(move |_ctx, _node, _name, _value| {
            calls_in.set(calls_in.get() + 1);
            Ok(())
        }),
    );
    let value = Rc::new(Cell::new(1.0f64));
    let value_in = Rc::clone(&value);
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        component(move |_, _| element("div").prop("counted", value_in.get()).into()),
    );
    assert_eq!(calls.get(), 1);

    ctx.update(Some(state.clone())).expect("update succeeds");
    assert_eq!(calls.get(), 1);

    value.set(2.0);
    ctx.update(Some(state)).expect("update succeeds");
    assert_eq!(calls.get(), 2);
    props::clear_property_handler("counted");
    ctx.dispose();
}

#[test]
fn compose_scope_survives_parent_updates() {
    let stage = Stage::new();
    let child_state = StateObj::new("child".to_owned());
    let child = component(|state: &StateObj, _: &RenderContext| {
        let label = state.downcast_ref::<String>().cloned().unwrap_or_default();
        element("child").child(text(label)).into()
    });
    let parent_state = StateObj::new(());
    let child_state_in = child_state.clone();
    let ctx = stage.render(
        parent_state.clone(),
        component(move |_, _| {
            element("parent")
                .child(compose(child_state_in.clone(), child.clone()))
                .into()
        }),
    );
    let parent = stage.root_children()[0];
    let inner = stage.memory.borrow().children_of(parent);
    let created = stage.memory.borrow().created();

    ctx.update(Some(parent_state)).expect("update succeeds");
    assert_eq!(stage.memory.borrow().children_of(parent), inner);
    assert_eq!(stage.memory.borrow().created(), created);
    ctx.dispose();
}

#[test]
fn failed_pass_keeps_the_tree_and_recovers() {
    let stage = Stage::new();
    let fail = Rc::new(Cell::new(false));
    let fail_in = Rc::clone(&fail);
    let state = StateObj::new(());
    let ctx = stage.render(
        state.clone(),
        spec::try_component(move |_, _| {
            if fail_in.get() {
                return Err(RenderError::MalformedSpec("induced".into()));
            }
            Ok(element("div").child(text("ok")).into())
        }),
    );
    let node = stage.root_children()[0];

    fail.set(true);
    assert!(ctx.update(Some(state.clone())).is_err());
    assert_eq!(stage.root_children(), vec![node]);
    assert!(stage.memory.borrow().exists(node));

    fail.set(false);
    ctx.update(Some(state)).expect("recovery succeeds");
    assert_eq!(stage.root_children(), vec![node]);
    ctx.dispose();
}

#[test]
fn dispose_removes_the_whole_subtree() {
    let stage = Stage::new();
    let child_state = StateObj::new("x".to_owned());
    let child = component(|_, _: &RenderContext| element("leaf").into());
    let child_state_in = child_state.clone();
    let ctx = stage.render(
        StateObj::new(()),
        component(move |_, _| {
            element("wrap")
                .child(compose(child_state_in.clone(), child.clone()))
                .into()
        }),
    );
    assert_eq!(stage.root_children().len(), 1);
    ctx.dispose();
    assert!(stage.root_children().is_empty());
    assert!(ctx.is_disposed());
    // Disposal is final.
    ctx.update(Some(StateObj::new(()))).expect("no-op");
    assert!(stage.root_children().is_empty());
}
