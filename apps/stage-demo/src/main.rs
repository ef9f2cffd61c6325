//! Renders a small task list into the in-memory host, drives a couple of
//! state changes through signals and manual frames, and dumps the host tree
//! after each step. Run with `RUST_LOG=trace` to watch the engine work.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use stagehand_core::{
    component, compose_keyed, element, fragment, listen, signal, text, HostHandle, ManualPump,
    MemoryHost, Scheduler, Spec, StateObj,
};

struct Task {
    label: String,
    done: Cell<bool>,
}

fn task(label: &str) -> StateObj {
    StateObj::new(Task {
        label: label.to_owned(),
        done: Cell::new(false),
    })
}

fn main() {
    env_logger::init();

    let memory = Rc::new(RefCell::new(MemoryHost::new()));
    let host: HostHandle = memory.clone();
    let root = memory.borrow().root();
    let pump = Arc::new(ManualPump::default());
    let scheduler = Scheduler::new(pump.clone());

    stagehand_core::install_default_handlers();

    let row = component(|state: &StateObj, _| {
        let Some(task) = state.downcast_ref::<Task>() else {
            return Spec::Empty;
        };
        let mark = if task.done.get() { "[x]" } else { "[ ]" };
        let state_for_click = state.clone();
        element("row")
            .prop("classes", if task.done.get() { "task done" } else { "task" })
            .child(text(format!("{mark} {}", task.label)))
            .child(listen("click", move |_| {
                if let Some(task) = state_for_click.downcast_ref::<Task>() {
                    task.done.set(!task.done.get());
                }
                signal(&state_for_click, None);
            }))
            .into()
    });

    let tasks = Rc::new(RefCell::new(vec![
        task("write the demo"),
        task("reorder the list"),
        task("mark one done"),
    ]));
    // One scope per task keyed by task identity, so reordering moves nodes
    // instead of rebuilding them.
    let tasks_in = Rc::clone(&tasks);
    let app = component(move |_, _| {
        fragment(
            tasks_in
                .borrow()
                .iter()
                .map(|item| compose_keyed(item.clone(), row.clone(), item))
                .collect::<Vec<_>>(),
        )
    });

    let app_state = StateObj::new(());
    let ctx = stagehand_core::render(
        Rc::clone(&host),
        scheduler.handle(),
        root,
        app_state.clone(),
        app,
    )
    .expect("initial render");

    println!("initial:\n{}", memory.borrow().dump_tree(root));
    let created_after_first = memory.borrow().created();

    // Toggle the middle task by dispatching its click, then run the frame the
    // signal scheduled.
    let rows = memory.borrow().children_of(root);
    MemoryHost::dispatch(&memory, rows[1], "click", None);
    let mut now = 0u64;
    while pump.take_requested() {
        now += 16_000_000;
        scheduler.run_frame(now);
    }
    println!("after toggle:\n{}", memory.borrow().dump_tree(root));

    // Reorder: same task objects, new order. Nodes move, nothing is rebuilt.
    tasks.borrow_mut().rotate_left(1);
    ctx.update(Some(app_state)).expect("reorder");
    println!("after reorder:\n{}", memory.borrow().dump_tree(root));
    assert_eq!(memory.borrow().created(), created_after_first);

    ctx.dispose();
    log::info!(
        "done: {} node(s) created, {} removed",
        memory.borrow().created(),
        memory.borrow().removed()
    );
}
