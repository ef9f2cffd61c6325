//! Consolidated frame scheduler.
//!
//! All future work in the engine funnels through [`SchedulerHandle::on_next_frame`]:
//! debounced re-renders, tween steps, and any user callback that must observe
//! the next display refresh. The host environment drives the scheduler by
//! calling [`Scheduler::run_frame`] whenever its [`FramePump`] requested one.
//! Actions whose owner was disposed before the frame arrives are skipped
//! silently; that is the engine's substitute for cancellation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::disposal::{self, OwnerToken};

pub type FrameActionId = u64;

/// Notifies the host environment that a frame is wanted.
pub trait FramePump: Send + Sync {
    fn request_frame(&self);
}

/// Pump for hosts that poll the scheduler themselves.
#[derive(Default)]
pub struct NoopPump;

impl FramePump for NoopPump {
    fn request_frame(&self) {}
}

/// Records frame requests so tests and demos can drive frames by hand.
#[derive(Default)]
pub struct ManualPump {
    requested: std::sync::atomic::AtomicBool,
}

impl ManualPump {
    pub fn take_requested(&self) -> bool {
        self.requested
            .swap(false, std::sync::atomic::Ordering::Relaxed)
    }
}

impl FramePump for ManualPump {
    fn request_frame(&self) {
        self.requested
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

struct FrameAction {
    id: FrameActionId,
    owner: OwnerToken,
    action: Box<dyn FnOnce(u64)>,
}

struct SchedulerInner {
    pump: Arc<dyn FramePump>,
    queue: RefCell<VecDeque<FrameAction>>,
    next_id: Cell<FrameActionId>,
    needs_frame: Cell<bool>,
}

impl SchedulerInner {
    fn schedule(&self, owner: OwnerToken, action: Box<dyn FnOnce(u64)>) -> FrameActionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.queue.borrow_mut().push_back(FrameAction { id, owner, action });
        if !self.needs_frame.replace(true) {
            self.pump.request_frame();
        }
        id
    }

    fn cancel(&self, id: FrameActionId) {
        let mut queue = self.queue.borrow_mut();
        if let Some(index) = queue.iter().position(|entry| entry.id == id) {
            queue.remove(index);
        }
        if queue.is_empty() {
            self.needs_frame.set(false);
        }
    }

    fn run_frame(&self, now_nanos: u64) {
        // Drain the current queue only; actions scheduled from inside a frame
        // land on the next one.
        let due: Vec<FrameAction> = self.queue.borrow_mut().drain(..).collect();
        self.needs_frame.set(false);
        let mut skipped = 0usize;
        for entry in due {
            if disposal::is_disposed(entry.owner) {
                skipped += 1;
                continue;
            }
            (entry.action)(now_nanos);
        }
        if skipped > 0 {
            log::trace!("frame drain skipped {skipped} disposed action(s)");
        }
    }
}

/// Owns the frame queue. Hosts hold the `Scheduler`; everything inside the
/// engine holds weak [`SchedulerHandle`]s.
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(pump: Arc<dyn FramePump>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                pump,
                queue: RefCell::new(VecDeque::new()),
                next_id: Cell::new(1),
                needs_frame: Cell::new(false),
            }),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    /// Runs every action that was queued before this call. `now_nanos` is the
    /// frame timestamp handed to each action.
    pub fn run_frame(&self, now_nanos: u64) {
        self.inner.run_frame(now_nanos);
    }
}

#[derive(Clone)]
pub struct SchedulerHandle(Weak<SchedulerInner>);

impl SchedulerHandle {
    /// Schedules `action` for the next frame. Returns `None` when the
    /// scheduler itself is gone, in which case the action is dropped.
    pub fn on_next_frame(
        &self,
        owner: OwnerToken,
        action: impl FnOnce(u64) + 'static,
    ) -> Option<FrameActionId> {
        self.0
            .upgrade()
            .map(|inner| inner.schedule(owner, Box::new(action)))
    }

    pub fn cancel(&self, id: FrameActionId) {
        if let Some(inner) = self.0.upgrade() {
            inner.cancel(id);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| !inner.queue.borrow().is_empty())
            .unwrap_or(false)
    }
}
