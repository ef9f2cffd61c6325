//! Frame-driven scalar interpolation.
//!
//! A [`Tween`] steps a single `f32` toward a target, one frame at a time,
//! through the shared scheduler. It keeps at most one queued frame action;
//! retargeting mid-flight restarts the interpolation from the current value.
//! Disposing the owner it was built with stops it cold.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::disposal::OwnerToken;
use crate::scheduler::{FrameActionId, SchedulerHandle};

pub type Easing = fn(f32) -> f32;

pub fn linear(t: f32) -> f32 {
    t
}

pub fn ease_out_quad(t: f32) -> f32 {
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Smoothstep.
pub fn ease_in_out(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

const DEFAULT_DURATION_NANOS: u64 = 200_000_000;

struct TweenInner {
    scheduler: SchedulerHandle,
    owner: OwnerToken,
    current: f32,
    start: f32,
    target: f32,
    /// Frame timestamp of the first step of the running interpolation.
    start_nanos: Option<u64>,
    duration_nanos: u64,
    easing: Easing,
    pending: Option<FrameActionId>,
    on_change: Option<Rc<dyn Fn(f32)>>,
}

#[derive(Clone)]
pub struct Tween {
    inner: Rc<RefCell<TweenInner>>,
}

impl Tween {
    pub fn new(scheduler: SchedulerHandle, owner: OwnerToken, initial: f32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TweenInner {
                scheduler,
                owner,
                current: initial,
                start: initial,
                target: initial,
                start_nanos: None,
                duration_nanos: DEFAULT_DURATION_NANOS,
                easing: ease_in_out,
                pending: None,
                on_change: None,
            })),
        }
    }

    pub fn with_duration_millis(self, millis: u64) -> Self {
        self.inner.borrow_mut().duration_nanos = millis.saturating_mul(1_000_000).max(1);
        self
    }

    pub fn with_easing(self, easing: Easing) -> Self {
        self.inner.borrow_mut().easing = easing;
        self
    }

    /// Called after every step with the new value, including the final one.
    pub fn on_change(&self, f: impl Fn(f32) + 'static) {
        self.inner.borrow_mut().on_change = Some(Rc::new(f));
    }

    pub fn value(&self) -> f32 {
        self.inner.borrow().current
    }

    pub fn target(&self) -> f32 {
        self.inner.borrow().target
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Starts (or retargets) the interpolation toward `target`. Already being
    /// at the target is a no-op.
    pub fn animate_to(&self, target: f32) {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(id) = inner.pending.take() {
                inner.scheduler.cancel(id);
            }
            inner.start = inner.current;
            inner.target = target;
            inner.start_nanos = None;
            if inner.start == inner.target {
                return;
            }
        }
        TweenInner::schedule(&self.inner);
    }

    /// Stops mid-flight, holding the current value.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.pending.take() {
            inner.scheduler.cancel(id);
        }
        inner.target = inner.current;
        inner.start_nanos = None;
    }
}

impl TweenInner {
    fn schedule(this: &Rc<RefCell<TweenInner>>) {
        let (scheduler, owner) = {
            let inner = this.borrow();
            if inner.pending.is_some() {
                return;
            }
            (inner.scheduler.clone(), inner.owner)
        };
        let weak: Weak<RefCell<TweenInner>> = Rc::downgrade(this);
        let id = scheduler.on_next_frame(owner, move |now| {
            if let Some(strong) = weak.upgrade() {
                TweenInner::step(&strong, now);
            }
        });
        match id {
            Some(id) => this.borrow_mut().pending = Some(id),
            None => log::warn!("tween step dropped: scheduler gone"),
        }
    }

    fn step(this: &Rc<RefCell<TweenInner>>, now: u64) {
        let (notify, value, again) = {
            let mut inner = this.borrow_mut();
            inner.pending = None;
            let started = *inner.start_nanos.get_or_insert(now);
            let elapsed = now.saturating_sub(started);
            let progress = (elapsed as f64 / inner.duration_nanos as f64).min(1.0) as f32;
            let eased = (inner.easing)(progress);
            let value = inner.start + (inner.target - inner.start) * eased;
            inner.current = value;
            if progress >= 1.0 {
                inner.current = inner.target;
                inner.start = inner.target;
                inner.start_nanos = None;
                (inner.on_change.clone(), inner.target, false)
            } else {
                (inner.on_change.clone(), value, true)
            }
        };
        if let Some(callback) = notify {
            callback(value);
        }
        if again {
            Self::schedule(this);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposal;
    use crate::scheduler::{ManualPump, Scheduler};
    use std::sync::Arc;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(ManualPump::default()))
    }

    #[test]
    fn linear_steps_reach_target() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 0.0)
            .with_duration_millis(100)
            .with_easing(linear);
        tween.animate_to(10.0);
        assert!(tween.is_running());
        scheduler.run_frame(0);
        assert_eq!(tween.value(), 0.0);
        scheduler.run_frame(50_000_000);
        assert!((tween.value() - 5.0).abs() < 1e-4);
        scheduler.run_frame(100_000_000);
        assert_eq!(tween.value(), 10.0);
        assert!(!tween.is_running());
        assert!(!scheduler.needs_frame());
    }

    #[test]
    fn retarget_restarts_from_current_value() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 0.0)
            .with_duration_millis(100)
            .with_easing(linear);
        tween.animate_to(10.0);
        scheduler.run_frame(0);
        scheduler.run_frame(50_000_000);
        tween.animate_to(0.0);
        scheduler.run_frame(60_000_000);
        scheduler.run_frame(160_000_000);
        assert_eq!(tween.value(), 0.0);
        assert!(!tween.is_running());
    }

    #[test]
    fn cancel_holds_current_value() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 0.0)
            .with_duration_millis(100)
            .with_easing(linear);
        tween.animate_to(10.0);
        scheduler.run_frame(0);
        scheduler.run_frame(30_000_000);
        let held = tween.value();
        tween.cancel();
        scheduler.run_frame(100_000_000);
        assert_eq!(tween.value(), held);
        assert_eq!(tween.target(), held);
    }

    #[test]
    fn on_change_observes_every_step() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 0.0)
            .with_duration_millis(100)
            .with_easing(linear);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        tween.on_change(move |value| seen_in.borrow_mut().push(value));
        tween.animate_to(1.0);
        scheduler.run_frame(0);
        scheduler.run_frame(100_000_000);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(*seen.borrow().last().unwrap(), 1.0);
    }

    #[test]
    fn disposed_owner_stops_stepping() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 0.0)
            .with_duration_millis(100)
            .with_easing(linear);
        tween.animate_to(10.0);
        disposal::mark_disposed(owner);
        scheduler.run_frame(0);
        scheduler.run_frame(100_000_000);
        assert_eq!(tween.value(), 0.0);
    }

    #[test]
    fn animate_to_current_value_is_a_no_op() {
        let scheduler = scheduler();
        let owner = disposal::register_owner();
        let tween = Tween::new(scheduler.handle(), owner, 3.0);
        tween.animate_to(3.0);
        assert!(!tween.is_running());
        assert!(!scheduler.needs_frame());
    }
}
