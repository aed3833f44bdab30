//! Cooperative coroutines driven from `async` bodies.
//!
//! A [`Coroutine`] owns one `async` body and polls it with a no-op waker.
//! The body suspends by awaiting [`Co::suspend`], which parks the suspended
//! item in a slot shared with the driver and returns `Pending`. The driver
//! takes the item out; the next resume places its input in the slot and
//! polls again, so the pending `suspend` completes with that input.
//!
//! Nothing here ever blocks or spawns: a body that awaits anything other
//! than its own [`Co`] handle stalls, which the driver reports as
//! [`Resumed::Stalled`].

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures_util::task::noop_waker_ref;

use crate::failure::Failure;
use crate::value::Value;

/// What a suspended body receives when it is resumed.
pub type Resumption = Result<Value, Failure>;

enum Slot<Y> {
    Empty,
    Suspended(Y),
    Resumed(Resumption),
}

/// Handle a coroutine body uses to suspend itself.
pub struct Co<Y> {
    slot: Rc<RefCell<Slot<Y>>>,
}

impl<Y> Clone for Co<Y> {
    fn clone(&self) -> Self {
        Co {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<Y> Co<Y> {
    /// Suspend with `item`; completes with the input of the next resume.
    pub fn suspend(&self, item: Y) -> Suspend<Y> {
        Suspend {
            slot: Rc::clone(&self.slot),
            item: Some(item),
        }
    }
}

#[must_use = "a coroutine only suspends when the returned future is awaited"]
pub struct Suspend<Y> {
    slot: Rc<RefCell<Slot<Y>>>,
    item: Option<Y>,
}

// No field is ever pinned.
impl<Y> Unpin for Suspend<Y> {}

impl<Y> Future for Suspend<Y> {
    type Output = Resumption;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Resumption> {
        let this = &mut *self;
        if let Some(item) = this.item.take() {
            *this.slot.borrow_mut() = Slot::Suspended(item);
            return Poll::Pending;
        }
        let mut slot = this.slot.borrow_mut();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Resumed(input) => Poll::Ready(input),
            other => {
                *slot = other;
                Poll::Pending
            }
        }
    }
}

/// Outcome of one [`Coroutine::resume`].
pub(crate) enum Resumed<Y, R> {
    Suspended(Y),
    Completed(R),
    /// The body awaited something other than its coroutine handle.
    Stalled,
    /// The body already completed or was closed.
    Finished,
}

pub(crate) struct Coroutine<Y, R> {
    slot: Rc<RefCell<Slot<Y>>>,
    body: Option<Pin<Box<dyn Future<Output = R>>>>,
    started: bool,
}

impl<Y: 'static, R: 'static> Coroutine<Y, R> {
    pub(crate) fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Co<Y>) -> Fut,
        Fut: Future<Output = R> + 'static,
    {
        let slot = Rc::new(RefCell::new(Slot::Empty));
        let body = body(Co {
            slot: Rc::clone(&slot),
        });
        Coroutine {
            slot,
            body: Some(Box::pin(body)),
            started: false,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.body.is_none()
    }

    /// Run the body up to its next suspension.
    ///
    /// The first resume runs the body from its beginning and ignores
    /// `input`; later resumes deliver `input` to the pending suspension.
    pub(crate) fn resume(&mut self, input: Option<Resumption>) -> Resumed<Y, R> {
        let Some(body) = self.body.as_mut() else {
            return Resumed::Finished;
        };
        if self.started {
            if let Some(input) = input {
                *self.slot.borrow_mut() = Slot::Resumed(input);
            }
        }
        self.started = true;

        let mut cx = Context::from_waker(noop_waker_ref());
        match body.as_mut().poll(&mut cx) {
            Poll::Ready(output) => {
                self.finish();
                Resumed::Completed(output)
            }
            Poll::Pending => {
                let parked = std::mem::replace(&mut *self.slot.borrow_mut(), Slot::Empty);
                match parked {
                    Slot::Suspended(item) => Resumed::Suspended(item),
                    Slot::Empty | Slot::Resumed(_) => {
                        self.finish();
                        Resumed::Stalled
                    }
                }
            }
        }
    }

    /// Drop the suspended body, running its destructors. Idempotent.
    pub(crate) fn close(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.body = None;
        *self.slot.borrow_mut() = Slot::Empty;
    }
}
