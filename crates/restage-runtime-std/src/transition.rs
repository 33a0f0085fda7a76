//! Completion handle for a scheduled transition.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// How a scheduled transition resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The changeset was handed to the apply context.
    Applied,
    /// A newer transition arrived first; this one was discarded and
    /// never touched the consumer's current snapshot.
    Superseded,
}

pub(crate) struct TransitionState {
    outcome: Mutex<Option<TransitionOutcome>>,
    waker: Mutex<Option<Waker>>,
}

impl TransitionState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            waker: Mutex::new(None),
        })
    }

    pub(crate) fn complete(&self, outcome: TransitionOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
        if let Some(waker) = self.waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

/// Handle returned by [`UpdateScheduler::schedule`].
///
/// Awaiting it resolves once the transition has been applied or
/// superseded; [`Transition::wait`] is the blocking equivalent for
/// hosts without an executor.
///
/// [`UpdateScheduler::schedule`]: crate::scheduler::UpdateScheduler::schedule
pub struct Transition {
    pub(crate) state: Arc<TransitionState>,
}

impl Future for Transition {
    type Output = TransitionOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = *self.state.outcome.lock().unwrap() {
            return Poll::Ready(outcome);
        }
        *self.state.waker.lock().unwrap() = Some(cx.waker().clone());
        // Re-check after publishing the waker so a completion racing
        // with this poll cannot be missed.
        if let Some(outcome) = *self.state.outcome.lock().unwrap() {
            Poll::Ready(outcome)
        } else {
            Poll::Pending
        }
    }
}

struct ThreadWaker {
    thread: std::thread::Thread,
}

impl futures_task::ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.thread.unpark();
    }
}

impl Transition {
    /// Blocks the calling thread until the transition resolves.
    pub fn wait(mut self) -> TransitionOutcome {
        let waker = futures_task::waker(Arc::new(ThreadWaker {
            thread: std::thread::current(),
        }));
        let mut cx = Context::from_waker(&waker);
        loop {
            match Pin::new(&mut self).poll(&mut cx) {
                Poll::Ready(outcome) => return outcome,
                Poll::Pending => std::thread::park(),
            }
        }
    }
}
