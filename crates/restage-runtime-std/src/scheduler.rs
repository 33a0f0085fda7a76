//! Serialized snapshot transitions with background diffing.
//!
//! An [`UpdateScheduler`] owns one apply pipeline per consumer: at most
//! one transition reconciles at a time, transitions apply in issuance
//! order, and a transition that is superseded before it commits is
//! discarded whole, so the recorded current snapshot only ever reflects
//! fully-applied states. Diffing is pure, so large inputs move to a
//! background worker thread; small ones reconcile inline on the calling
//! thread to skip the context switch, deferring to the worker whenever
//! the pipeline is already draining (including `schedule` calls made
//! from inside an apply task). The final apply step always runs on the
//! injected [`ApplyContext`].

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use restage_core::platform::ApplyContext;
use restage_core::{reconcile, Snapshot, StagedChangeset};

use crate::transition::{Transition, TransitionOutcome, TransitionState};

/// Combined item count (old plus new) at which diffing moves to the
/// background worker.
pub const DEFAULT_BACKGROUND_THRESHOLD: usize = 500;

type ApplyFn = Box<dyn FnOnce(StagedChangeset, bool) + Send>;

struct Pending<S, I> {
    generation: u64,
    target: Snapshot<S, I>,
    animate: bool,
    on_apply: ApplyFn,
    state: Arc<TransitionState>,
}

enum WorkerMessage {
    Kick,
    Shutdown,
}

struct Inner<S, I> {
    queue: Mutex<VecDeque<Pending<S, I>>>,
    /// Generation token of the most recently issued transition. A
    /// queued transition whose token is older than this is stale and
    /// gets discarded instead of committed.
    latest: AtomicU64,
    /// Serializes drains; whoever holds it owns the apply pipeline.
    pipeline: Mutex<()>,
    current: Mutex<Snapshot<S, I>>,
    apply: Arc<dyn ApplyContext>,
    threshold: usize,
}

impl<S, I> Inner<S, I>
where
    S: Hash + Eq + Clone + Send + 'static,
    I: Hash + Eq + Clone + Send + 'static,
{
    fn drain(&self) {
        let pipeline = self.pipeline.lock().unwrap();
        self.drain_locked(pipeline);
    }

    /// Drains only when the pipeline is free right now. Returns `false`
    /// when another drain holds it, including the re-entrant case of
    /// `schedule` called from inside an apply task; the caller must
    /// then hand the queued transition to the worker instead of
    /// blocking on (or relocking) the pipeline mutex.
    fn try_drain(&self) -> bool {
        match self.pipeline.try_lock() {
            Ok(pipeline) => {
                self.drain_locked(pipeline);
                true
            }
            Err(_) => false,
        }
    }

    fn drain_locked(&self, _pipeline: MutexGuard<'_, ()>) {
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            let Some(pending) = next else {
                break;
            };
            if self.latest.load(Ordering::SeqCst) > pending.generation {
                log::debug!(
                    "transition {} superseded before reconciling",
                    pending.generation
                );
                pending.state.complete(TransitionOutcome::Superseded);
                continue;
            }
            let previous = self.current.lock().unwrap().clone();
            let changeset = reconcile(&previous, &pending.target);
            // The token can have moved on while we were diffing; a
            // stale result must be discarded, never partially applied.
            if self.latest.load(Ordering::SeqCst) > pending.generation {
                log::debug!(
                    "transition {} superseded while diffing; discarding the result",
                    pending.generation
                );
                pending.state.complete(TransitionOutcome::Superseded);
                continue;
            }
            *self.current.lock().unwrap() = pending.target;
            let state = pending.state;
            let on_apply = pending.on_apply;
            let animate = pending.animate;
            self.apply.post(Box::new(move || {
                on_apply(changeset, animate);
                state.complete(TransitionOutcome::Applied);
            }));
        }
    }
}

/// Serializes "transition to this snapshot" requests for one consumer.
pub struct UpdateScheduler<S, I> {
    inner: Arc<Inner<S, I>>,
    worker_tx: mpsc::Sender<WorkerMessage>,
    worker: Option<JoinHandle<()>>,
}

impl<S, I> UpdateScheduler<S, I>
where
    S: Hash + Eq + Clone + Send + 'static,
    I: Hash + Eq + Clone + Send + 'static,
{
    /// Creates a scheduler with [`DEFAULT_BACKGROUND_THRESHOLD`].
    pub fn new(apply: Arc<dyn ApplyContext>) -> Self {
        Self::with_threshold(apply, DEFAULT_BACKGROUND_THRESHOLD)
    }

    /// Creates a scheduler with a custom background-diffing threshold.
    /// A threshold of zero routes every transition to the worker.
    pub fn with_threshold(apply: Arc<dyn ApplyContext>, threshold: usize) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            latest: AtomicU64::new(0),
            pipeline: Mutex::new(()),
            current: Mutex::new(Snapshot::new()),
            apply,
            threshold,
        });
        let (worker_tx, worker_rx) = mpsc::channel();
        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("restage-update-worker".into())
            .spawn(move || {
                while let Ok(message) = worker_rx.recv() {
                    match message {
                        WorkerMessage::Kick => worker_inner.drain(),
                        WorkerMessage::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn the update worker thread");
        Self {
            inner,
            worker_tx,
            worker: Some(worker),
        }
    }

    /// Requests a transition from the current snapshot to `target`.
    ///
    /// `on_apply` receives the staged changeset and the animate flag on
    /// the apply context once the transition commits. When a newer
    /// request supersedes this one before it commits, `on_apply` never
    /// runs and the returned [`Transition`] resolves to
    /// [`TransitionOutcome::Superseded`].
    pub fn schedule(
        &self,
        target: Snapshot<S, I>,
        animate: bool,
        on_apply: impl FnOnce(StagedChangeset, bool) + Send + 'static,
    ) -> Transition {
        let state = TransitionState::new();
        let combined = self.inner.current.lock().unwrap().num_items() + target.num_items();
        {
            // Generation order matches queue order because both are
            // assigned under the queue lock.
            let mut queue = self.inner.queue.lock().unwrap();
            let generation = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
            queue.push_back(Pending {
                generation,
                target,
                animate,
                on_apply: Box::new(on_apply),
                state: Arc::clone(&state),
            });
        }
        if combined < self.inner.threshold {
            log::trace!("reconciling transition inline ({combined} items)");
            if !self.inner.try_drain() {
                // A drain already in flight may stop before it sees the
                // transition we just queued; the worker kick covers
                // that window.
                let _ = self.worker_tx.send(WorkerMessage::Kick);
            }
        } else {
            log::trace!("routing transition to the background worker ({combined} items)");
            let _ = self.worker_tx.send(WorkerMessage::Kick);
        }
        Transition { state }
    }

    /// The most recently committed snapshot.
    pub fn current_snapshot(&self) -> Snapshot<S, I> {
        self.inner.current.lock().unwrap().clone()
    }
}

impl<S, I> Drop for UpdateScheduler<S, I> {
    fn drop(&mut self) {
        let _ = self.worker_tx.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restage_core::InlineApplyContext;

    fn snapshot(items: &[u32]) -> Snapshot<&'static str, u32> {
        let mut snapshot = Snapshot::new();
        snapshot.append_sections(vec!["main"]);
        snapshot.append_items(items.to_vec(), &"main");
        snapshot
    }

    fn items_of(snapshot: &Snapshot<&'static str, u32>) -> Vec<u32> {
        snapshot.item_identifiers().copied().collect()
    }

    #[test]
    fn starts_from_an_empty_snapshot() {
        let scheduler: UpdateScheduler<&str, u32> =
            UpdateScheduler::new(Arc::new(InlineApplyContext));
        assert_eq!(scheduler.current_snapshot().num_items(), 0);
    }

    #[test]
    fn small_transitions_apply_inline_and_in_order() {
        let scheduler = UpdateScheduler::new(Arc::new(InlineApplyContext));
        let log: Arc<Mutex<Vec<StagedChangeset>>> = Arc::default();

        let sink = Arc::clone(&log);
        let first = scheduler.schedule(snapshot(&[1, 2]), false, move |changeset, _| {
            sink.lock().unwrap().push(changeset);
        });
        let sink = Arc::clone(&log);
        let second = scheduler.schedule(snapshot(&[1, 2, 3]), true, move |changeset, animate| {
            assert!(animate);
            sink.lock().unwrap().push(changeset);
        });

        assert_eq!(first.wait(), TransitionOutcome::Applied);
        assert_eq!(second.wait(), TransitionOutcome::Applied);
        assert_eq!(items_of(&scheduler.current_snapshot()), vec![1, 2, 3]);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        // The first transition introduces the section and its items
        // ride in with it; the second adds one item to the surviving
        // section.
        assert_eq!(log[0].section_inserted, vec![0]);
        assert!(log[0].item_inserted.is_empty());
        assert!(log[1].section_inserted.is_empty());
        assert_eq!(log[1].item_inserted.len(), 1);
    }

    #[test]
    fn superseded_transition_is_discarded_whole() {
        // Threshold zero pushes everything through the worker; the
        // first transition's apply callback then gates the pipeline so
        // the later schedules are deterministic.
        let scheduler = UpdateScheduler::with_threshold(Arc::new(InlineApplyContext), 0);
        let applied: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let sink = Arc::clone(&applied);
        let first = scheduler.schedule(snapshot(&[1]), false, move |_, _| {
            sink.lock().unwrap().push("first");
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv().unwrap();

        // The worker is parked inside the first apply; both of these
        // land in the queue before it resumes.
        let sink = Arc::clone(&applied);
        let second = scheduler.schedule(snapshot(&[1, 2]), false, move |_, _| {
            sink.lock().unwrap().push("second");
        });
        let sink = Arc::clone(&applied);
        let third = scheduler.schedule(snapshot(&[9]), false, move |_, _| {
            sink.lock().unwrap().push("third");
        });
        release_tx.send(()).unwrap();

        assert_eq!(first.wait(), TransitionOutcome::Applied);
        assert_eq!(second.wait(), TransitionOutcome::Superseded);
        assert_eq!(third.wait(), TransitionOutcome::Applied);
        // The superseded target never became current; the final state
        // is the newest request's.
        assert_eq!(items_of(&scheduler.current_snapshot()), vec![9]);
        assert_eq!(*applied.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn schedule_from_inside_apply_does_not_deadlock() {
        // An apply callback is allowed to request the next transition;
        // the inline path must hand it off instead of relocking the
        // pipeline it is already running under.
        let scheduler = Arc::new(UpdateScheduler::new(Arc::new(InlineApplyContext)));
        let applied: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let chained: Arc<Mutex<Option<Transition>>> = Arc::default();

        let sink = Arc::clone(&applied);
        let chain = Arc::clone(&scheduler);
        let slot = Arc::clone(&chained);
        let outer = scheduler.schedule(snapshot(&[1]), false, move |_, _| {
            sink.lock().unwrap().push("outer");
            let inner_sink = Arc::clone(&sink);
            let inner = chain.schedule(snapshot(&[1, 2]), false, move |_, _| {
                inner_sink.lock().unwrap().push("inner");
            });
            *slot.lock().unwrap() = Some(inner);
        });

        assert_eq!(outer.wait(), TransitionOutcome::Applied);
        let inner = chained.lock().unwrap().take().expect("inner transition scheduled");
        assert_eq!(inner.wait(), TransitionOutcome::Applied);
        assert_eq!(items_of(&scheduler.current_snapshot()), vec![1, 2]);
        assert_eq!(*applied.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn inline_schedule_defers_while_the_pipeline_is_busy() {
        let scheduler = Arc::new(UpdateScheduler::new(Arc::new(InlineApplyContext)));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let background = Arc::clone(&scheduler);
        let first = std::thread::spawn(move || {
            background
                .schedule(snapshot(&[1]), false, move |_, _| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .wait()
        });
        started_rx.recv().unwrap();

        // The spawned thread's inline drain is parked inside its apply;
        // scheduling here must return instead of blocking behind it.
        let second = scheduler.schedule(snapshot(&[1, 2]), false, |_, _| {});
        release_tx.send(()).unwrap();

        assert_eq!(first.join().unwrap(), TransitionOutcome::Applied);
        assert_eq!(second.wait(), TransitionOutcome::Applied);
        assert_eq!(items_of(&scheduler.current_snapshot()), vec![1, 2]);
    }

    #[test]
    fn large_transitions_go_through_the_worker() {
        let scheduler = UpdateScheduler::with_threshold(Arc::new(InlineApplyContext), 4);
        let seen: Arc<Mutex<Option<StagedChangeset>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let big: Vec<u32> = (0..32).collect();
        let transition = scheduler.schedule(snapshot(&big), false, move |changeset, _| {
            *sink.lock().unwrap() = Some(changeset);
        });
        assert_eq!(transition.wait(), TransitionOutcome::Applied);
        assert_eq!(scheduler.current_snapshot().num_items(), 32);
        // Asserted on this thread; a worker-side panic would stall the
        // test instead of failing it.
        let changeset = seen.lock().unwrap().take().expect("apply ran");
        assert_eq!(changeset.section_inserted, vec![0]);
        assert!(changeset.item_inserted.is_empty());
    }
}
