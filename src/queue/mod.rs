//! Rate-limited task dispatch
//!
//! The queue primitive behind every checking layer: items carry an
//! optional host key and are dispatched respecting a global concurrency
//! cap, a per-host cap and a minimum spacing between dispatches. Queued
//! (not yet started) items can be removed; pause/resume only gate new
//! dispatches — in-flight work always runs to completion. A drain
//! callback fires whenever the last active item finishes with nothing
//! left queued.
//!
//! Dispatch happens on the Tokio runtime; `enqueue`, `resume` and the
//! completion path must run inside one.

use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Identifier handed out by [`TaskQueue::enqueue`]
pub type QueueId = u64;

/// A unit of queued work
pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

/// Concurrency policy for one queue
#[derive(Debug, Clone)]
pub struct QueueLimits {
    /// Global cap on concurrently running items
    pub max_concurrent: usize,

    /// Cap on concurrently running items sharing a host key
    pub max_per_host: usize,

    /// Minimum delay between two dispatches; zero disables spacing
    pub rate_limit: Duration,
}

struct QueuedTask {
    id: QueueId,
    host: Option<String>,
    job: Job,
}

struct QueueState {
    queued: VecDeque<QueuedTask>,
    active: usize,
    active_per_host: HashMap<String, usize>,
    paused: bool,
    last_dispatch: Option<Instant>,
    wake_scheduled: bool,
    next_id: QueueId,
}

struct QueueInner {
    limits: QueueLimits,
    state: Mutex<QueueState>,
    on_drain: Box<dyn Fn() + Send + Sync>,
}

/// A pausable, rate-limited dispatch queue
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Creates a queue; `on_drain` fires each time it runs dry
    pub fn new(limits: QueueLimits, on_drain: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                limits,
                state: Mutex::new(QueueState {
                    queued: VecDeque::new(),
                    active: 0,
                    active_per_host: HashMap::new(),
                    paused: false,
                    last_dispatch: None,
                    wake_scheduled: false,
                    next_id: 0,
                }),
                on_drain: Box::new(on_drain),
            }),
        }
    }

    /// Adds an item and attempts dispatch; returns its queue id
    pub fn enqueue(&self, host: Option<String>, job: Job) -> QueueId {
        let id = {
            let mut state = self.inner.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.queued.push_back(QueuedTask { id, host, job });
            id
        };
        Self::dispatch(&self.inner);
        id
    }

    /// Removes a not-yet-started item; false if unknown or already running
    pub fn dequeue(&self, id: QueueId) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match state.queued.iter().position(|task| task.id == id) {
            Some(position) => {
                state.queued.remove(position);
                true
            }
            None => false,
        }
    }

    /// Suspends dispatch of queued items; running items are unaffected
    pub fn pause(&self) {
        self.inner.state.lock().unwrap().paused = true;
    }

    /// Resumes dispatch
    pub fn resume(&self) {
        self.inner.state.lock().unwrap().paused = false;
        Self::dispatch(&self.inner);
    }

    /// Number of currently running items
    pub fn num_active(&self) -> usize {
        self.inner.state.lock().unwrap().active
    }

    /// Number of items waiting to start
    pub fn num_queued(&self) -> usize {
        self.inner.state.lock().unwrap().queued.len()
    }

    /// Whether nothing is running or waiting, read under one lock
    ///
    /// Two separate length reads could straddle a dispatch (queued
    /// becoming active between them) and report an idle queue that isn't.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.active == 0 && state.queued.is_empty()
    }

    /// Dispatches as many queued items as the policy allows
    fn dispatch(inner: &Arc<QueueInner>) {
        loop {
            let task = {
                let mut state = inner.state.lock().unwrap();

                if state.paused
                    || state.queued.is_empty()
                    || state.active >= inner.limits.max_concurrent
                {
                    return;
                }

                if !inner.limits.rate_limit.is_zero() {
                    if let Some(last) = state.last_dispatch {
                        let elapsed = last.elapsed();
                        if elapsed < inner.limits.rate_limit {
                            Self::schedule_wake(inner, &mut state, inner.limits.rate_limit - elapsed);
                            return;
                        }
                    }
                }

                let position = state.queued.iter().position(|task| match &task.host {
                    Some(host) => {
                        state.active_per_host.get(host).copied().unwrap_or(0)
                            < inner.limits.max_per_host
                    }
                    None => true,
                });
                let Some(position) = position else {
                    // Everything queued is blocked on its host; a finishing
                    // task will re-dispatch
                    return;
                };

                let task = state.queued.remove(position).unwrap();
                state.active += 1;
                if let Some(host) = &task.host {
                    *state.active_per_host.entry(host.clone()).or_insert(0) += 1;
                }
                state.last_dispatch = Some(Instant::now());
                task
            };

            tracing::trace!(id = task.id, host = ?task.host, "dispatching queued task");

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                (task.job)().await;
                Self::finish(&inner, task.host);
            });
        }
    }

    /// Wakes the queue once the rate-limit window has passed
    fn schedule_wake(inner: &Arc<QueueInner>, state: &mut QueueState, wait: Duration) {
        if state.wake_scheduled {
            return;
        }
        state.wake_scheduled = true;

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            inner.state.lock().unwrap().wake_scheduled = false;
            Self::dispatch(&inner);
        });
    }

    /// Books a finished item out and either re-dispatches or signals drain
    fn finish(inner: &Arc<QueueInner>, host: Option<String>) {
        let drained = {
            let mut state = inner.state.lock().unwrap();
            state.active -= 1;
            if let Some(host) = host {
                if let Some(count) = state.active_per_host.get_mut(&host) {
                    *count -= 1;
                    if *count == 0 {
                        state.active_per_host.remove(&host);
                    }
                }
            }
            state.active == 0 && state.queued.is_empty()
        };

        if drained {
            (inner.on_drain)();
        } else {
            Self::dispatch(inner);
        }
    }
}
