//! # Burst Sends
//!
//! A burst enqueues several copies of one outbound message. Without an
//! interval all copies land in the mailbox at once. With one, the first
//! copy is enqueued right away and the rest are handed to the bridge's
//! burst scheduler so the caller returns immediately.
//!
//! ## Scheduler
//!
//! ```text
//! send_burst ─→ push(due, seq) ─→ ┌──────────────────────┐
//! send_burst ─→ push(due, seq) ─→ │ min-heap on deadline │ ─→ mailbox.put()
//!                                  └──────────────────────┘
//!                                     one thread per bridge
//! ```
//!
//! The thread is spawned on the first spaced burst and sleeps on a condvar
//! until the earliest deadline. Copies with equal deadlines leave in
//! submission order.

use crate::mailbox::BoundedMailbox;
use crate::runtime::BusError;
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, Span};

/// Largest burst callers may request.
pub const MAX_BURST_COUNT: u32 = 1_000;

/// How many copies of a message to enqueue, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstSpec {
    count: u32,
    interval: Option<Duration>,
}

impl Default for BurstSpec {
    fn default() -> Self {
        Self::single()
    }
}

impl BurstSpec {
    /// One copy.
    #[must_use]
    pub fn single() -> Self {
        Self {
            count: 1,
            interval: None,
        }
    }

    /// `count` copies, spaced by `interval` when given. A count of zero is
    /// treated as one.
    #[must_use]
    pub fn new(count: u32, interval: Option<Duration>) -> Self {
        Self {
            count: count.max(1),
            interval: interval.filter(|i| !i.is_zero()),
        }
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Whether the whole burst can be enqueued synchronously.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.count == 1 || self.interval.is_none()
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Remaining copies of one spaced burst.
struct PendingCopies<T> {
    due: Instant,
    seq: u64,
    remaining: u32,
    interval: Duration,
    item: T,
    mailbox: Weak<BoundedMailbox<T>>,
}

impl<T> PartialEq for PendingCopies<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for PendingCopies<T> {}

impl<T> PartialOrd for PendingCopies<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PendingCopies<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct Queue<T> {
    pending: BinaryHeap<Reverse<PendingCopies<T>>>,
    next_seq: u64,
    shutdown: bool,
}

struct SchedulerInner<T> {
    queue: Mutex<Queue<T>>,
    wake: Condvar,
}

/// Delivers the spaced copies of every burst of one bridge from a single
/// thread.
pub(crate) struct BurstScheduler<T> {
    inner: Arc<SchedulerInner<T>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    threads_started: AtomicUsize,
    name: String,
    span: Span,
}

impl<T> BurstScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(name: &str, span: Span) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(Queue {
                    pending: BinaryHeap::new(),
                    next_seq: 0,
                    shutdown: false,
                }),
                wake: Condvar::new(),
            }),
            thread: Mutex::new(None),
            threads_started: AtomicUsize::new(0),
            name: name.to_string(),
            span,
        }
    }

    /// Enqueue the first copy now and the rest one interval apart.
    pub(crate) fn schedule(
        &self,
        mailbox: &Arc<BoundedMailbox<T>>,
        item: T,
        spec: BurstSpec,
    ) -> Result<(), BusError> {
        let interval = spec.interval().unwrap_or_default();
        let remaining = spec.count().saturating_sub(1);
        if remaining == 0 {
            mailbox.put(item);
            return Ok(());
        }
        self.ensure_thread()?;

        mailbox.put(item.clone());
        let mut queue = self.inner.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push(Reverse(PendingCopies {
            due: Instant::now() + interval,
            seq,
            remaining,
            interval,
            item,
            mailbox: Arc::downgrade(mailbox),
        }));
        drop(queue);
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Bursts that still have copies to deliver.
    #[must_use]
    pub(crate) fn pending(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    #[must_use]
    pub(crate) fn threads_started(&self) -> usize {
        self.threads_started.load(AtomicOrdering::Relaxed)
    }

    fn ensure_thread(&self) -> Result<(), BusError> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let span = self.span.clone();
        let handle = thread::Builder::new()
            .name(format!("burst-{}", self.name))
            .spawn(move || {
                let _entered = span.enter();
                run_scheduler(&inner);
            })
            .map_err(|e| BusError::Spawn(e.to_string()))?;
        self.threads_started.fetch_add(1, AtomicOrdering::Relaxed);
        *slot = Some(handle);
        Ok(())
    }
}

impl<T> Drop for BurstScheduler<T> {
    fn drop(&mut self) {
        self.inner.queue.lock().shutdown = true;
        self.inner.wake.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_scheduler<T: Clone>(inner: &SchedulerInner<T>) {
    trace!("Burst scheduler started");
    loop {
        let mut queue = inner.queue.lock();
        let mut next = loop {
            if queue.shutdown {
                debug!(abandoned = queue.pending.len(), "Burst scheduler exited");
                return;
            }
            let due = match queue.pending.peek() {
                Some(Reverse(next)) => next.due,
                None => {
                    inner.wake.wait(&mut queue);
                    continue;
                }
            };
            if due <= Instant::now() {
                if let Some(Reverse(next)) = queue.pending.pop() {
                    break next;
                }
                continue;
            }
            inner.wake.wait_until(&mut queue, due);
        };
        drop(queue);

        let Some(target) = next.mailbox.upgrade() else {
            debug!(unsent = next.remaining, "Burst abandoned, mailbox dropped");
            continue;
        };
        target.put(next.item.clone());
        next.remaining -= 1;
        if next.remaining > 0 {
            next.due += next.interval;
            inner.queue.lock().pending.push(Reverse(next));
        }
    }
}
