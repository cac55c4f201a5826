//! # Worker Pool
//!
//! Fixed set of OS threads executing blocking jobs in submission order.
//! With one worker, jobs never overlap. Results come back on a oneshot
//! channel so async callers can await them.

use parking_lot::Mutex;
use shared_types::ProxyError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, Span};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one). Jobs run inside `span`.
    pub fn new(name: &str, size: usize, span: Span) -> Result<Self, ProxyError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut threads = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let span = span.clone();
            let thread = std::thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(move || {
                    let _entered = span.enter();
                    loop {
                        // Only one idle worker waits on the queue at a time.
                        let job = receiver.lock().blocking_recv();
                        let Some(job) = job else { break };
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!(worker = index, "Worker job panicked");
                        }
                    }
                    debug!(worker = index, "Worker exiting");
                })
                .map_err(|e| ProxyError::Transport(format!("failed to spawn worker: {e}")))?;
            threads.push(thread);
        }

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            threads: Mutex::new(threads),
            size,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `job`. The receiver yields its result once it has run.
    pub fn submit<F, R>(&self, job: F) -> Result<oneshot::Receiver<R>, ProxyError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = reply.send(job());
        });
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(ProxyError::NotStarted(self.name.clone()));
        };
        sender
            .send(job)
            .map_err(|_| ProxyError::NotStarted(self.name.clone()))?;
        Ok(result)
    }

    /// Run `job` on a worker and await its result.
    pub async fn run<F, R>(&self, job: F) -> Result<R, ProxyError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let result = self.submit(job)?;
        result
            .await
            .map_err(|_| ProxyError::Transport(format!("{} worker dropped the job", self.name)))
    }

    /// Stop accepting jobs. Queued jobs still run; workers exit afterwards.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            debug!(pool = %self.name, "Worker pool shutting down");
        }
    }

    /// [`shutdown`](Self::shutdown) and wait for every worker to exit.
    pub fn join(&self) {
        self.shutdown();
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for thread in threads {
            if thread.join().is_err() {
                error!(pool = %self.name, "Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
