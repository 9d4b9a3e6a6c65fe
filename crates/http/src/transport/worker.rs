use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::runtime;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::Transport;

type Job = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send>;

/// A fixed set of worker threads, each running a single-threaded runtime.
///
/// Work is handed to a worker as a closure that builds the task on the worker itself, so the
/// task never has to be `Send` and stays on that thread until it completes. Cloning the group
/// is cheap; all clones share the same threads.
#[derive(Clone)]
pub struct WorkerGroup {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Transport,
    workers: Vec<mpsc::UnboundedSender<Job>>,
    next: AtomicUsize,
    shutdown: CancellationToken,
    terminated: watch::Receiver<bool>,
}

/// Counts a worker thread as alive until dropped; the last one to go reports termination.
struct AliveGuard {
    alive: Arc<AtomicUsize>,
    terminated: Arc<watch::Sender<bool>>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        if self.alive.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.terminated.send_replace(true);
        }
    }
}

impl WorkerGroup {
    pub(super) fn new(transport: Transport, threads: usize) -> io::Result<Self> {
        let threads = if threads == 0 { thread::available_parallelism().map_or(1, NonZeroUsize::get) } else { threads };

        let shutdown = CancellationToken::new();
        let alive = Arc::new(AtomicUsize::new(threads));
        let (terminated_tx, terminated) = watch::channel(false);
        let terminated_tx = Arc::new(terminated_tx);

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let (sender, receiver) = mpsc::unbounded_channel();
            let guard = AliveGuard { alive: Arc::clone(&alive), terminated: Arc::clone(&terminated_tx) };
            let token = shutdown.clone();

            let spawned = thread::Builder::new()
                .name(format!("{transport}-worker-{id}"))
                .spawn(move || run_worker(id, receiver, token, guard));

            if let Err(e) = spawned {
                error!(cause = %e, worker = id, "failed to spawn worker thread");
                shutdown.cancel();
                // the failed spawn dropped its own guard, later ids never had one
                alive.fetch_sub(threads - id - 1, Ordering::AcqRel);
                if alive.load(Ordering::Acquire) == 0 {
                    terminated_tx.send_replace(true);
                }
                return Err(e);
            }
            workers.push(sender);
        }

        debug!(%transport, threads, "worker group started");
        Ok(Self { inner: Arc::new(Inner { transport, workers, next: AtomicUsize::new(0), shutdown, terminated }) })
    }

    pub fn size(&self) -> usize {
        self.inner.workers.len()
    }

    pub fn transport(&self) -> Transport {
        self.inner.transport
    }

    /// Runs the task built by `make` on the next worker in round-robin order.
    pub fn spawn<F, Fut>(&self, make: F) -> io::Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.size();
        self.spawn_on(index, make)
    }

    /// Runs the task built by `make` on worker `index`.
    ///
    /// Fails once the group is shut down or when `index` is out of range.
    pub fn spawn_on<F, Fut>(&self, index: usize, make: F) -> io::Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let worker = self
            .inner
            .workers
            .get(index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no worker with index {index}")))?;

        if self.inner.shutdown.is_cancelled() {
            return Err(io::Error::other("worker group is shut down"));
        }

        worker
            .send(Box::new(move || make().boxed_local()))
            .map_err(|_closed| io::Error::other("worker has terminated"))
    }

    /// Stops the workers from taking new tasks. Each thread exits once its running tasks end.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fires when the group is shut down; tasks watch it to wind down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Resolves once every worker thread has exited.
    pub async fn closed(&self) {
        let mut terminated = self.inner.terminated.clone();
        // the sender lives in the guards, an error means all of them are gone
        let _ = terminated.wait_for(|terminated| *terminated).await;
    }
}

impl fmt::Debug for WorkerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("transport", &self.inner.transport)
            .field("size", &self.size())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

fn run_worker(id: usize, mut jobs: mpsc::UnboundedReceiver<Job>, shutdown: CancellationToken, guard: AliveGuard) {
    let _guard = guard;

    let rt = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(cause = %e, worker = id, "failed to build worker runtime");
            shutdown.cancel();
            return;
        }
    };

    let local = LocalSet::new();
    local.spawn_local(async move {
        loop {
            let job = select! {
                biased;
                () = shutdown.cancelled() => break,
                job = jobs.recv() => job,
            };
            match job {
                Some(job) => {
                    tokio::task::spawn_local(job());
                }
                None => break,
            }
        }
        trace!(worker = id, "worker stops taking tasks");
    });

    // completes once the dispatch loop and every task it spawned have finished
    rt.block_on(local);
    debug!(worker = id, "worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_tasks_on_named_threads() {
        let group = WorkerGroup::new(Transport::Portable, 2).unwrap();
        assert_eq!(group.size(), 2);

        let (tx, rx) = tokio::sync::oneshot::channel();
        group
            .spawn_on(1, move || async move {
                let name = thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            })
            .unwrap();

        assert_eq!(rx.await.unwrap().as_deref(), Some("portable-worker-1"));
        group.shutdown();
        group.closed().await;
    }

    #[tokio::test]
    async fn round_robin_covers_every_worker() {
        let group = WorkerGroup::new(Transport::Portable, 3).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for _ in 0..3 {
            let tx = tx.clone();
            group
                .spawn(move || async move {
                    tx.send(thread::current().id()).unwrap();
                })
                .unwrap();
        }
        drop(tx);

        let mut ids = HashSet::new();
        while let Some(id) = rx.recv().await {
            ids.insert(id);
        }
        assert_eq!(ids.len(), 3);

        group.shutdown();
        group.closed().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_tasks() {
        let group = WorkerGroup::new(Transport::Portable, 1).unwrap();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        group
            .spawn(move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::Release);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        group.shutdown();
        group.closed().await;

        assert!(finished.load(Ordering::Acquire));
        assert!(group.spawn(|| async {}).is_err());
    }

    #[test]
    fn zero_threads_means_available_parallelism() {
        let group = WorkerGroup::new(Transport::Portable, 0).unwrap();
        assert_eq!(group.size(), thread::available_parallelism().map_or(1, NonZeroUsize::get));
        group.shutdown();
    }
}
