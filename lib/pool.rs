use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, instrument};

pub const MIN_SIZE: usize = 1;
pub const MAX_SIZE: usize = 256;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Clamps a configured pool size into `[1, 256]`, coercing a configured
/// zero up to 1.
#[must_use]
pub fn clamp_size(size: usize) -> usize {
    if size == 0 {
        MIN_SIZE
    } else {
        size.clamp(MIN_SIZE, MAX_SIZE)
    }
}

/// A fixed-size set of worker tasks consuming a FIFO queue. Mirrors a
/// mutex+condvar thread pool's external contract (enqueue-after-stop
/// fails, stop is idempotent and drains in-flight work) using a
/// `tokio::sync::mpsc` channel as the async analogue of the condvar-guarded
/// queue.
pub struct Pool {
    sender: mpsc::UnboundedSender<Task>,
    running: Arc<AtomicBool>,
    stop_initiated: Arc<AtomicBool>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl Pool {
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = clamp_size(size);
        let (sender, receiver) = mpsc::unbounded_channel::<Task>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let running = Arc::new(AtomicBool::new(true));
        let stop_initiated = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            workers.push(tokio::spawn(worker_loop(id, receiver)));
        }

        Pool {
            sender,
            running,
            stop_initiated,
            workers,
        }
    }

    /// Enqueues a task. Returns `false` without scheduling it if stop has
    /// already been requested.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.stop_initiated.load(Ordering::SeqCst) {
            return false;
        }
        self.sender.send(Box::pin(task)).is_ok()
    }

    /// Idempotent: the first caller drains and joins every worker; later
    /// callers observe the already-initiated stop and return immediately.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) {
        if self
            .stop_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        drop(std::mem::replace(&mut self.sender, mpsc::unbounded_channel().0));

        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                error!(%err, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>>) {
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        match task {
            Some(task) => task.await,
            None => {
                tracing::trace!(worker = id, "pool channel closed, worker exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn clamp_size_enforces_bounds() {
        assert_eq!(clamp_size(0), 1);
        assert_eq!(clamp_size(1000), MAX_SIZE);
        assert_eq!(clamp_size(4), 4);
    }

    #[tokio::test]
    async fn runs_enqueued_tasks() {
        let pool = Pool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(pool.enqueue(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn enqueue_after_stop_fails() {
        let mut pool = Pool::new(1);
        pool.stop().await;
        assert!(!pool.enqueue(async {}));
    }
}
