//! Cross-thread task posting
//!
//! The gateway splits work between one I/O thread and one game thread. All
//! crossings from the I/O side into game logic go through a [`Dispatcher`]:
//! closures are queued from any thread and executed in order by the
//! [`DispatcherLoop`] on the thread that owns the context value.

use std::sync::mpsc;

use parking_lot::Mutex;

type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Cloneable, shareable handle used to post tasks onto the owning thread.
/// The sender sits behind a mutex only to make the handle `Sync`; the lock
/// covers a single channel send.
pub struct Dispatcher<C> {
    tx: Mutex<mpsc::Sender<Task<C>>>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            tx: Mutex::new(self.tx.lock().clone()),
        }
    }
}

impl<C: 'static> Dispatcher<C> {
    /// Queue a task. Silently dropped when the loop has already stopped,
    /// which only happens during shutdown.
    pub fn post(&self, task: impl FnOnce(&mut C) + Send + 'static) {
        let _ = self.tx.lock().send(Box::new(task));
    }
}

/// Consumes queued tasks on the owning thread until every handle is gone.
pub struct DispatcherLoop<C> {
    rx: mpsc::Receiver<Task<C>>,
}

impl<C: 'static> DispatcherLoop<C> {
    pub fn new() -> (Dispatcher<C>, Self) {
        let (tx, rx) = mpsc::channel();
        (Dispatcher { tx: Mutex::new(tx) }, Self { rx })
    }

    /// Run tasks until every [`Dispatcher`] handle has been dropped.
    pub fn run(self, ctx: &mut C) {
        while let Ok(task) = self.rx.recv() {
            task(ctx);
        }
    }

    /// Drain tasks that are already queued, without blocking. Used by tests
    /// and by shutdown paths that must flush pending work.
    pub fn drain(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(ctx);
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_run_in_post_order() {
        let (tx, looper) = DispatcherLoop::<Vec<u32>>::new();
        tx.post(|v| v.push(1));
        tx.post(|v| v.push(2));
        tx.post(|v| v.push(3));

        let mut seen = Vec::new();
        assert_eq!(looper.drain(&mut seen), 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_posting_from_other_threads() {
        let (tx, looper) = DispatcherLoop::<u32>::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tx = tx.clone();
                std::thread::spawn(move || tx.post(|count| *count += 1))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(tx);

        let mut count = 0;
        looper.run(&mut count);
        assert_eq!(count, 4);
    }
}
