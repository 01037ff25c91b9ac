//! Single delivery thread for everything the caller receives
//!
//! Replies and events are produced on caller threads and engine threads. The
//! caller only accepts them on one thread and in a well defined order, so all
//! of them go through one FIFO queue drained by a [`DeliveryLoop`].
//!
//! ```text
//! dispatcher ──┐
//! engine #1 ───┼──> Marshaller::schedule ──> [ queue ] ──> DeliveryLoop (one thread)
//! engine #2 ───┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Unit of work executed on the delivery thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The delivery side is gone; the task was not queued
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("delivery loop has shut down")]
pub struct MarshallerClosed;

/// Producer handle; clone freely across threads
#[derive(Clone, Debug)]
pub struct Marshaller {
    tx: mpsc::Sender<Task>,
}

/// Consumer side; owns the queue and runs tasks one at a time
#[derive(Debug)]
pub struct DeliveryLoop {
    rx: mpsc::Receiver<Task>,
}

/// Create a connected producer/consumer pair
pub fn channel() -> (Marshaller, DeliveryLoop) {
    let (tx, rx) = mpsc::channel();
    (Marshaller { tx }, DeliveryLoop { rx })
}

impl Marshaller {
    /// Queue `task` for the delivery thread and return immediately
    pub fn schedule<F>(&self, task: F) -> Result<(), MarshallerClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| MarshallerClosed)
    }
}

impl DeliveryLoop {
    /// Run tasks until every [`Marshaller`] has been dropped
    ///
    /// Blocks the calling thread, which becomes the delivery thread.
    pub fn run(self) {
        let mut delivered = 0u64;
        while let Ok(task) = self.rx.recv() {
            run_task(task);
            delivered += 1;
        }
        tracing::debug!("Delivery loop finished after {} tasks", delivered);
    }

    /// Run whatever is queued right now without blocking
    ///
    /// For hosts that drive delivery from their own event loop. Returns the
    /// number of tasks executed.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            run_task(task);
            count += 1;
        }
        count
    }

    /// Move the loop onto a dedicated named thread
    pub fn spawn(self, name: &str) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }
}

fn run_task(task: Task) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("Delivery task panicked: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_fifo_across_producers() {
        let (marshaller, delivery) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = marshaller.clone();
        let log = seen.clone();
        thread::spawn(move || {
            first.schedule(move || log.lock().push("E1")).unwrap();
        })
        .join()
        .unwrap();

        let log = seen.clone();
        marshaller.schedule(move || log.lock().push("E2")).unwrap();

        assert_eq!(delivery.run_pending(), 2);
        assert_eq!(*seen.lock(), vec!["E1", "E2"]);
    }

    #[test]
    fn test_tasks_run_on_delivery_thread() {
        let (marshaller, delivery) = channel();
        let handle = delivery.spawn("delivery-test").unwrap();
        let (tx, rx) = mpsc::channel();

        for _ in 0..3 {
            let tx = tx.clone();
            marshaller
                .schedule(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send(name).unwrap();
                })
                .unwrap();
        }
        drop(marshaller);
        handle.join().unwrap();

        let names: Vec<_> = rx.try_iter().collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.as_deref() == Some("delivery-test")));
    }

    #[test]
    fn test_panic_does_not_stop_loop() {
        let (marshaller, delivery) = channel();
        let seen = Arc::new(Mutex::new(0));

        marshaller.schedule(|| panic!("boom")).unwrap();
        let count = seen.clone();
        marshaller.schedule(move || *count.lock() += 1).unwrap();

        assert_eq!(delivery.run_pending(), 2);
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_schedule_after_shutdown() {
        let (marshaller, delivery) = channel();
        drop(delivery);
        assert_eq!(marshaller.schedule(|| {}), Err(MarshallerClosed));
    }
}
