//! Single-threaded cooperative scheduling.
//!
//! Every task runs on the loop thread inside a `LocalSet`, so tasks may hold
//! `Rc` state and touch plugins directly. Blocking work runs on plain OS
//! threads and hands results back through channels only.

use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tokio::{
    runtime::Builder,
    sync::{mpsc, Notify},
    task::{JoinHandle, LocalSet},
};
use tracing::{debug, info, warn};

/// Timer resolution of the runtime; shorter intervals yield instead of sleeping.
const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

struct ShutdownInner {
    closing: AtomicBool,
    notify: Notify,
    wake: Mutex<Option<Sender<()>>>,
    parked: Receiver<()>,
}

/// Process-wide "closing" flag with wakeups for async tasks and for
/// background threads parked between polls.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (wake, parked) = bounded(0);
        Self {
            inner: Arc::new(ShutdownInner {
                closing: AtomicBool::new(false),
                notify: Notify::new(),
                wake: Mutex::new(Some(wake)),
                parked,
            }),
        }
    }

    /// Flips the flag. Returns `false` if it was already flipped.
    pub fn trigger(&self) -> bool {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        // Dropping the only sender disconnects every parked receiver.
        match self.inner.wake.lock() {
            Ok(mut wake) => drop(wake.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        true
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub async fn closed(&self) {
        let notified = self.inner.notify.notified();
        if self.is_closing() {
            return;
        }
        notified.await;
    }

    /// Parks the calling thread for up to `timeout`, waking early on shutdown.
    /// Returns whether shutdown has been signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_closing() {
            return true;
        }
        match self.inner.parked.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => self.is_closing(),
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

pub struct Scheduler {
    tasks: LocalSet,
    tick_interval: Duration,
    shutdown: ShutdownSignal,
}

impl Scheduler {
    pub fn new(tick_interval: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            tasks: LocalSet::new(),
            tick_interval,
            shutdown,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Adds a concurrent task to the loop. Tasks still pending at shutdown are
    /// abandoned, not cancelled cooperatively.
    pub fn add_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        drop(self.tasks.spawn_local(task));
    }

    /// Runs blocking work off the loop thread. Must be awaited from a loop task.
    pub fn offload<F, T>(&self, work: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
    }

    /// Polls `work` on a dedicated OS thread every `interval` until shutdown
    /// and feeds each produced value to `on_result` on the loop thread.
    pub fn run_in_background_thread<T, W, C>(
        &self,
        name: &str,
        interval: Duration,
        mut work: W,
        mut on_result: C,
    ) -> io::Result<()>
    where
        T: Send + 'static,
        W: FnMut() -> Option<T> + Send + 'static,
        C: FnMut(T) + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = self.shutdown.clone();
        let thread_name = name.to_string();
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, "background worker started");
                while !shutdown.is_closing() {
                    if let Some(value) = work() {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    if shutdown.wait_timeout(interval) {
                        break;
                    }
                }
                debug!(thread = %thread_name, "background worker stopped");
            })?;

        let shutdown = self.shutdown.clone();
        self.add_task(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(value) => on_result(value),
                        None => break,
                    },
                    _ = shutdown.closed() => break,
                }
            }
        });
        Ok(())
    }

    /// The loop's explicit suspension point. Wakes early on shutdown.
    /// Sub-millisecond intervals yield to other tasks until the deadline
    /// passes, since the timer cannot sleep for less than a millisecond.
    pub async fn yield_now(&self) {
        if self.tick_interval < TIMER_GRANULARITY {
            let deadline = Instant::now() + self.tick_interval;
            loop {
                tokio::task::yield_now().await;
                if Instant::now() >= deadline || self.shutdown.is_closing() {
                    return;
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(self.tick_interval) => {}
            _ = self.shutdown.closed() => {}
        }
    }

    /// Drives `main` and every added task on a current-thread runtime until
    /// `main` completes.
    pub fn block_on<F: Future>(&self, main: F) -> io::Result<F::Output> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let output = runtime.block_on(self.tasks.run_until(main));
        info!("scheduler stopped");
        Ok(output)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.shutdown.is_closing() {
            warn!("scheduler dropped without shutdown; waking background workers");
            self.shutdown.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn trigger_wakes_parked_threads_early() {
        let signal = ShutdownSignal::new();
        let parked = signal.clone();
        let worker = thread::spawn(move || {
            let started = Instant::now();
            let closing = parked.wait_timeout(Duration::from_secs(30));
            (closing, started.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        assert!(signal.trigger());
        assert!(!signal.trigger());

        let (closing, waited) = worker.join().expect("join");
        assert!(closing);
        assert!(waited < Duration::from_secs(10));
    }

    #[test]
    fn background_results_are_delivered_on_the_loop_thread() {
        let shutdown = ShutdownSignal::new();
        let scheduler = Scheduler::new(Duration::from_millis(1), shutdown.clone());
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let mut next = 0;
        scheduler
            .run_in_background_thread(
                "counter",
                Duration::from_millis(1),
                move || {
                    next += 1;
                    (next <= 3).then_some(next)
                },
                move |value| sink.borrow_mut().push(value),
            )
            .expect("spawn worker");

        let observed = Rc::clone(&received);
        scheduler
            .block_on(async move {
                while observed.borrow().len() < 3 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .expect("runtime");
        shutdown.trigger();
        assert_eq!(*received.borrow(), [1, 2, 3]);
    }

    #[test]
    fn added_tasks_run_alongside_the_main_future() {
        let scheduler = Scheduler::new(Duration::ZERO, ShutdownSignal::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let task_log = Rc::clone(&log);
        scheduler.add_task(async move {
            task_log.borrow_mut().push("task");
        });
        let main_log = Rc::clone(&log);
        scheduler
            .block_on(async move {
                while main_log.borrow().is_empty() {
                    tokio::task::yield_now().await;
                }
                main_log.borrow_mut().push("main");
            })
            .expect("runtime");
        assert_eq!(*log.borrow(), ["task", "main"]);
        scheduler.shutdown().trigger();
    }

    #[test]
    fn closed_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let scheduler = Scheduler::new(Duration::from_secs(60), signal.clone());
        let waiter = signal.clone();
        scheduler
            .block_on(async move {
                let started = Instant::now();
                tokio::join!(waiter.closed(), async {
                    tokio::task::yield_now().await;
                    signal.trigger();
                });
                assert!(started.elapsed() < Duration::from_secs(10));
            })
            .expect("runtime");
    }

    #[test]
    fn microsecond_interval_does_not_fall_back_to_the_millisecond_timer() {
        let scheduler = Scheduler::new(Duration::from_micros(1), ShutdownSignal::new());
        let started = Instant::now();
        scheduler
            .block_on(async {
                for _ in 0..1_000 {
                    scheduler.yield_now().await;
                }
            })
            .expect("runtime");
        assert!(started.elapsed() < Duration::from_millis(500));
        scheduler.shutdown().trigger();
    }

    #[test]
    fn millisecond_interval_still_sleeps() {
        let scheduler = Scheduler::new(Duration::from_millis(5), ShutdownSignal::new());
        let started = Instant::now();
        scheduler
            .block_on(async {
                for _ in 0..4 {
                    scheduler.yield_now().await;
                }
            })
            .expect("runtime");
        assert!(started.elapsed() >= Duration::from_millis(20));
        scheduler.shutdown().trigger();
    }

    #[test]
    fn offloaded_work_is_awaited_from_a_loop_task() {
        let scheduler = Rc::new(Scheduler::new(Duration::ZERO, ShutdownSignal::new()));
        let result = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&result);
        let offloader = Rc::clone(&scheduler);
        scheduler.add_task(async move {
            let sum = offloader
                .offload(|| (1..=10u64).sum::<u64>())
                .await
                .expect("offloaded work");
            *sink.borrow_mut() = Some(sum);
        });
        let observed = Rc::clone(&result);
        scheduler
            .block_on(async move {
                while observed.borrow().is_none() {
                    tokio::task::yield_now().await;
                }
            })
            .expect("runtime");
        assert_eq!(*result.borrow(), Some(55));
        scheduler.shutdown().trigger();
    }
}
