use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Shared state between the monitor thread and the handles.
struct WatchdogState {
    /// Liveness ticks since the last poll. Any monitored thread bumps this.
    reset_count: AtomicU32,
    running: AtomicBool,
    /// The monitor sleeps on this pair so `stop` can wake it immediately
    /// instead of waiting out the current poll interval.
    sleep_lock: Mutex<()>,
    sleep_cvar: Condvar,
}

/// Liveness monitor for pipeline runs.
///
/// A background thread wakes every poll interval and checks whether any
/// monitored thread has called [`WatchdogHandle::reset`] since the previous
/// poll. Once the accumulated silence exceeds `limit`, the expiry action
/// fires; by default that prints a diagnostic and aborts the process, which
/// is the only way out of a deadlocked run.
///
/// # Example
///
/// ```
/// use stepsync::Watchdog;
/// use std::time::Duration;
///
/// let handle = Watchdog::new(Duration::from_secs(600)).start();
/// handle.reset(); // called from worker loops
/// handle.stop();
/// ```
pub struct Watchdog {
    limit: Duration,
    poll_interval: Duration,
    on_expire: Box<dyn FnOnce(Duration) + Send>,
}

impl Watchdog {
    /// Creates a watchdog that fires after `limit` of silence.
    ///
    /// The poll interval defaults to a quarter of the limit, clamped to
    /// [10 ms, 5 s], so short limits are still detected promptly.
    pub fn new(limit: Duration) -> Self {
        let poll_interval = (limit / 4).clamp(Duration::from_millis(10), Duration::from_secs(5));
        Self {
            limit,
            poll_interval,
            on_expire: Box::new(default_expire),
        }
    }

    /// Overrides the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Overrides the expiry action. The default logs and aborts the process.
    pub fn with_on_expire<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        self.on_expire = Box::new(hook);
        self
    }

    /// Spawns the monitor thread.
    ///
    /// Consumes the builder, so a watchdog cannot be started twice.
    pub fn start(self) -> WatchdogHandle {
        let state = Arc::new(WatchdogState {
            reset_count: AtomicU32::new(0),
            running: AtomicBool::new(true),
            sleep_lock: Mutex::new(()),
            sleep_cvar: Condvar::new(),
        });

        let monitor_state = Arc::clone(&state);
        let limit = self.limit;
        let poll_interval = self.poll_interval;
        let on_expire = self.on_expire;

        let monitor = thread::Builder::new()
            .name("watchdog".to_owned())
            .spawn(move || {
                let mut silence = Duration::ZERO;
                loop {
                    let guard = monitor_state.sleep_lock.lock().unwrap();
                    // Checked under the lock so a concurrent `stop` either
                    // lands before this check or wakes the wait below.
                    if !monitor_state.running.load(Ordering::Acquire) {
                        return;
                    }
                    let (guard, timeout) = monitor_state
                        .sleep_cvar
                        .wait_timeout(guard, poll_interval)
                        .unwrap();
                    drop(guard);

                    if !monitor_state.running.load(Ordering::Acquire) {
                        return;
                    }
                    if !timeout.timed_out() {
                        // Spurious wake-up: the poll interval has not passed.
                        continue;
                    }

                    if monitor_state.reset_count.load(Ordering::Acquire) != 0 {
                        monitor_state.reset_count.store(0, Ordering::Release);
                        silence = Duration::ZERO;
                    } else {
                        silence += poll_interval;
                        if silence > limit {
                            on_expire(silence);
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn watchdog thread");

        WatchdogHandle {
            state,
            monitor: Arc::new(std::sync::Mutex::new(Some(monitor))),
        }
    }
}

fn default_expire(silence: Duration) {
    tracing::error!(
        silence_ms = silence.as_millis() as u64,
        "no progress within the watchdog limit, aborting"
    );
    eprintln!("watchdog: no progress for {silence:?}, aborting");
    std::process::abort();
}

/// Cloneable handle to a running [`Watchdog`].
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<WatchdogState>,
    monitor: Arc<std::sync::Mutex<Option<thread::JoinHandle<()>>>>,
}

impl WatchdogHandle {
    /// Signals liveness; cheap enough for inner loops.
    #[inline]
    pub fn reset(&self) {
        self.state.reset_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Stops the monitor and joins it. Idempotent.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Release);
        {
            let _guard = self.state.sleep_lock.lock().unwrap();
            self.state.sleep_cvar.notify_all();
        }
        if let Some(handle) = self.monitor.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    #[test]
    fn test_expires_within_bounded_multiple_of_limit() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let limit = Duration::from_millis(200);
        let handle = Watchdog::new(limit)
            .with_on_expire(move |_| flag.store(true, Ordering::SeqCst))
            .start();

        // Nobody resets: the hook must fire well before 5x the limit.
        let deadline = Instant::now() + limit * 5;
        while !fired.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "watchdog did not fire in time");
            thread::sleep(Duration::from_millis(10));
        }

        handle.stop();
    }

    #[test]
    fn test_reset_keeps_watchdog_quiet() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let limit = Duration::from_millis(100);
        let handle = Watchdog::new(limit)
            .with_on_expire(move |_| flag.store(true, Ordering::SeqCst))
            .start();

        // Tick faster than the limit for a while.
        let until = Instant::now() + limit * 4;
        while Instant::now() < until {
            handle.reset();
            thread::sleep(Duration::from_millis(10));
        }

        assert!(!fired.load(Ordering::SeqCst), "watchdog fired despite resets");
        handle.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let handle = Watchdog::new(Duration::from_secs(10)).start();
        handle.stop();
        handle.stop();
    }
}
