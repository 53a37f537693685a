use std::sync::{Condvar, Mutex};

/// Counting semaphore built from a mutex and a condition variable.
///
/// Used by the smart FIFO to park a consumer while the head chunk is empty.
/// Producers avoid piling up permits with [`post_if_unconsumed`], which only
/// posts when no earlier permit is still pending; at most one consumer waits
/// on the semaphore at a time (later consumers queue on the FIFO's consumer
/// lock instead).
///
/// [`post_if_unconsumed`]: Semaphore::post_if_unconsumed
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn wait(&self) {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
    }

    /// Releases one permit.
    pub fn post(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.available.notify_one();
    }

    /// Releases one permit unless an earlier one is still unconsumed.
    ///
    /// Keeps the permit count at most 1 on the producer fast path, so a burst
    /// of pushes wakes the waiting consumer exactly once.
    pub fn post_if_unconsumed(&self) {
        let mut permits = self.permits.lock().unwrap();
        if *permits == 0 {
            *permits = 1;
            self.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_consumes_posted_permit() {
        let sem = Semaphore::new(1);
        sem.wait();
        sem.post();
        sem.wait();
    }

    #[test]
    fn test_post_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };

        thread::sleep(Duration::from_millis(20));
        sem.post();
        waiter.join().unwrap();
    }

    #[test]
    fn test_post_if_unconsumed_caps_permits_at_one() {
        let sem = Semaphore::new(0);
        sem.post_if_unconsumed();
        sem.post_if_unconsumed();
        sem.post_if_unconsumed();

        sem.wait();
        assert_eq!(*sem.permits.lock().unwrap(), 0);
    }
}
