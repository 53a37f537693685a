use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::thread;

/// Dense, 0-based identifier of a registered thread.
///
/// Ids are assigned in registration order and never reused; they are the key
/// into every per-thread array held by promises and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    /// Returns the dense index backing this id.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

thread_local! {
    /// Cached id of the current thread, filled on first registration.
    ///
    /// The cache is what makes `current()` O(1) and lock-free: the mutex in
    /// the registry is only taken on the first registration of each thread.
    static CACHED_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Process-global mapping from OS thread to dense integer id.
///
/// The registry must be consulted (via [`ThreadRegistry::register_current_thread`])
/// before any per-thread state indexed by [`ThreadId`] is touched. Worker
/// threads spawned through [`spawn_registered`] do this automatically.
pub struct ThreadRegistry {
    ids: Mutex<HashMap<thread::ThreadId, usize>>,
}

static GLOBAL: OnceLock<ThreadRegistry> = OnceLock::new();

impl ThreadRegistry {
    fn new() -> Self {
        Self {
            ids: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the process-global registry.
    ///
    /// The first call initialises it; call this from the main thread before
    /// spawning workers so no initialisation happens on the data path.
    pub fn global() -> &'static ThreadRegistry {
        GLOBAL.get_or_init(ThreadRegistry::new)
    }

    /// Registers the calling thread, assigning the next dense id.
    ///
    /// Registering an already-registered thread is a no-op that returns the
    /// previously assigned id.
    pub fn register_current_thread(&self) -> ThreadId {
        if let Some(id) = CACHED_ID.with(Cell::get) {
            return ThreadId(id);
        }

        let mut ids = self.ids.lock().unwrap();
        let next = ids.len();
        let id = *ids.entry(thread::current().id()).or_insert(next);
        drop(ids);

        CACHED_ID.with(|cell| cell.set(Some(id)));
        ThreadId(id)
    }

    /// Returns the id of the calling thread.
    ///
    /// Reads the thread-local cache only; no lock is taken. Calling this from
    /// an unregistered thread is a programming error (debug builds panic;
    /// release builds fall back to registering, which takes the lock).
    #[inline]
    pub fn current(&self) -> ThreadId {
        match CACHED_ID.with(Cell::get) {
            Some(id) => ThreadId(id),
            None => {
                debug_assert!(false, "thread used per-thread state before registration");
                self.register_current_thread()
            }
        }
    }

    /// Number of threads registered so far.
    pub fn len(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    /// Returns true if no thread has registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns a thread that registers itself with the global registry before
/// running `f`.
///
/// This is the supported way to start pipeline workers: it guarantees the
/// registration-before-use ordering that per-thread caches rely on.
pub fn spawn_registered<F, T>(name: &str, f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            ThreadRegistry::global().register_current_thread();
            f()
        })
        .expect("failed to spawn thread")
}
