use crate::{Error, Result};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// One reader/writer lock per logical database identity.
///
/// Constructed once at process start and handed by reference to every
/// context; contexts pointed at the same database identity share one lock.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<DatabaseLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, database: &str) -> Arc<DatabaseLock> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(database.to_owned())
            .or_insert_with(|| Arc::new(DatabaseLock::new(database)))
            .clone()
    }
}

#[derive(Default)]
struct LockState {
    /// Reader recursion depth per thread.
    readers: HashMap<ThreadId, usize>,
    /// Writing thread and its recursion depth.
    writer: Option<(ThreadId, usize)>,
}

/// Recursive reader/writer lock with bounded waits.
///
/// Same-thread recursion never blocks, so a writable context can be cloned
/// for auxiliary queries without deadlocking itself. Failure to acquire
/// within the bound is a hard failure and is never retried here.
pub struct DatabaseLock {
    database: String,
    state: Mutex<LockState>,
    changed: Condvar,
}

impl DatabaseLock {
    fn new(database: &str) -> Self {
        Self {
            database: database.to_owned(),
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the shared lock, waiting at most `timeout`.
    pub fn acquire_read(&self, timeout: Duration) -> Result<()> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if let Some(depth) = state.readers.get_mut(&me) {
                *depth += 1;
                return Ok(());
            }
            // A thread holding the exclusive lock may read through it.
            match state.writer {
                None => {
                    state.readers.insert(me, 1);
                    return Ok(());
                }
                Some((owner, _)) if owner == me => {
                    state.readers.insert(me, 1);
                    return Ok(());
                }
                Some(..) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ReadLockUnavailable {
                    database: self.database.clone(),
                    waited: timeout,
                });
            }
            let (next, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Acquires the exclusive lock, waiting at most `timeout`. Any read
    /// lock held by the current thread is released first, so a reader may
    /// upgrade without deadlocking on itself.
    pub fn acquire_write(&self, timeout: Duration) -> Result<()> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        if state.readers.remove(&me).is_some() {
            self.changed.notify_all();
        }
        loop {
            match state.writer {
                Some((owner, depth)) if owner == me => {
                    state.writer = Some((me, depth + 1));
                    return Ok(());
                }
                None if state.readers.is_empty() => {
                    state.writer = Some((me, 1));
                    return Ok(());
                }
                _ => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::WriteLockUnavailable {
                    database: self.database.clone(),
                    waited: timeout,
                });
            }
            let (next, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    pub fn release_read(&self) {
        let me = thread::current().id();
        let mut state = self.state();
        match state.readers.get_mut(&me) {
            Some(depth) if *depth > 1 => *depth -= 1,
            Some(..) => {
                state.readers.remove(&me);
                self.changed.notify_all();
            }
            None => warn!(
                "read lock on {} released by a thread that does not hold it",
                self.database
            ),
        }
    }

    pub fn release_write(&self) {
        let me = thread::current().id();
        let mut state = self.state();
        match &mut state.writer {
            Some((owner, depth)) if *owner == me => {
                if *depth > 1 {
                    *depth -= 1;
                } else {
                    state.writer = None;
                    self.changed.notify_all();
                }
            }
            _ => warn!(
                "write lock on {} released by a thread that does not hold it",
                self.database
            ),
        }
    }

    /// Drops every hold the current thread has, regardless of recursion
    /// depth. Called on context dispose to prevent leaks on abnormal
    /// teardown.
    pub fn force_release(&self) {
        let me = thread::current().id();
        let mut state = self.state();
        let mut released = state.readers.remove(&me).is_some();
        if matches!(state.writer, Some((owner, _)) if owner == me) {
            state.writer = None;
            released = true;
        }
        if released {
            self.changed.notify_all();
        }
    }
}
