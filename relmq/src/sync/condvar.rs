use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use rustix::io::Errno;

use crate::errors::SysCallError;
use crate::sync::mutex::{LockState, MutexGuard};
use crate::sync::check;

/// A condition variable that lives inside the shared segment and is usable
/// from every attached process.
///
/// Spurious wakeups are possible; callers re-check their predicate in a
/// loop while holding the associated mutex.
#[repr(C)]
pub(crate) struct SharedCondvar {
    inner: UnsafeCell<libc::pthread_cond_t>,
}

unsafe impl Send for SharedCondvar {}
unsafe impl Sync for SharedCondvar {}

impl SharedCondvar {
    /// Initializes the condvar in place.
    ///
    /// # Safety
    /// `this` must point at writable segment memory. Must be called exactly
    /// once per segment, by the creator, before publication.
    pub unsafe fn init(this: *mut Self) -> Result<(), SysCallError> {
        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check(
            "pthread_condattr_init",
            libc::pthread_condattr_init(attr.as_mut_ptr()),
        )?;
        let result = check(
            "pthread_condattr_setpshared",
            libc::pthread_condattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
        )
        .and_then(|()| {
            check(
                "pthread_cond_init",
                libc::pthread_cond_init((*this).inner.get(), attr.as_ptr()),
            )
        });
        libc::pthread_condattr_destroy(attr.as_mut_ptr());
        result
    }

    /// Destroys the condvar. Called by the last detacher only.
    ///
    /// # Safety
    /// No thread of any process may be waiting on the condvar.
    pub unsafe fn destroy(this: *mut Self) {
        libc::pthread_cond_destroy((*this).inner.get());
    }

    /// Atomically releases the mutex held by `guard` and suspends until
    /// notified, reacquiring the mutex before returning.
    ///
    /// The reacquisition may observe the robust-mutex owner-death condition,
    /// which is reported just as it is for a plain lock.
    pub fn wait(&self, guard: &MutexGuard<'_>) -> Result<LockState, SysCallError> {
        let rc = unsafe { libc::pthread_cond_wait(self.inner.get(), guard.mutex_raw()) };
        match rc {
            0 => Ok(LockState::Acquired),
            libc::EOWNERDEAD => Ok(LockState::OwnerDied),
            rc => Err(SysCallError {
                op: "pthread_cond_wait",
                errno: Errno::from_raw_os_error(rc),
            }),
        }
    }

    /// Wakes at least one waiter, if any.
    pub fn notify_one(&self) {
        let rc = unsafe { libc::pthread_cond_signal(self.inner.get()) };
        debug_assert_eq!(rc, 0);
    }

    /// Wakes all current waiters.
    pub fn notify_all(&self) {
        let rc = unsafe { libc::pthread_cond_broadcast(self.inner.get()) };
        debug_assert_eq!(rc, 0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::sync::RobustMutex;

    struct Pair {
        mutex: RobustMutex,
        condvar: SharedCondvar,
        ready: AtomicBool,
    }

    fn new_pair() -> Arc<Pair> {
        let pair = Arc::new(Pair {
            mutex: unsafe { std::mem::zeroed() },
            condvar: unsafe { std::mem::zeroed() },
            ready: AtomicBool::new(false),
        });
        unsafe {
            let p = Arc::as_ptr(&pair) as *mut Pair;
            RobustMutex::init(std::ptr::addr_of_mut!((*p).mutex)).unwrap();
            SharedCondvar::init(std::ptr::addr_of_mut!((*p).condvar)).unwrap();
        }
        pair
    }

    #[test]
    fn notify_one_wakes_a_waiter() {
        let pair = new_pair();

        let waiter = Arc::clone(&pair);
        let handle = thread::spawn(move || {
            let (guard, _) = waiter.mutex.lock().unwrap();
            while !waiter.ready.load(Ordering::Relaxed) {
                waiter.condvar.wait(&guard).unwrap();
            }
        });

        thread::sleep(Duration::from_millis(20));
        let (guard, _) = pair.mutex.lock().unwrap();
        pair.ready.store(true, Ordering::Relaxed);
        pair.condvar.notify_one();
        drop(guard);

        handle.join().unwrap();
    }

    #[test]
    fn notify_all_wakes_every_waiter() {
        let pair = new_pair();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let waiter = Arc::clone(&pair);
            handles.push(thread::spawn(move || {
                let (guard, _) = waiter.mutex.lock().unwrap();
                while !waiter.ready.load(Ordering::Relaxed) {
                    waiter.condvar.wait(&guard).unwrap();
                }
            }));
        }

        thread::sleep(Duration::from_millis(20));
        let (guard, _) = pair.mutex.lock().unwrap();
        pair.ready.store(true, Ordering::Relaxed);
        pair.condvar.notify_all();
        drop(guard);

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
