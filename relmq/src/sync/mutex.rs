use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use rustix::io::Errno;

use crate::errors::SysCallError;
use crate::sync::check;

/// Outcome of acquiring a [`RobustMutex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LockState {
    /// The mutex was acquired normally.
    Acquired,
    /// The mutex was acquired, but its previous owner died while holding it.
    /// The protected data may be inconsistent; the acquirer must restore the
    /// invariants and call [`MutexGuard::make_consistent`] before releasing.
    OwnerDied,
}

/// A mutex that lives inside the shared segment and excludes threads of
/// every attached process.
///
/// On Linux and Android the mutex is robust: when the owning thread or
/// process terminates without unlocking, the next acquirer observes
/// [`LockState::OwnerDied`] instead of deadlocking.
#[repr(C)]
pub(crate) struct RobustMutex {
    inner: UnsafeCell<libc::pthread_mutex_t>,
}

// The whole point of this type is cross-process sharing; exclusion is
// provided by pthread, not by Rust ownership.
unsafe impl Send for RobustMutex {}
unsafe impl Sync for RobustMutex {}

impl RobustMutex {
    /// Initializes the mutex in place.
    ///
    /// # Safety
    /// `this` must point at writable, zeroed segment memory. Must be called
    /// exactly once per segment, by the creator, before publication.
    pub unsafe fn init(this: *mut Self) -> Result<(), SysCallError> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(
            "pthread_mutexattr_init",
            libc::pthread_mutexattr_init(attr.as_mut_ptr()),
        )?;
        let result = Self::init_with_attr(this, attr.as_mut_ptr());
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        result
    }

    unsafe fn init_with_attr(
        this: *mut Self,
        attr: *mut libc::pthread_mutexattr_t,
    ) -> Result<(), SysCallError> {
        check(
            "pthread_mutexattr_setpshared",
            libc::pthread_mutexattr_setpshared(attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        check(
            "pthread_mutexattr_setrobust",
            libc::pthread_mutexattr_setrobust(attr, libc::PTHREAD_MUTEX_ROBUST),
        )?;
        check(
            "pthread_mutex_init",
            libc::pthread_mutex_init((*this).inner.get(), attr),
        )
    }

    /// Destroys the mutex. Called by the last detacher only.
    ///
    /// # Safety
    /// No thread of any process may hold or wait on the mutex.
    pub unsafe fn destroy(this: *mut Self) {
        libc::pthread_mutex_destroy((*this).inner.get());
    }

    /// Acquires the mutex, reporting whether the previous owner died.
    pub fn lock(&self) -> Result<(MutexGuard<'_>, LockState), SysCallError> {
        let rc = unsafe { libc::pthread_mutex_lock(self.inner.get()) };
        let state = match rc {
            0 => LockState::Acquired,
            libc::EOWNERDEAD => LockState::OwnerDied,
            rc => {
                return Err(SysCallError {
                    op: "pthread_mutex_lock",
                    errno: Errno::from_raw_os_error(rc),
                })
            }
        };
        Ok((MutexGuard { mutex: self }, state))
    }

    #[inline]
    pub(crate) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

/// Scoped ownership of a [`RobustMutex`]; releases on every exit path,
/// including panics.
pub(crate) struct MutexGuard<'a> {
    mutex: &'a RobustMutex,
}

impl MutexGuard<'_> {
    /// Marks the mutex consistent after [`LockState::OwnerDied`] was
    /// observed and the protected invariants were restored. Call at most
    /// once per acquisition, before the guard is dropped.
    pub fn make_consistent(&self) -> Result<(), SysCallError> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            check("pthread_mutex_consistent", unsafe {
                libc::pthread_mutex_consistent(self.mutex.raw())
            })
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            Ok(())
        }
    }

    #[inline]
    pub(crate) fn mutex_raw(&self) -> *mut libc::pthread_mutex_t {
        self.mutex.raw()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw()) };
        debug_assert_eq!(rc, 0);
    }
}
