//! Process-shared synchronization primitives living inside the shared
//! segment: a robust mutex and condition variables built on `pthread` with
//! `PTHREAD_PROCESS_SHARED`.

mod condvar;
mod mutex;

pub(crate) use condvar::SharedCondvar;
pub(crate) use mutex::{LockState, MutexGuard, RobustMutex};

use rustix::io::Errno;

use crate::errors::SysCallError;

/// Turns a `pthread_*` return code into a [`SysCallError`].
#[inline]
pub(crate) fn check(op: &'static str, rc: libc::c_int) -> Result<(), SysCallError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SysCallError {
            op,
            errno: Errno::from_raw_os_error(rc),
        })
    }
}
