//! Named shared-memory segments.
//!
//! Translates a queue name into a mapped, read/write byte region backed by a
//! POSIX shared memory object (`shm_open`/`mmap`), or removes it from the
//! namespace. Attachments already mapped stay valid after removal; the
//! kernel frees the memory once the last mapping is gone.

use std::hint;
use std::ptr::{self, NonNull};
use std::thread;
use std::time::Duration;

use rustix::fs::{fstat, ftruncate, Mode};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm;

use crate::errors::QueueError;

/// POSIX limit on shared-memory object names.
const NAME_MAX: usize = 255;

/// Rounds a creator may wait for a racing creator to size the object,
/// matching the attach back-off in the queue layer.
const SIZE_WAIT_ROUNDS: u32 = 200;

/// A named segment mapped read/write into this process.
///
/// Dropping a `Segment` only unmaps it; removal from the OS namespace is a
/// separate, explicit operation ([`Segment::remove`]).
#[derive(Debug)]
pub(crate) struct Segment {
    name: String,
    shm_path: String,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared bytes; all synchronization lives in the
// structures the queue layer places inside it.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a segment of exactly `byte_len` bytes, failing if the name
    /// already exists. `mode` holds the `shm_open` permission bits.
    pub fn create_only(name: &str, byte_len: usize, mode: u32) -> Result<Segment, QueueError> {
        let shm_path = shm_path(name)?;

        let fd = shm::open(
            &shm_path,
            shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR,
            Mode::from_raw_mode(mode),
        )
        .map_err(|errno| map_errno("shm_open", name, errno))?;

        if let Err(errno) = ftruncate(&fd, byte_len as u64) {
            drop(fd);
            let _ = shm::unlink(&shm_path);
            return Err(map_errno("ftruncate", name, errno));
        }

        let ptr = match unsafe {
            mmap(
                ptr::null_mut(),
                byte_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        } {
            Ok(ptr) => ptr,
            Err(errno) => {
                drop(fd);
                let _ = shm::unlink(&shm_path);
                return Err(map_errno("mmap", name, errno));
            }
        };

        Ok(Segment {
            name: name.to_owned(),
            shm_path,
            // mmap never returns null on success
            ptr: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            len: byte_len,
        })
    }

    /// Atomically creates the segment or adopts an existing one. Returns
    /// whether this caller created it; the loser of a creation race adopts
    /// the winner's segment at the winner's size.
    pub fn open_or_create(
        name: &str,
        byte_len: usize,
        mode: u32,
    ) -> Result<(Segment, bool), QueueError> {
        match Segment::create_only(name, byte_len, mode) {
            Ok(segment) => Ok((segment, true)),
            Err(QueueError::AlreadyExists { .. }) => {
                Segment::open_existing(name, true).map(|segment| (segment, false))
            }
            Err(err) => Err(err),
        }
    }

    /// Maps an existing segment at its current size; fails if absent.
    pub fn open_only(name: &str) -> Result<Segment, QueueError> {
        Segment::open_existing(name, false)
    }

    fn open_existing(name: &str, wait_for_size: bool) -> Result<Segment, QueueError> {
        let shm_path = shm_path(name)?;

        let fd = shm::open(&shm_path, shm::OFlags::RDWR, Mode::empty())
            .map_err(|errno| map_errno("shm_open", name, errno))?;

        // A racing creator truncates right after the exclusive open; give it
        // a bounded moment to do so before declaring the segment unusable.
        let mut byte_len = 0;
        for round in 0..SIZE_WAIT_ROUNDS {
            let stat = fstat(&fd).map_err(|errno| map_errno("fstat", name, errno))?;
            byte_len = stat.st_size as usize;
            if byte_len > 0 || !wait_for_size {
                break;
            }
            backoff(round);
        }
        if byte_len == 0 {
            return Err(QueueError::Setup {
                name: name.to_owned(),
                reason: "shared memory segment has zero size".to_owned(),
            });
        }

        let ptr = unsafe {
            mmap(
                ptr::null_mut(),
                byte_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        }
        .map_err(|errno| map_errno("mmap", name, errno))?;

        Ok(Segment {
            name: name.to_owned(),
            shm_path,
            ptr: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            len: byte_len,
        })
    }

    /// Unlinks the named segment without attaching to it. Processes that
    /// still have it mapped keep their mappings until they detach.
    pub fn remove(name: &str) -> Result<(), QueueError> {
        let shm_path = shm_path(name)?;
        shm::unlink(&shm_path).map_err(|errno| map_errno("shm_unlink", name, errno))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Spin for the first rounds, then yield, then sleep, so a waiter does not
/// burn a core while another process finishes its setup.
pub(crate) fn backoff(round: u32) {
    if round < 16 {
        for _ in 0..16 {
            hint::spin_loop();
        }
    } else if round < 64 {
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_micros(1));
    }
}

/// Validates a queue name and derives the OS object path from it. The
/// leading slash POSIX wants is supplied here so callers use plain names.
fn shm_path(name: &str) -> Result<String, QueueError> {
    let invalid = |reason| QueueError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.contains('/') {
        return Err(invalid("name must not contain '/'"));
    }
    if name.len() + 1 > NAME_MAX {
        return Err(invalid("name is longer than the OS allows"));
    }
    Ok(format!("/{name}"))
}

fn map_errno(op: &'static str, name: &str, errno: Errno) -> QueueError {
    let name = name.to_owned();
    match errno {
        Errno::EXIST => QueueError::AlreadyExists { name },
        Errno::NOENT => QueueError::NotFound { name },
        Errno::ACCESS | Errno::PERM => QueueError::PermissionDenied { name },
        errno => QueueError::System {
            name,
            op,
            source: errno,
        },
    }
}
