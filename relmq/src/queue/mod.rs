//! The message queue engine and its per-process handle.
//!
//! A [`MessageQueue`] owns one mapping of the named segment plus the
//! process-local stop flag and overflow policy. Any number of handles, in
//! any number of processes, may be attached to the same segment; every
//! operation that touches queue state runs under the segment's robust mutex.

use std::mem;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_derive::{Deserialize, Serialize};

use crate::errors::QueueError;
use crate::layout::{self, BlockHeader, QueueHeader, BLOCK_HEADER_OVERHEAD, CACHE_LINE_SIZE};
use crate::segment::{self, Segment};
use crate::sync::{LockState, MutexGuard, RobustMutex, SharedCondvar};

/// Rounds an attacher waits for the creator to publish the header.
const ATTACH_ROUNDS: u32 = 200;

/// Default creation permissions: owner read/write.
pub const DEFAULT_PERMISSIONS: u32 = 0o600;

/// What `send` does when the queue has no room for the message.
///
/// The policy belongs to the attaching process, not to the segment: two
/// producers on the same queue may use different policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until consumers free enough blocks (or `stop` aborts the wait).
    #[default]
    Block,
    /// Fail immediately with [`QueueError::CapacityLimitReached`].
    Error,
}

/// How a handle binds to the named segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    CreateOnly,
    OpenOrCreate,
    #[default]
    OpenOnly,
}

/// Per-queue settings, loadable from a settings file.
///
/// `capacity` and `block_size` only matter when the mode can create the
/// segment; an adopted segment keeps the geometry its creator gave it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Segment name, without the OS-level `/` prefix.
    pub name: String,
    pub mode: OpenMode,
    /// Number of allocation blocks (creation only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Block size in bytes, a power of two (creation only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    /// Creation permission bits, e.g. `0o600`.
    pub permissions: u32,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> QueueConfig {
        QueueConfig {
            name: String::new(),
            mode: OpenMode::default(),
            capacity: None,
            block_size: None,
            permissions: DEFAULT_PERMISSIONS,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder {
            config: QueueConfig::default(),
        }
    }
}

/// Validating builder for [`QueueConfig`].
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = Some(block_size);
        self
    }

    pub fn permissions(mut self, permissions: u32) -> Self {
        self.config.permissions = permissions;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    pub fn build(self) -> Result<QueueConfig, QueueError> {
        let config = self.config;
        if config.name.is_empty() {
            return Err(QueueError::InvalidName {
                name: config.name,
                reason: "name must not be empty",
            });
        }
        if config.mode != OpenMode::OpenOnly {
            let capacity = require_geometry(&config.name, config.capacity, "capacity")?;
            let block_size = require_geometry(&config.name, config.block_size, "block_size")?;
            validate_geometry(&config.name, capacity, block_size)?;
        }
        Ok(config)
    }
}

fn require_geometry(name: &str, value: Option<u32>, what: &str) -> Result<u32, QueueError> {
    value.ok_or_else(|| QueueError::Setup {
        name: name.to_owned(),
        reason: format!("{what} is required when the queue may be created"),
    })
}

/// Checks the requested geometry before any OS object is touched.
fn validate_geometry(name: &str, capacity: u32, block_size: u32) -> Result<(), QueueError> {
    if capacity == 0 {
        return Err(QueueError::Setup {
            name: name.to_owned(),
            reason: "capacity must be at least one block".to_owned(),
        });
    }
    if block_size == 0 || !block_size.is_power_of_two() {
        return Err(QueueError::Setup {
            name: name.to_owned(),
            reason: format!("block size {block_size} is not a power of two"),
        });
    }
    Ok(())
}

/// The per-process queue handle.
///
/// Cheap accessors (`name`, `capacity`, `block_size`) read write-once header
/// fields without locking. All queue operations take `&self` and are safe to
/// call from several threads; `stop`/`reset` affect only waiters that went
/// through this handle. Dropping the handle detaches; the last detacher
/// removes the named segment.
#[derive(Debug)]
pub struct MessageQueue {
    segment: Segment,
    header: NonNull<QueueHeader>,
    stopped: AtomicBool,
    overflow_policy: OverflowPolicy,
}

// One mapping shared by all threads of the process; cross-process exclusion
// is provided by the in-segment mutex and the ref count is atomic.
unsafe impl Send for MessageQueue {}
unsafe impl Sync for MessageQueue {}

impl MessageQueue {
    /// Creates the named queue, failing if it already exists.
    ///
    /// `block_size` must be a power of two; the stored block size is the
    /// requested value rounded up to the cache line.
    pub fn create(name: &str, capacity: u32, block_size: u32) -> Result<MessageQueue, QueueError> {
        Self::create_with_permissions(name, capacity, block_size, DEFAULT_PERMISSIONS)
    }

    pub fn create_with_permissions(
        name: &str,
        capacity: u32,
        block_size: u32,
        permissions: u32,
    ) -> Result<MessageQueue, QueueError> {
        validate_geometry(name, capacity, block_size)?;
        let block_size = effective_block_size(block_size);
        let segment = Segment::create_only(name, layout::region_size(capacity, block_size), permissions)?;
        unsafe { Self::construct(segment, capacity, block_size, OverflowPolicy::default()) }
    }

    /// Creates the named queue or attaches to an existing one. When the
    /// segment already exists its original geometry wins and the arguments
    /// here are ignored.
    pub fn open_or_create(
        name: &str,
        capacity: u32,
        block_size: u32,
    ) -> Result<MessageQueue, QueueError> {
        Self::open_or_create_with_permissions(name, capacity, block_size, DEFAULT_PERMISSIONS)
    }

    pub fn open_or_create_with_permissions(
        name: &str,
        capacity: u32,
        block_size: u32,
        permissions: u32,
    ) -> Result<MessageQueue, QueueError> {
        validate_geometry(name, capacity, block_size)?;
        let block_size = effective_block_size(block_size);
        let (segment, created) =
            Segment::open_or_create(name, layout::region_size(capacity, block_size), permissions)?;
        if created {
            unsafe { Self::construct(segment, capacity, block_size, OverflowPolicy::default()) }
        } else {
            unsafe { Self::adopt(segment, OverflowPolicy::default()) }
        }
    }

    /// Attaches to an existing queue; fails with [`QueueError::NotFound`]
    /// if no segment of that name exists.
    pub fn open(name: &str) -> Result<MessageQueue, QueueError> {
        let segment = Segment::open_only(name)?;
        unsafe { Self::adopt(segment, OverflowPolicy::default()) }
    }

    /// Builds a handle from a [`QueueConfig`].
    pub fn from_config(config: &QueueConfig) -> Result<MessageQueue, QueueError> {
        let mut queue = match config.mode {
            OpenMode::CreateOnly => Self::create_with_permissions(
                &config.name,
                require_geometry(&config.name, config.capacity, "capacity")?,
                require_geometry(&config.name, config.block_size, "block_size")?,
                config.permissions,
            )?,
            OpenMode::OpenOrCreate => Self::open_or_create_with_permissions(
                &config.name,
                require_geometry(&config.name, config.capacity, "capacity")?,
                require_geometry(&config.name, config.block_size, "block_size")?,
                config.permissions,
            )?,
            OpenMode::OpenOnly => Self::open(&config.name)?,
        };
        queue.overflow_policy = config.overflow_policy;
        Ok(queue)
    }

    /// Unlinks the named segment without attaching. Live handles keep their
    /// mappings until they detach.
    pub fn remove(name: &str) -> Result<(), QueueError> {
        Segment::remove(name)
    }

    pub fn name(&self) -> &str {
        self.segment.name()
    }

    /// Number of allocation blocks in the segment.
    pub fn capacity(&self) -> u32 {
        unsafe { (*self.hdr()).capacity }
    }

    /// Effective block size in bytes.
    pub fn block_size(&self) -> u32 {
        unsafe { (*self.hdr()).block_size }
    }

    /// Largest payload the queue can ever carry, in bytes.
    pub fn max_message_size(&self) -> usize {
        let hdr = self.hdr();
        let total =
            unsafe { (*hdr).capacity as u64 * (*hdr).block_size as u64 } - BLOCK_HEADER_OVERHEAD as u64;
        total.min(u32::MAX as u64) as usize
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Enqueues a message, waiting for room under [`OverflowPolicy::Block`]
    /// or failing fast under [`OverflowPolicy::Error`].
    pub fn send(&self, message: &[u8]) -> Result<(), QueueError> {
        let needed = self.blocks_needed(message.len())?;
        if self.stopped.load(Ordering::Relaxed) {
            return Err(QueueError::Aborted);
        }
        let guard = self.lock_queue()?;
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return Err(QueueError::Aborted);
            }
            let hdr = self.hdr();
            if unsafe { (*hdr).capacity - (*hdr).size } >= needed {
                break;
            }
            match self.overflow_policy {
                OverflowPolicy::Error => {
                    return Err(QueueError::CapacityLimitReached {
                        name: self.name().to_owned(),
                    })
                }
                OverflowPolicy::Block => {
                    self.wait_queue(unsafe { &(*hdr).nonfull }, &guard)?;
                }
            }
        }
        unsafe { self.put_message(message, needed) };
        drop(guard);
        Ok(())
    }

    /// Enqueues a message if room is available right now. Never blocks and
    /// ignores the overflow policy.
    pub fn try_send(&self, message: &[u8]) -> Result<bool, QueueError> {
        let needed = self.blocks_needed(message.len())?;
        if self.stopped.load(Ordering::Relaxed) {
            return Err(QueueError::Aborted);
        }
        let guard = self.lock_queue()?;
        let hdr = self.hdr();
        if unsafe { (*hdr).capacity - (*hdr).size } < needed {
            return Ok(false);
        }
        unsafe { self.put_message(message, needed) };
        drop(guard);
        Ok(true)
    }

    /// Dequeues the oldest message, waiting for one to arrive.
    ///
    /// The handler sees the payload in place, as up to two segments; no
    /// bounce buffer is involved. If the handler fails, the message stays at
    /// the head of the queue so a retry observes it again.
    pub fn receive<R>(
        &self,
        handler: impl FnOnce(Payload<'_>) -> Result<R, QueueError>,
    ) -> Result<R, QueueError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(QueueError::Aborted);
        }
        let guard = self.lock_queue()?;
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return Err(QueueError::Aborted);
            }
            let hdr = self.hdr();
            if unsafe { (*hdr).size } > 0 {
                break;
            }
            self.wait_queue(unsafe { &(*hdr).nonempty }, &guard)?;
        }
        let result = unsafe { self.take_message(handler) };
        drop(guard);
        result
    }

    /// Dequeues the oldest message if one is queued right now; `Ok(None)`
    /// when the queue is empty.
    pub fn try_receive<R>(
        &self,
        handler: impl FnOnce(Payload<'_>) -> Result<R, QueueError>,
    ) -> Result<Option<R>, QueueError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(QueueError::Aborted);
        }
        let guard = self.lock_queue()?;
        if unsafe { (*self.hdr()).size } == 0 {
            return Ok(None);
        }
        let result = unsafe { self.take_message(handler) };
        drop(guard);
        result.map(Some)
    }

    /// Receives into a caller-supplied buffer, returning the payload length.
    /// Fails with [`QueueError::BufferTooSmall`] without consuming the
    /// message when the buffer cannot hold it.
    pub fn receive_into(&self, buffer: &mut [u8]) -> Result<usize, QueueError> {
        self.receive(|payload| payload.copy_to_slice(buffer))
    }

    pub fn try_receive_into(&self, buffer: &mut [u8]) -> Result<Option<usize>, QueueError> {
        self.try_receive(|payload| payload.copy_to_slice(buffer))
    }

    /// Aborts blocked and future `send`/`receive` calls made through this
    /// handle. Waiters of other handles, even in this process, are woken but
    /// resume waiting. Cleared by [`reset`](Self::reset).
    pub fn stop(&self) -> Result<(), QueueError> {
        let guard = self.lock_queue()?;
        self.stopped.store(true, Ordering::Relaxed);
        let hdr = self.hdr();
        unsafe {
            (*hdr).nonempty.notify_all();
            (*hdr).nonfull.notify_all();
        }
        drop(guard);
        Ok(())
    }

    /// Restores blocking behavior after [`stop`](Self::stop). Touches only
    /// the local flag; no queued data is affected.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::Relaxed);
    }

    /// Drops every queued message.
    pub fn clear(&self) -> Result<(), QueueError> {
        let guard = self.lock_queue()?;
        unsafe { self.clear_queue_locked() };
        drop(guard);
        Ok(())
    }

    #[inline]
    fn hdr(&self) -> *mut QueueHeader {
        self.header.as_ptr()
    }

    fn system(&self, err: crate::errors::SysCallError) -> QueueError {
        err.into_queue_error(self.name())
    }

    /// Blocks the message would need, or *message-too-large* if it can never
    /// fit.
    fn blocks_needed(&self, payload_len: usize) -> Result<u32, QueueError> {
        let hdr = self.hdr();
        let block_size = unsafe { (*hdr).block_size } as usize;
        let max = self.max_message_size();
        if payload_len > max {
            return Err(QueueError::MessageTooLarge {
                name: self.name().to_owned(),
                size: payload_len,
                max,
            });
        }
        Ok(((BLOCK_HEADER_OVERHEAD + payload_len + block_size - 1) / block_size) as u32)
    }

    /// Acquires the queue mutex, running owner-death recovery when the
    /// previous holder died: queued data is dropped (a partially written
    /// message is unrecoverable) and the mutex is marked consistent.
    fn lock_queue(&self) -> Result<MutexGuard<'_>, QueueError> {
        let mutex: &RobustMutex = unsafe { &(*self.hdr()).mutex };
        let (guard, state) = mutex.lock().map_err(|e| self.system(e))?;
        if state == LockState::OwnerDied {
            unsafe { self.clear_queue_locked() };
            guard.make_consistent().map_err(|e| self.system(e))?;
        }
        Ok(guard)
    }

    /// Waits on `condvar`, handling an owner death observed during the
    /// mutex reacquisition inside the wait.
    fn wait_queue(
        &self,
        condvar: &SharedCondvar,
        guard: &MutexGuard<'_>,
    ) -> Result<(), QueueError> {
        match condvar.wait(guard).map_err(|e| self.system(e))? {
            LockState::Acquired => Ok(()),
            LockState::OwnerDied => {
                unsafe { self.clear_queue_locked() };
                guard.make_consistent().map_err(|e| self.system(e))
            }
        }
    }

    /// Resets the queue indices. Caller must hold the mutex.
    unsafe fn clear_queue_locked(&self) {
        let hdr = self.hdr();
        (*hdr).size = 0;
        (*hdr).put_pos = 0;
        (*hdr).get_pos = 0;
        (*hdr).nonfull.notify_all();
    }

    /// Writes the message at `put_pos` and advances it. Caller must hold the
    /// mutex and have verified that `blocks` free blocks exist.
    unsafe fn put_message(&self, message: &[u8], blocks: u32) {
        let hdr = self.hdr();
        let capacity = (*hdr).capacity;
        let block_size = (*hdr).block_size as usize;
        let pos = (*hdr).put_pos;
        let was_empty = (*hdr).size == 0;

        let block = layout::block_at(hdr, pos);
        (*block).size = message.len() as u32;

        // At most two copies: the run of blocks up to the end of the
        // segment, then the wrapped remainder starting at block 0.
        let tail_room = (capacity - pos) as usize * block_size - BLOCK_HEADER_OVERHEAD;
        let first = message.len().min(tail_room);
        ptr::copy_nonoverlapping(message.as_ptr(), BlockHeader::data(block), first);
        if first < message.len() {
            ptr::copy_nonoverlapping(
                message.as_ptr().add(first),
                layout::block_at(hdr, 0) as *mut u8,
                message.len() - first,
            );
        }

        (*hdr).put_pos = (pos + blocks) % capacity;
        (*hdr).size += blocks;
        if was_empty {
            (*hdr).nonempty.notify_one();
        }
    }

    /// Delivers the head message to `handler` and, if it succeeds, advances
    /// `get_pos` and wakes producers. Caller must hold the mutex and have
    /// verified `size > 0`.
    unsafe fn take_message<R>(
        &self,
        handler: impl FnOnce(Payload<'_>) -> Result<R, QueueError>,
    ) -> Result<R, QueueError> {
        let hdr = self.hdr();
        let capacity = (*hdr).capacity;
        let block_size = (*hdr).block_size as usize;
        let pos = (*hdr).get_pos;

        let block = layout::block_at(hdr, pos);
        let payload_len = (*block).size as usize;
        let blocks =
            ((BLOCK_HEADER_OVERHEAD + payload_len + block_size - 1) / block_size) as u32;

        let tail_room = (capacity - pos) as usize * block_size - BLOCK_HEADER_OVERHEAD;
        let first = payload_len.min(tail_room);
        let payload = Payload {
            head: slice::from_raw_parts(BlockHeader::data(block) as *const u8, first),
            tail: slice::from_raw_parts(
                layout::block_at(hdr, 0) as *const u8,
                payload_len - first,
            ),
        };
        let result = handler(payload)?;

        (*hdr).get_pos = (pos + blocks) % capacity;
        (*hdr).size -= blocks;
        (*hdr).nonfull.notify_all();
        Ok(result)
    }

    /// Initializes a freshly created segment and publishes it by storing a
    /// ref count of 1, with release ordering, as the very last step.
    unsafe fn construct(
        segment: Segment,
        capacity: u32,
        block_size: u32,
        overflow_policy: OverflowPolicy,
    ) -> Result<MessageQueue, QueueError> {
        let hdr = segment.as_ptr() as *mut QueueHeader;
        (*hdr).abi_tag = layout::abi_tag();
        (*hdr).capacity = capacity;
        (*hdr).block_size = block_size;
        (*hdr).size = 0;
        (*hdr).put_pos = 0;
        (*hdr).get_pos = 0;

        let init = RobustMutex::init(ptr::addr_of_mut!((*hdr).mutex))
            .and_then(|()| SharedCondvar::init(ptr::addr_of_mut!((*hdr).nonempty)))
            .and_then(|()| SharedCondvar::init(ptr::addr_of_mut!((*hdr).nonfull)));
        if let Err(err) = init {
            let name = segment.name().to_owned();
            let _ = Segment::remove(&name);
            return Err(err.into_queue_error(&name));
        }

        (*hdr).ref_count.store(1, Ordering::Release);

        Ok(MessageQueue {
            header: NonNull::new_unchecked(hdr),
            segment,
            stopped: AtomicBool::new(false),
            overflow_policy,
        })
    }

    /// Attaches to a segment constructed by another handle: waits (bounded)
    /// for the creator to publish, claims a reference, then validates the
    /// layout. Validation failure detaches before reporting.
    unsafe fn adopt(
        segment: Segment,
        overflow_policy: OverflowPolicy,
    ) -> Result<MessageQueue, QueueError> {
        let setup = |reason: String| QueueError::Setup {
            name: segment.name().to_owned(),
            reason,
        };
        if segment.len() < mem::size_of::<QueueHeader>() {
            return Err(setup("segment is too small to hold the queue header".to_owned()));
        }

        let hdr = segment.as_ptr() as *mut QueueHeader;
        let ref_count = &(*hdr).ref_count;
        let mut attached = false;
        'publication: for round in 0..ATTACH_ROUNDS {
            let mut refs = ref_count.load(Ordering::Acquire);
            while refs > 0 {
                match ref_count.compare_exchange_weak(
                    refs,
                    refs + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        attached = true;
                        break 'publication;
                    }
                    Err(current) => refs = current,
                }
            }
            segment::backoff(round);
        }
        if !attached {
            return Err(setup(
                "segment was not initialized by its creator in time".to_owned(),
            ));
        }

        // From here the reference is held; dropping the handle detaches.
        let queue = MessageQueue {
            header: NonNull::new_unchecked(hdr),
            segment,
            stopped: AtomicBool::new(false),
            overflow_policy,
        };

        let fail = |queue: MessageQueue, reason: String| {
            let err = QueueError::Setup {
                name: queue.name().to_owned(),
                reason,
            };
            drop(queue);
            Err(err)
        };
        if (*hdr).abi_tag != layout::abi_tag() {
            return fail(queue, "queue ABI is incompatible with this build".to_owned());
        }
        let block_size = (*hdr).block_size;
        if block_size == 0 || !block_size.is_power_of_two() {
            return fail(
                queue,
                format!("stored block size {block_size} is not a power of two"),
            );
        }
        if queue.segment.len() < layout::region_size((*hdr).capacity, block_size) {
            return fail(queue, "segment is smaller than its declared geometry".to_owned());
        }
        Ok(queue)
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        unsafe {
            let hdr = self.hdr();
            if (*hdr).ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
                // Last detacher: take the name out of the OS namespace and
                // tear down the in-segment primitives before unmapping.
                let _ = Segment::remove(self.segment.name());
                RobustMutex::destroy(ptr::addr_of_mut!((*hdr).mutex));
                SharedCondvar::destroy(ptr::addr_of_mut!((*hdr).nonempty));
                SharedCondvar::destroy(ptr::addr_of_mut!((*hdr).nonfull));
            }
        }
    }
}

/// The requested block size rounded up to the cache line, so every block
/// starts on its own line.
fn effective_block_size(block_size: u32) -> u32 {
    layout::align_up(block_size as usize, CACHE_LINE_SIZE) as u32
}

/// A received payload, viewed in place in the shared segment.
///
/// The payload occupies up to two contiguous runs: the part stored before
/// the ring wrapped and, for wrapping messages, the remainder at the start
/// of the block array. Valid only during the receive handler.
#[derive(Clone, Copy)]
pub struct Payload<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> Payload<'a> {
    /// Total payload length in bytes.
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The non-empty runs of the payload, in order. Yields at most two
    /// slices; an empty payload yields none.
    pub fn segments(&self) -> impl Iterator<Item = &'a [u8]> {
        [self.head, self.tail]
            .into_iter()
            .filter(|segment| !segment.is_empty())
    }

    /// Copies the payload into `buffer` and returns its length, failing with
    /// [`QueueError::BufferTooSmall`] before anything is copied if the
    /// buffer cannot hold it.
    pub fn copy_to_slice(&self, buffer: &mut [u8]) -> Result<usize, QueueError> {
        let len = self.len();
        if buffer.len() < len {
            return Err(QueueError::BufferTooSmall {
                needed: len,
                available: buffer.len(),
            });
        }
        buffer[..self.head.len()].copy_from_slice(self.head);
        buffer[self.head.len()..len].copy_from_slice(self.tail);
        Ok(len)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.head);
        out.extend_from_slice(self.tail);
        out
    }
}
