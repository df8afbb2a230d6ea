//! A reliable interprocess message queue (`relmq`) backed by POSIX shared
//! memory.
//!
//! # Overview
//! Any number of processes attach to a queue by name and exchange discrete
//! byte messages with at-most-once delivery and FIFO ordering. The queue is
//! a bounded ring of fixed-size blocks living in a named shared memory
//! segment; a message occupies as many consecutive blocks (wrapping) as its
//! payload needs. The segment outlives individual participants: it is
//! reference counted, and the last detaching handle removes the name.
//!
//! Key components:
//! - [`MessageQueue`]: the per-process handle. Create with
//!   [`MessageQueue::create`], [`MessageQueue::open_or_create`] or
//!   [`MessageQueue::open`], or from a [`QueueConfig`] loaded out of a
//!   settings file.
//! - [`QueueConfig`]: serde-friendly settings with a validating builder.
//! - [`TextQueueSink`]: a log-sink adapter that forwards finished text
//!   records into a queue.
//! - [`QueueError`]: the crate error type.
//!
//! # Concurrency model
//!
//! Every operation that touches queue state is serialized by a
//! process-shared mutex stored in the segment; `send` under the `Block`
//! policy and `receive` are the only operations that suspend, each on its
//! own process-shared condition variable. Messages are delivered in the
//! order their `send` completed, across all attached processes.
//!
//! The mutex is robust on Linux: when a participant dies while holding it,
//! the next acquirer drops the (possibly half-written) queued data, marks
//! the mutex consistent and proceeds. A crashed peer therefore cannot
//! deadlock survivors; it can cost them queued messages.
//!
//! `stop` aborts blocked calls — but only those made through the same
//! handle. The stop flag is process-local by design: one process shutting
//! down must not abort another process's waiters.
//!
//! # Example
//!
//! ```no_run
//! use relmq::MessageQueue;
//!
//! # fn main() -> Result<(), relmq::QueueError> {
//! let queue = MessageQueue::open_or_create("example-queue", 16, 256)?;
//! queue.send(b"hello across processes")?;
//!
//! let mut buffer = [0u8; 256];
//! let len = queue.receive_into(&mut buffer)?;
//! assert_eq!(&buffer[..len], b"hello across processes");
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod queue;
pub mod sink;

mod layout;
mod segment;
mod sync;

#[cfg(test)]
mod tests;

pub use errors::QueueError;
pub use queue::{
    MessageQueue, OpenMode, OverflowPolicy, Payload, QueueConfig, QueueConfigBuilder,
    DEFAULT_PERMISSIONS,
};
pub use sink::TextQueueSink;
