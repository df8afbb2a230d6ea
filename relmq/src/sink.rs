//! Log-sink adapter over the message queue.
//!
//! The sink hands finished text records to the queue; it never formats while
//! queue state is locked, because every record reaches it fully rendered in
//! the sink's own buffer. Overflow handling follows the queue handle's
//! overflow policy.

use crate::errors::QueueError;
use crate::queue::MessageQueue;

/// Forwards formatted text records into a message queue, one record per
/// message.
///
/// A record rejected because the handle was stopped is dropped silently;
/// the sink is expected to be torn down right after. Every other failure,
/// including [`QueueError::CapacityLimitReached`] under the `Error` policy
/// and [`QueueError::MessageTooLarge`], is the caller's to handle.
pub struct TextQueueSink {
    queue: MessageQueue,
}

impl TextQueueSink {
    pub fn new(queue: MessageQueue) -> TextQueueSink {
        TextQueueSink { queue }
    }

    /// The queue this sink feeds.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Sends one formatted record.
    pub fn consume(&self, record: &str) -> Result<(), QueueError> {
        match self.queue.send(record.as_bytes()) {
            Ok(()) | Err(QueueError::Aborted) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn into_queue(self) -> MessageQueue {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use std::process;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::queue::{OpenMode, OverflowPolicy, QueueConfig};

    static TEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> String {
        format!(
            "relmq-sink-{}-{}-{}",
            tag,
            process::id(),
            TEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
        )
    }

    #[test]
    fn records_come_out_as_sent() {
        let queue = MessageQueue::create(&unique_name("records"), 8, 64).unwrap();
        let reader = MessageQueue::open(queue.name()).unwrap();
        let sink = TextQueueSink::new(queue);

        sink.consume("first record").unwrap();
        sink.consume("second record").unwrap();

        let mut buffer = [0u8; 64];
        let n = reader.try_receive_into(&mut buffer).unwrap().unwrap();
        assert_eq!(&buffer[..n], b"first record");
        let n = reader.try_receive_into(&mut buffer).unwrap().unwrap();
        assert_eq!(&buffer[..n], b"second record");
    }

    #[test]
    fn overflow_surfaces_under_the_error_policy() {
        let config = QueueConfig::builder()
            .name(unique_name("overflow"))
            .mode(OpenMode::CreateOnly)
            .capacity(1)
            .block_size(64)
            .overflow_policy(OverflowPolicy::Error)
            .build()
            .unwrap();
        let sink = TextQueueSink::new(MessageQueue::from_config(&config).unwrap());

        sink.consume("fits").unwrap();
        assert!(matches!(
            sink.consume("does not"),
            Err(QueueError::CapacityLimitReached { .. })
        ));
    }

    #[test]
    fn stopped_sink_drops_records_silently() {
        let queue = MessageQueue::create(&unique_name("stopped"), 4, 64).unwrap();
        queue.stop().unwrap();
        let sink = TextQueueSink::new(queue);

        sink.consume("dropped").unwrap();

        let queue = sink.into_queue();
        queue.reset();
        let mut buffer = [0u8; 16];
        assert_eq!(queue.try_receive_into(&mut buffer).unwrap(), None);
    }
}
